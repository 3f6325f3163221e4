/// Destination column type, as recorded in the metadata catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int,
    UInt,
    Double,
    Float,
    String,
    Timestamp,
}

impl FieldType {
    /// Maps the catalog's numeric type code. Unknown codes are treated as strings.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => FieldType::Int,
            2 => FieldType::UInt,
            5 => FieldType::Double,
            6 => FieldType::Float,
            8 => FieldType::Timestamp,
            _ => FieldType::String,
        }
    }

    /// Whether literal values of this type are written between quotes.
    pub fn is_quoted(&self) -> bool {
        matches!(self, FieldType::String | FieldType::Timestamp)
    }
}

impl Default for FieldType {
    fn default() -> Self {
        FieldType::String
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_map_to_quoting() {
        assert!(!FieldType::from_code(1).is_quoted());
        assert!(!FieldType::from_code(6).is_quoted());
        assert!(FieldType::from_code(7).is_quoted());
        assert!(FieldType::from_code(8).is_quoted());
        assert_eq!(FieldType::from_code(42), FieldType::String);
    }
}
