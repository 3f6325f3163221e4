use std::collections::HashMap;
use std::fmt;

use crate::types::FieldType;

/// Literal spelling of a missing value in rule expressions.
pub const NULL_LITERAL: &str = "NULL";

/// A typed value visible to rule expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Converts a rendered column value into the type its destination column declares.
    ///
    /// Numeric text that fails to parse becomes [`Value::Null`].
    pub fn from_column(text: Option<&str>, field_type: FieldType) -> Value {
        let Some(text) = text else {
            return Value::Null;
        };

        match field_type {
            FieldType::Int => text.parse().map(Value::Int).unwrap_or(Value::Null),
            FieldType::UInt => text.parse().map(Value::UInt).unwrap_or(Value::Null),
            FieldType::Double | FieldType::Float => {
                text.parse().map(Value::Float).unwrap_or(Value::Null)
            }
            FieldType::String | FieldType::Timestamp => Value::Str(text.to_string()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::UInt(_) | Value::Float(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str(NULL_LITERAL),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::UInt(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Str(value) => write!(f, "'{value}'"),
        }
    }
}

/// Column name to value bindings of one row.
pub type Variables = HashMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_columns_are_parsed() {
        assert_eq!(Value::from_column(Some("-12"), FieldType::Int), Value::Int(-12));
        assert_eq!(Value::from_column(Some("12"), FieldType::UInt), Value::UInt(12));
        assert_eq!(
            Value::from_column(Some("1.5"), FieldType::Double),
            Value::Float(1.5)
        );
    }

    #[test]
    fn unparsable_numbers_and_missing_values_are_null() {
        assert_eq!(Value::from_column(Some("abc"), FieldType::Int), Value::Null);
        assert_eq!(Value::from_column(Some("-1"), FieldType::UInt), Value::Null);
        assert_eq!(Value::from_column(None, FieldType::String), Value::Null);
    }

    #[test]
    fn text_columns_stay_text() {
        assert_eq!(
            Value::from_column(Some("000001"), FieldType::String),
            Value::Str("000001".to_string())
        );
    }
}
