use std::fmt;

/// Fully qualified name of a destination table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Returns the same table inside the schema obtained by prefixing this schema.
    pub fn with_schema_prefix(&self, prefix: &str) -> Self {
        Self {
            schema: format!("{prefix}{}", self.schema),
            name: self.name.clone(),
        }
    }

    /// Renders the name as a backtick-quoted MySQL identifier pair.
    pub fn as_quoted_identifier(&self) -> String {
        format!(
            "{}.{}",
            quote_mysql_identifier(&self.schema),
            quote_mysql_identifier(&self.name)
        )
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Quotes a MySQL identifier with backticks, doubling embedded backticks.
pub fn quote_mysql_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_table_keeps_name() {
        let table = TableName::new("finance", "balance");
        let mirror = table.with_schema_prefix("compare_");
        assert_eq!(mirror, TableName::new("compare_finance", "balance"));
        assert_eq!(mirror.as_quoted_identifier(), "`compare_finance`.`balance`");
    }

    #[test]
    fn backticks_are_escaped() {
        assert_eq!(quote_mysql_identifier("we`ird"), "`we``ird`");
    }
}
