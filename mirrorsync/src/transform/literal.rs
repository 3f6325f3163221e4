use std::fmt;

use crate::validation::NULL_LITERAL;

/// A value ready to be spliced into a destination statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Null,
    /// Text written between single quotes.
    Quoted(String),
    /// Numeric text written as is.
    Bare(String),
}

impl Literal {
    /// Wraps `text` in the literal kind selected by the destination column's quoting.
    pub fn typed(text: Option<String>, quoted: bool) -> Self {
        match text {
            None => Literal::Null,
            Some(text) if quoted => Literal::Quoted(text),
            Some(text) => Literal::Bare(text),
        }
    }

    /// The unquoted text of the value, if it is not null.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Literal::Null => None,
            Literal::Quoted(text) | Literal::Bare(text) => Some(text),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str(NULL_LITERAL),
            Literal::Bare(text) => f.write_str(text),
            Literal::Quoted(text) => {
                f.write_str("'")?;
                for c in text.chars() {
                    match c {
                        '\'' => f.write_str("\\'")?,
                        '\\' => f.write_str("\\\\")?,
                        '\0' => f.write_str("\\0")?,
                        c => write!(f, "{c}")?,
                    }
                }
                f.write_str("'")
            }
        }
    }
}

/// The formatted values of one row, in output column order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueTuple(pub Vec<Literal>);

impl ValueTuple {
    pub fn values(&self) -> &[Literal] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ValueTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (index, literal) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{literal}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuples_render_with_mysql_escaping() {
        let tuple = ValueTuple(vec![
            Literal::Quoted("o'neil\\".to_string()),
            Literal::Bare("12.5".to_string()),
            Literal::Null,
        ]);
        assert_eq!(tuple.to_string(), r"('o\'neil\\',12.5,NULL)");
    }

    #[test]
    fn typed_literals_follow_quoting() {
        assert_eq!(Literal::typed(None, true), Literal::Null);
        assert_eq!(
            Literal::typed(Some("1".to_string()), false),
            Literal::Bare("1".to_string())
        );
        assert_eq!(Literal::typed(Some("a".to_string()), true).as_text(), Some("a"));
    }
}
