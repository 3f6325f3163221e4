//! Row validation driven by boolean rules stored in the metadata catalog.
//!
//! Rules are small expressions such as `zqdm != 'NULL' && bbrq >= 19900101`, compiled once per
//! dataset into an AST and evaluated against the typed values of each transformed row.

mod eval;
mod expr;
mod rules;
mod value;

pub use eval::evaluate;
pub use expr::{BinaryOp, Expr, UnaryOp, parse};
pub use rules::{FailureAction, RowVerdict, RuleSet, ValidationRule};
pub use value::{NULL_LITERAL, Value, Variables};
