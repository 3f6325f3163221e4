//! Conversion of source rows into destination value tuples, including rule validation.

mod literal;
mod transformer;

pub use literal::{Literal, ValueTuple};
pub use transformer::{
    CARRIER_COLUMNS, PRECISE_TIMESTAMP_COLUMN, RowTransformer, TransformedRows, is_carrier_column,
    legacy_date, parse_timestamp,
};
