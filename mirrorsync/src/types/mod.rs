//! Core data types shared across the extraction, transformation and reconciliation stages.

mod dataset;
mod field;
mod request;
mod table;

pub use dataset::{Dataset, SqlTemplates};
pub use field::FieldType;
pub use request::{DateParam, ExportMode, QueryRequest, Trigger};
pub use dataset::{DEFAULT_KEY_COLUMN, DEFAULT_VERSION_COLUMN};
pub use table::{TableName, quote_mysql_identifier};
