//! Source side of the pipeline: connection descriptors, pooled connections and query execution.

mod base;
mod descriptor;
pub mod extractor;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod pool;
pub mod postgres;
pub mod query;

pub use base::{SourceClient, SourceColumn, SourceConnector, SourceRows};
pub use descriptor::ConnectionDescriptor;
