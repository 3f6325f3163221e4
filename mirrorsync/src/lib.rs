//! Replication of source query results into MySQL tables, with rule-based row validation and
//! reconciliation of drift against a rebuilt mirror.

pub mod batch;
pub mod catalog;
pub mod concurrency;
pub mod destination;
pub mod error;
pub mod export;
mod macros;
pub mod pipeline;
pub mod reconcile;
pub mod scheduler;
pub mod source;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transform;
pub mod types;
pub mod validation;
pub mod writer;
