//! Fixtures for exercising the pipeline against in-memory catalog, source and destination.
//!
//! Available in unit tests and, behind the `test-utils` feature, in integration tests.

pub mod dataset;
pub mod pipeline;

pub use dataset::{
    BALANCE_DATE_RANGE_TEMPLATE, BALANCE_FULL_SQL, BALANCE_FULL_TEMPLATE, balance_dataset,
    balance_rows, register_field_types, row_batch, source_descriptor,
};
pub use pipeline::{
    TestPipeline, create_test_pipeline, create_test_pipeline_with, test_pipeline_config,
};
