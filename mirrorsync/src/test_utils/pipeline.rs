use std::sync::Arc;

use mirrorsync_config::shared::{PipelineConfig, RetryConfig};

use crate::catalog::memory::MemoryCatalog;
use crate::destination::memory::MemoryDestination;
use crate::pipeline::Pipeline;
use crate::source::memory::MemorySource;
use crate::test_utils::{balance_dataset, register_field_types};
use crate::types::Dataset;

pub type TestPipeline = Pipeline<MemoryCatalog, MemorySource, MemoryDestination>;

/// Pipeline config without retry delays and with small batches.
pub fn test_pipeline_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.source.empty_result_retry = RetryConfig::new(1, 0);
    config.reconcile.key_list_retry = RetryConfig::new(1, 0);
    config.batch.row_limit = 2;
    config.batch.max_concurrent_writes = 2;

    config
}

/// Builds a pipeline over in-memory collaborators, with the `balance` dataset registered.
pub async fn create_test_pipeline() -> (TestPipeline, MemorySource, Arc<MemoryDestination>) {
    create_test_pipeline_with(balance_dataset()).await
}

/// Builds a pipeline over in-memory collaborators, with `dataset` registered.
pub async fn create_test_pipeline_with(
    dataset: Dataset,
) -> (TestPipeline, MemorySource, Arc<MemoryDestination>) {
    let catalog = MemoryCatalog::new();
    register_field_types(&catalog).await;
    catalog.add_dataset(dataset).await;

    let source = MemorySource::new();
    let destination = Arc::new(MemoryDestination::new());
    let pipeline = Pipeline::new(
        test_pipeline_config(),
        Arc::new(catalog),
        source.clone(),
        destination.clone(),
    )
    .expect("test pipeline config is valid");

    (pipeline, source, destination)
}
