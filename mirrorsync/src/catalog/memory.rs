use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::catalog::{CatalogSnapshot, MetadataCatalog, ScheduledTask};
use crate::error::SyncResult;
use crate::types::{Dataset, FieldType, TableName};

/// Catalog held entirely in memory, for tests and for embedding without a metadata store.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    inner: Arc<RwLock<CatalogSnapshot>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(snapshot)),
        }
    }

    pub async fn add_dataset(&self, dataset: Dataset) {
        self.inner.write().await.insert_dataset(dataset);
    }

    pub async fn add_field_type(&self, schema: &str, field: &str, field_type: FieldType) {
        self.inner
            .write()
            .await
            .insert_field_type(schema, field, field_type);
    }

    pub async fn add_task(&self, task: ScheduledTask) {
        self.inner.write().await.insert_task(task);
    }
}

impl MetadataCatalog for MemoryCatalog {
    async fn resolve(&self, name: &str) -> SyncResult<Arc<Dataset>> {
        self.inner.read().await.resolve(name)
    }

    async fn resolve_table(&self, table: &TableName) -> SyncResult<Arc<Dataset>> {
        self.inner.read().await.resolve_table(table)
    }

    async fn field_types(
        &self,
        schema: &str,
        columns: &[String],
    ) -> SyncResult<HashMap<String, FieldType>> {
        Ok(self.inner.read().await.field_types(schema, columns))
    }

    async fn scheduled_tasks(&self) -> SyncResult<Vec<ScheduledTask>> {
        Ok(self.inner.read().await.tasks().to_vec())
    }
}
