use std::collections::HashMap;
use std::future::Future;

use crate::batch::RowBatch;
use crate::error::SyncResult;
use crate::source::SourceRows;
use crate::types::{Dataset, TableName};

/// Names of the key and version columns of a destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyColumns<'a> {
    pub key: &'a str,
    pub version: &'a str,
}

impl<'a> KeyColumns<'a> {
    pub fn new(key: &'a str, version: &'a str) -> Self {
        Self { key, version }
    }

    pub fn of(dataset: &'a Dataset) -> Self {
        Self::new(&dataset.key_column, &dataset.version_column)
    }
}

/// A store that receives formatted rows and answers the queries reconciliation needs.
///
/// Writes are keyed replacements, so applying the same batch twice or batches out of order
/// leaves the table in the same state.
pub trait Destination: Send + Sync + 'static {
    /// Returns the name of the destination.
    fn name() -> &'static str;

    /// Checks that the destination can be reached.
    fn ping(&self) -> impl Future<Output = SyncResult<()>> + Send;

    /// Writes one batch and returns the number of affected rows.
    fn write_batch(&self, batch: &RowBatch) -> impl Future<Output = SyncResult<u64>> + Send;

    /// Removes every row of `table`.
    fn truncate(&self, table: &TableName) -> impl Future<Output = SyncResult<()>> + Send;

    /// Returns the distinct keys of `table`, sorted ascending.
    fn distinct_keys(
        &self,
        table: &TableName,
        columns: KeyColumns<'_>,
    ) -> impl Future<Output = SyncResult<Vec<String>>> + Send;

    /// Returns the versions stored for each of `keys`. Keys without rows are absent from the map.
    fn key_versions(
        &self,
        table: &TableName,
        columns: KeyColumns<'_>,
        keys: &[String],
    ) -> impl Future<Output = SyncResult<HashMap<String, Vec<i64>>>> + Send;

    /// Deletes the rows of `key`, restricted to `versions` when given, and returns how many rows
    /// were removed.
    fn delete_rows(
        &self,
        table: &TableName,
        columns: KeyColumns<'_>,
        key: &str,
        versions: Option<&[i64]>,
    ) -> impl Future<Output = SyncResult<u64>> + Send;

    /// Reads the rows of `key`, restricted to `versions` when given, as text.
    fn fetch_rows(
        &self,
        table: &TableName,
        columns: KeyColumns<'_>,
        key: &str,
        versions: Option<&[i64]>,
    ) -> impl Future<Output = SyncResult<SourceRows>> + Send;
}
