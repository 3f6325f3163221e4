use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::batch::RowBatch;
use crate::destination::{Destination, KeyColumns};
use crate::error::{ErrorKind, SyncResult};
use crate::source::{SourceColumn, SourceRows};
use crate::transform::Literal;
use crate::types::{DEFAULT_KEY_COLUMN, DEFAULT_VERSION_COLUMN, TableName};
use crate::{bail, sync_error};

type MemoryRow = HashMap<String, Literal>;

#[derive(Debug, Default)]
struct MemoryTable {
    columns: Vec<String>,
    rows: Vec<MemoryRow>,
}

impl MemoryTable {
    fn text<'a>(row: &'a MemoryRow, column: &str) -> Option<&'a str> {
        row.get(column).and_then(Literal::as_text)
    }

    fn matches(row: &MemoryRow, columns: KeyColumns<'_>, key: &str, versions: Option<&[i64]>) -> bool {
        if Self::text(row, columns.key) != Some(key) {
            return false;
        }

        match versions {
            None => true,
            Some(versions) => Self::text(row, columns.version)
                .and_then(|version| version.parse::<i64>().ok())
                .is_some_and(|version| versions.contains(&version)),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<TableName, MemoryTable>,
    failing_keys: HashSet<String>,
    keyless_tables: HashSet<TableName>,
    unreachable: bool,
    writes: usize,
}

/// In-memory destination for testing and development purposes.
///
/// Writes replace rows that share the same key and version, like the keyed `REPLACE` statements of
/// the MySQL destination.
#[derive(Debug, Clone)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
    key_column: Arc<str>,
    version_column: Arc<str>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            key_column: DEFAULT_KEY_COLUMN.into(),
            version_column: DEFAULT_VERSION_COLUMN.into(),
        }
    }

    /// Makes every batch containing a row with `key` fail to write.
    pub async fn fail_writes_with_key(&self, key: impl Into<String>) {
        self.inner.lock().await.failing_keys.insert(key.into());
    }

    /// Makes key listings of `table` come back empty while its rows stay in place.
    pub async fn list_no_keys_for(&self, table: TableName) {
        self.inner.lock().await.keyless_tables.insert(table);
    }

    pub async fn set_reachable(&self, reachable: bool) {
        self.inner.lock().await.unreachable = !reachable;
    }

    /// Number of batches written successfully.
    pub async fn write_count(&self) -> usize {
        self.inner.lock().await.writes
    }

    /// Returns the rows of `table` as text, ordered by key and version.
    pub async fn table_rows(&self, table: &TableName) -> Vec<HashMap<String, Option<String>>> {
        let inner = self.inner.lock().await;
        let Some(stored) = inner.tables.get(table) else {
            return Vec::new();
        };

        let mut rows = stored
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(column, literal)| (column.clone(), literal.as_text().map(str::to_string)))
                    .collect::<HashMap<_, _>>()
            })
            .collect::<Vec<_>>();
        rows.sort_by_key(|row| {
            (
                row.get(self.key_column.as_ref()).cloned().flatten(),
                row.get(self.version_column.as_ref()).cloned().flatten(),
            )
        });

        rows
    }

    /// Distinct keys of `table`, for assertions.
    pub async fn keys(&self, table: &TableName) -> Vec<String> {
        let inner = self.inner.lock().await;
        let Some(stored) = inner.tables.get(table) else {
            return Vec::new();
        };

        stored
            .rows
            .iter()
            .filter_map(|row| MemoryTable::text(row, &self.key_column).map(str::to_string))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn check_reachable(inner: &Inner) -> SyncResult<()> {
        if inner.unreachable {
            bail!(
                ErrorKind::ConnectionUnavailable,
                "In-memory destination is unreachable"
            );
        }

        Ok(())
    }
}

impl Default for MemoryDestination {
    fn default() -> Self {
        Self::new()
    }
}

impl Destination for MemoryDestination {
    fn name() -> &'static str {
        "memory"
    }

    async fn ping(&self) -> SyncResult<()> {
        let inner = self.inner.lock().await;
        Self::check_reachable(&inner)
    }

    async fn write_batch(&self, batch: &RowBatch) -> SyncResult<u64> {
        let mut inner = self.inner.lock().await;
        Self::check_reachable(&inner)?;

        let key_index = batch
            .columns
            .iter()
            .position(|column| **column == *self.key_column);
        let version_index = batch
            .columns
            .iter()
            .position(|column| **column == *self.version_column);

        if let Some(key_index) = key_index {
            let failing = batch.tuples.iter().find_map(|tuple| {
                tuple.values()[key_index]
                    .as_text()
                    .filter(|key| inner.failing_keys.contains(*key))
            });
            if let Some(key) = failing {
                return Err(sync_error!(
                    ErrorKind::WriteFailure,
                    "In-memory destination rejected the batch",
                    format!("{} contains key {key}", batch.table)
                ));
            }
        }

        info!(table = %batch.table, rows = batch.len(), "writing batch to memory destination");

        let table = inner.tables.entry(batch.table.clone()).or_default();
        for column in batch.columns.iter() {
            if !table.columns.contains(column) {
                table.columns.push(column.clone());
            }
        }

        for tuple in &batch.tuples {
            let row: MemoryRow = batch
                .columns
                .iter()
                .cloned()
                .zip(tuple.values().iter().cloned())
                .collect();

            let existing = match (key_index, version_index) {
                (Some(key_index), Some(version_index)) => {
                    let key = tuple.values()[key_index].as_text();
                    let version = tuple.values()[version_index].as_text();
                    table.rows.iter().position(|stored| {
                        MemoryTable::text(stored, &self.key_column) == key
                            && MemoryTable::text(stored, &self.version_column) == version
                    })
                }
                _ => None,
            };

            match existing {
                Some(index) => table.rows[index] = row,
                None => table.rows.push(row),
            }
        }
        inner.writes += 1;

        Ok(batch.len() as u64)
    }

    async fn truncate(&self, table: &TableName) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        Self::check_reachable(&inner)?;

        info!(%table, "truncating memory table");
        if let Some(stored) = inner.tables.get_mut(table) {
            stored.rows.clear();
        }

        Ok(())
    }

    async fn distinct_keys(
        &self,
        table: &TableName,
        columns: KeyColumns<'_>,
    ) -> SyncResult<Vec<String>> {
        let inner = self.inner.lock().await;
        Self::check_reachable(&inner)?;
        if inner.keyless_tables.contains(table) {
            return Ok(Vec::new());
        }

        let keys = inner
            .tables
            .get(table)
            .map(|stored| {
                stored
                    .rows
                    .iter()
                    .filter_map(|row| MemoryTable::text(row, columns.key).map(str::to_string))
                    .collect::<BTreeSet<_>>()
            })
            .unwrap_or_default();

        Ok(keys.into_iter().collect())
    }

    async fn key_versions(
        &self,
        table: &TableName,
        columns: KeyColumns<'_>,
        keys: &[String],
    ) -> SyncResult<HashMap<String, Vec<i64>>> {
        let inner = self.inner.lock().await;
        Self::check_reachable(&inner)?;

        let mut versions: HashMap<String, Vec<i64>> = HashMap::new();
        let Some(stored) = inner.tables.get(table) else {
            return Ok(versions);
        };

        for row in &stored.rows {
            let Some(key) = MemoryTable::text(row, columns.key) else {
                continue;
            };
            if !keys.iter().any(|k| k == key) {
                continue;
            }
            let Some(version) = MemoryTable::text(row, columns.version) else {
                continue;
            };
            let version = version.parse::<i64>().map_err(|err| {
                sync_error!(
                    ErrorKind::ConversionError,
                    "Destination version is not an integer",
                    format!("{table} key {key} has version `{version}`"),
                    source: err
                )
            })?;
            versions.entry(key.to_string()).or_default().push(version);
        }

        Ok(versions)
    }

    async fn delete_rows(
        &self,
        table: &TableName,
        columns: KeyColumns<'_>,
        key: &str,
        versions: Option<&[i64]>,
    ) -> SyncResult<u64> {
        let mut inner = self.inner.lock().await;
        Self::check_reachable(&inner)?;

        let Some(stored) = inner.tables.get_mut(table) else {
            return Ok(0);
        };
        let before = stored.rows.len();
        stored
            .rows
            .retain(|row| !MemoryTable::matches(row, columns, key, versions));

        Ok((before - stored.rows.len()) as u64)
    }

    async fn fetch_rows(
        &self,
        table: &TableName,
        columns: KeyColumns<'_>,
        key: &str,
        versions: Option<&[i64]>,
    ) -> SyncResult<SourceRows> {
        let inner = self.inner.lock().await;
        Self::check_reachable(&inner)?;

        let Some(stored) = inner.tables.get(table) else {
            return Ok(SourceRows::default());
        };

        let rows = stored
            .rows
            .iter()
            .filter(|row| MemoryTable::matches(row, columns, key, versions))
            .map(|row| {
                stored
                    .columns
                    .iter()
                    .map(|column| MemoryTable::text(row, column).map(str::to_string))
                    .collect()
            })
            .collect::<Vec<_>>();
        if rows.is_empty() {
            return Ok(SourceRows::default());
        }

        let source_columns = stored
            .columns
            .iter()
            .map(|column| SourceColumn::new(column.clone(), false))
            .collect();

        Ok(SourceRows::new(source_columns, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::ValueTuple;

    fn batch(table: &TableName, rows: &[(&str, i64, &str)]) -> RowBatch {
        RowBatch {
            table: table.clone(),
            columns: Arc::from(vec![
                "zqdm".to_string(),
                "bbrq".to_string(),
                "note".to_string(),
            ]),
            tuples: rows
                .iter()
                .map(|(key, version, note)| {
                    ValueTuple(vec![
                        Literal::Quoted(key.to_string()),
                        Literal::Bare(version.to_string()),
                        Literal::Quoted(note.to_string()),
                    ])
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn writes_replace_rows_with_the_same_key_and_version() {
        let destination = MemoryDestination::new();
        let table = TableName::new("fin", "balance");
        let columns = KeyColumns::new("zqdm", "bbrq");

        destination
            .write_batch(&batch(&table, &[("000001", 20231231, "a"), ("000002", 20231231, "b")]))
            .await
            .unwrap();
        destination
            .write_batch(&batch(&table, &[("000001", 20231231, "c"), ("000001", 20240331, "d")]))
            .await
            .unwrap();

        assert_eq!(destination.table_rows(&table).await.len(), 3);
        let fetched = destination
            .fetch_rows(&table, columns, "000001", Some(&[20231231]))
            .await
            .unwrap();
        assert_eq!(fetched.rows, vec![vec![
            Some("000001".to_string()),
            Some("20231231".to_string()),
            Some("c".to_string())
        ]]);

        let versions = destination
            .key_versions(&table, columns, &["000001".to_string()])
            .await
            .unwrap();
        assert_eq!(versions["000001"].len(), 2);
    }

    #[tokio::test]
    async fn delete_rows_respects_versions() {
        let destination = MemoryDestination::new();
        let table = TableName::new("fin", "balance");
        let columns = KeyColumns::new("zqdm", "bbrq");
        destination
            .write_batch(&batch(
                &table,
                &[("000001", 1, "a"), ("000001", 2, "b"), ("000002", 1, "c")],
            ))
            .await
            .unwrap();

        let deleted = destination
            .delete_rows(&table, columns, "000001", Some(&[2]))
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let deleted = destination
            .delete_rows(&table, columns, "000001", None)
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(
            destination.distinct_keys(&table, columns).await.unwrap(),
            vec!["000002".to_string()]
        );
    }

    #[tokio::test]
    async fn failing_keys_reject_their_batch() {
        let destination = MemoryDestination::new();
        let table = TableName::new("fin", "balance");
        destination.fail_writes_with_key("000002").await;

        let err = destination
            .write_batch(&batch(&table, &[("000001", 1, "a"), ("000002", 1, "b")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteFailure);
        assert!(destination.keys(&table).await.is_empty());
    }
}
