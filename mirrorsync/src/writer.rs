//! Execution of row batches against a destination.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::batch::RowBatch;
use crate::destination::Destination;
use crate::error::{ErrorKind, SyncResult};
use crate::sync_error;

/// Outcome of writing the batches of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub batches: usize,
    pub failed_batches: usize,
    pub rows_written: u64,
    /// Rows dropped by `SkipRow` validation rules before batching.
    pub skipped_rows: usize,
}

impl ExportSummary {
    pub fn merge(&mut self, other: ExportSummary) {
        self.batches += other.batches;
        self.failed_batches += other.failed_batches;
        self.rows_written += other.rows_written;
        self.skipped_rows += other.skipped_rows;
    }
}

/// Writes batches with a best-effort policy: a failed batch is logged and counted, and never
/// cancels the batches around it.
#[derive(Debug)]
pub struct BatchWriter<D> {
    destination: Arc<D>,
    max_concurrent_writes: usize,
}

impl<D> Clone for BatchWriter<D> {
    fn clone(&self) -> Self {
        Self {
            destination: self.destination.clone(),
            max_concurrent_writes: self.max_concurrent_writes,
        }
    }
}

impl<D> BatchWriter<D>
where
    D: Destination,
{
    pub fn new(destination: Arc<D>, max_concurrent_writes: usize) -> Self {
        Self {
            destination,
            max_concurrent_writes: max_concurrent_writes.max(1),
        }
    }

    /// Writes every batch in its own task, with at most `max_concurrent_writes` in flight, and
    /// waits for all of them.
    ///
    /// Only a failure to schedule the tasks is returned as an error.
    pub async fn write_concurrent(&self, batches: Vec<RowBatch>) -> SyncResult<ExportSummary> {
        let mut summary = ExportSummary {
            batches: batches.len(),
            ..ExportSummary::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_writes));
        let mut join_set = JoinSet::new();

        for (index, batch) in batches.into_iter().enumerate() {
            // Hold a slot until the batch is written.
            let permit = semaphore.clone().acquire_owned().await.map_err(|err| {
                sync_error!(
                    ErrorKind::InvalidState,
                    "Could not acquire semaphore while writing batches concurrently",
                    err.to_string()
                )
            })?;

            let destination = self.destination.clone();
            join_set.spawn(async move {
                let result = destination.write_batch(&batch).await;

                drop(permit);

                (index, batch.table, result)
            });
        }

        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((batch, table, Ok(rows_affected))) => {
                    info!(%table, batch, rows_affected, "batch written");
                    summary.rows_written += rows_affected;
                }
                Ok((batch, table, Err(err))) => {
                    error!(%table, batch, error = %err, "batch write failed");
                    summary.failed_batches += 1;
                }
                Err(join_err) => {
                    let err = sync_error!(
                        ErrorKind::TaskPanicked,
                        "Batch write task panicked",
                        join_err.to_string()
                    );
                    error!(error = %err, "batch write task panicked");
                    summary.failed_batches += 1;
                }
            }
        }

        if summary.failed_batches > 0 {
            warn!(
                batches = summary.batches,
                failed_batches = summary.failed_batches,
                "some batches could not be written"
            );
        }

        Ok(summary)
    }

    /// Writes batches one after the other, used for repairs to bound the destination load.
    pub async fn write_sequential(&self, batches: Vec<RowBatch>) -> ExportSummary {
        let mut summary = ExportSummary {
            batches: batches.len(),
            ..ExportSummary::default()
        };

        for (batch, rows) in batches.iter().enumerate() {
            match self.destination.write_batch(rows).await {
                Ok(rows_affected) => {
                    info!(table = %rows.table, batch, rows_affected, "batch written");
                    summary.rows_written += rows_affected;
                }
                Err(err) => {
                    error!(table = %rows.table, batch, error = %err, "batch write failed");
                    summary.failed_batches += 1;
                }
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchAssembler;
    use crate::destination::memory::MemoryDestination;
    use crate::transform::{Literal, ValueTuple};
    use crate::types::TableName;

    fn batches(table: &TableName, keys: &[&str], row_limit: usize) -> Vec<RowBatch> {
        let columns: Arc<[String]> = Arc::from(vec!["zqdm".to_string(), "bbrq".to_string()]);
        let tuples = keys
            .iter()
            .map(|key| {
                ValueTuple(vec![
                    Literal::Quoted(key.to_string()),
                    Literal::Bare("20231231".to_string()),
                ])
            })
            .collect();

        BatchAssembler::new(row_limit).assemble(table, columns, tuples)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_batches_do_not_cancel_siblings() {
        let destination = Arc::new(MemoryDestination::new());
        destination.fail_writes_with_key("000003").await;
        let table = TableName::new("fin", "balance");
        let writer = BatchWriter::new(destination.clone(), 2);

        let summary = writer
            .write_concurrent(batches(
                &table,
                &["000001", "000002", "000003", "000004", "000005"],
                2,
            ))
            .await
            .unwrap();

        assert_eq!(summary.batches, 3);
        assert_eq!(summary.failed_batches, 1);
        assert_eq!(summary.rows_written, 3);
        assert_eq!(
            destination.keys(&table).await,
            vec!["000001", "000002", "000005"]
        );
    }

    #[tokio::test]
    async fn sequential_writes_count_failures() {
        let destination = Arc::new(MemoryDestination::new());
        destination.fail_writes_with_key("000001").await;
        let table = TableName::new("fin", "balance");
        let writer = BatchWriter::new(destination.clone(), 1);

        let summary = writer
            .write_sequential(batches(&table, &["000001", "000002"], 1))
            .await;

        assert_eq!(
            summary,
            ExportSummary {
                batches: 2,
                failed_batches: 1,
                rows_written: 1,
                skipped_rows: 0,
            }
        );
    }
}
