use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use mirrorsync_config::shared::ReconcileConfig;
use tracing::{Instrument, error, info, info_span, warn};

use crate::bail;
use crate::catalog::MetadataCatalog;
use crate::destination::{Destination, KeyColumns};
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::export::{Exporter, Validation};
use crate::reconcile::{
    ReconcileSummary, ReconciliationResult, RepairMode, VersionDiff, diff_sorted, sorted_unique,
};
use crate::source::SourceConnector;
use crate::source::query::ResolvedQuery;
use crate::types::{Dataset, ExportMode, QueryRequest, TableName, Trigger};

/// Compares a dataset's authoritative table with a mirror rebuilt from the source and repairs
/// the difference.
#[derive(Debug)]
pub struct Reconciler<K, C: SourceConnector, D> {
    exporter: Exporter<K, C, D>,
    destination: Arc<D>,
    config: ReconcileConfig,
    mirror_schema_prefix: String,
}

impl<K, C, D> Reconciler<K, C, D>
where
    K: MetadataCatalog,
    C: SourceConnector,
    D: Destination,
{
    pub fn new(
        exporter: Exporter<K, C, D>,
        destination: Arc<D>,
        config: ReconcileConfig,
        mirror_schema_prefix: impl Into<String>,
    ) -> Self {
        Self {
            exporter,
            destination,
            config,
            mirror_schema_prefix: mirror_schema_prefix.into(),
        }
    }

    pub fn mirror_table(&self, table: &TableName) -> TableName {
        table.with_schema_prefix(&self.mirror_schema_prefix)
    }

    /// Runs one reconciliation of `dataset` and applies the repairs allowed by `mode`.
    ///
    /// Failing to rebuild the mirror or to list keys and versions fails the run before any repair
    /// is applied. Failed repair actions are logged and the run continues with the next one.
    pub async fn reconcile(
        &self,
        dataset: &Dataset,
        mode: RepairMode,
        today: NaiveDate,
    ) -> SyncResult<ReconcileSummary> {
        let span = info_span!("reconcile", dataset = %dataset.name, table = %dataset.table, %mode);

        async {
            let mirror = self.mirror_table(&dataset.table);
            self.rebuild_mirror(dataset, &mirror, today).await?;

            let columns = KeyColumns::of(dataset);
            let authoritative_keys = self.list_keys(&dataset.table, columns).await?;
            let mirror_keys = self.list_keys(&mirror, columns).await?;
            let keys = diff_sorted(&authoritative_keys, &mirror_keys);
            info!(
                only_in_authoritative = keys.only_in_a.len(),
                only_in_mirror = keys.only_in_b.len(),
                common = keys.common.len(),
                "key sets compared"
            );

            let mut summary = ReconcileSummary::default();

            for key in &keys.only_in_a {
                warn!(key, "key is missing from the source, deletion candidate");
                if mode.deletes() {
                    summary.rows_deleted += self.delete(dataset, key, None).await;
                }
            }

            for key in &keys.only_in_b {
                warn!(key, "key is missing from the destination, insertion candidate");
                if mode.adds() {
                    summary.rows_inserted += self.copy_from_mirror(dataset, &mirror, key, None).await;
                }
            }

            let mut authoritative_versions =
                self.list_versions(&dataset.table, columns, &keys.common).await?;
            let mut mirror_versions = self.list_versions(&mirror, columns, &keys.common).await?;

            let mut per_key_version_diff = BTreeMap::new();
            for key in &keys.common {
                let authoritative =
                    sorted_unique(authoritative_versions.remove(key).unwrap_or_default());
                let mirrored = sorted_unique(mirror_versions.remove(key).unwrap_or_default());

                let versions = diff_sorted(&authoritative, &mirrored);
                if versions.is_identical() {
                    continue;
                }

                if !versions.only_in_a.is_empty() {
                    warn!(key, versions = ?versions.only_in_a, "versions are missing from the source, deletion candidates");
                    if mode.deletes() {
                        summary.rows_deleted +=
                            self.delete(dataset, key, Some(&versions.only_in_a)).await;
                    }
                }

                if !versions.only_in_b.is_empty() {
                    warn!(key, versions = ?versions.only_in_b, "versions are missing from the destination, insertion candidates");
                    if mode.adds() {
                        summary.rows_inserted += self
                            .copy_from_mirror(dataset, &mirror, key, Some(&versions.only_in_b))
                            .await;
                    }
                }

                per_key_version_diff.insert(
                    key.clone(),
                    VersionDiff {
                        extra_in_authoritative: versions.only_in_a,
                        extra_in_mirror: versions.only_in_b,
                    },
                );
            }

            summary.result = ReconciliationResult {
                keys_only_in_authoritative: keys.only_in_a,
                keys_only_in_mirror: keys.only_in_b,
                common_keys: keys.common,
                per_key_version_diff,
            };

            info!(
                rows_deleted = summary.rows_deleted,
                rows_inserted = summary.rows_inserted,
                "reconciliation finished"
            );

            Ok(summary)
        }
        .instrument(span)
        .await
    }

    /// Truncates the mirror and fills it with every current source row, without validation.
    async fn rebuild_mirror(
        &self,
        dataset: &Dataset,
        mirror: &TableName,
        today: NaiveDate,
    ) -> SyncResult<()> {
        info!(%mirror, "rebuilding mirror table");
        self.destination.truncate(mirror).await?;

        let request = QueryRequest::new(dataset.name.as_str(), ExportMode::Full, Trigger::Manual)
            .with_table(dataset.table.clone());
        let query = ResolvedQuery::for_request(dataset, &request, ExportMode::Full, today)?;

        let summary = self
            .exporter
            .run(dataset, &query, mirror, Validation::Skip)
            .await?;
        if summary.failed_batches > 0 {
            bail!(
                ErrorKind::WriteFailure,
                "Mirror table could not be rebuilt completely",
                format!(
                    "{mirror}: {} of {} batches failed",
                    summary.failed_batches, summary.batches
                )
            );
        }

        Ok(())
    }

    /// Lists the distinct keys of `table`, retrying while the listing is empty.
    ///
    /// A listing that stays empty fails with [`ErrorKind::NoData`]: diffing against an empty key
    /// set would mark every key of the other table for deletion or insertion.
    async fn list_keys(&self, table: &TableName, columns: KeyColumns<'_>) -> SyncResult<Vec<String>> {
        let max_attempts = self.config.key_list_retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let keys = self.destination.distinct_keys(table, columns).await?;
            if !keys.is_empty() {
                return Ok(sorted_unique(keys));
            }

            if attempt < max_attempts {
                warn!(%table, attempt, max_attempts, "key listing returned no keys, retrying");
                tokio::time::sleep(self.config.key_list_retry.delay()).await;
            }
        }

        bail!(
            ErrorKind::NoData,
            "Key listing stayed empty after retrying",
            format!("{table}: {max_attempts} attempts")
        );
    }

    async fn list_versions(
        &self,
        table: &TableName,
        columns: KeyColumns<'_>,
        keys: &[String],
    ) -> SyncResult<HashMap<String, Vec<i64>>> {
        let mut versions: HashMap<String, Vec<i64>> = HashMap::new();

        for chunk in keys.chunks(self.config.version_lookup_chunk.max(1)) {
            let chunk_versions = self.destination.key_versions(table, columns, chunk).await?;
            for (key, mut key_versions) in chunk_versions {
                versions.entry(key).or_default().append(&mut key_versions);
            }
        }

        Ok(versions)
    }

    /// Deletes the rows of `key` from the authoritative table and returns how many went away.
    async fn delete(&self, dataset: &Dataset, key: &str, versions: Option<&[i64]>) -> u64 {
        match self
            .destination
            .delete_rows(&dataset.table, KeyColumns::of(dataset), key, versions)
            .await
        {
            Ok(rows_deleted) => {
                info!(key, ?versions, rows_deleted, "deleted drifted rows");
                rows_deleted
            }
            Err(err) => {
                error!(key, ?versions, error = %err, "could not delete drifted rows");
                0
            }
        }
    }

    /// Copies the rows of `key` from the mirror into the authoritative table and returns how
    /// many were written.
    async fn copy_from_mirror(
        &self,
        dataset: &Dataset,
        mirror: &TableName,
        key: &str,
        versions: Option<&[i64]>,
    ) -> u64 {
        let result = async {
            let rows = self
                .destination
                .fetch_rows(mirror, KeyColumns::of(dataset), key, versions)
                .await?;
            if rows.is_empty() {
                return Ok(0);
            }

            let transformed = self
                .exporter
                .transform(dataset, &dataset.table, rows, Validation::Skip)
                .await?;
            let batches = self.exporter.batches(&dataset.table, transformed);
            let summary = self.exporter.writer().write_sequential(batches).await;

            Ok::<_, SyncError>(summary.rows_written)
        }
        .await;

        match result {
            Ok(rows_inserted) => {
                info!(key, ?versions, rows_inserted, "copied missing rows from mirror");
                rows_inserted
            }
            Err(err) => {
                error!(key, ?versions, error = %err, "could not copy missing rows from mirror");
                0
            }
        }
    }
}
