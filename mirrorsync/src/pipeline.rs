//! Entry points of the export and reconciliation pipeline.

use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate, Utc};
use mirrorsync_config::shared::PipelineConfig;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::batch::BatchAssembler;
use crate::catalog::MetadataCatalog;
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::destination::Destination;
use crate::error::{ErrorKind, SyncResult};
use crate::export::{Exporter, Validation};
use crate::reconcile::{ReconcileSummary, Reconciler, RepairMode};
use crate::scheduler::ScheduledRun;
use crate::source::SourceConnector;
use crate::source::extractor::Extractor;
use crate::source::pool::ConnectionPool;
use crate::source::query::ResolvedQuery;
use crate::sync_error;
use crate::types::{ExportMode, QueryRequest, Trigger};
use crate::writer::{BatchWriter, ExportSummary};

/// Wires the catalog, the source pool and the destination into the operations exposed to
/// callers: exports, reconciliations and health checks.
#[derive(Debug)]
pub struct Pipeline<K, C: SourceConnector, D> {
    catalog: Arc<K>,
    pool: Arc<ConnectionPool<C>>,
    destination: Arc<D>,
    exporter: Exporter<K, C, D>,
    reconciler: Reconciler<K, C, D>,
    offset: FixedOffset,
    config: PipelineConfig,
    shutdown_tx: ShutdownTx,
}

impl<K, C, D> Pipeline<K, C, D>
where
    K: MetadataCatalog,
    C: SourceConnector,
    D: Destination,
{
    pub fn new(
        config: PipelineConfig,
        catalog: Arc<K>,
        connector: C,
        destination: Arc<D>,
    ) -> SyncResult<Self> {
        let offset_seconds = config.scheduler.utc_offset_seconds().map_err(|err| {
            sync_error!(
                ErrorKind::ConfigError,
                "Scheduler offset is invalid",
                source: err
            )
        })?;
        let Some(offset) = FixedOffset::east_opt(offset_seconds) else {
            return Err(sync_error!(
                ErrorKind::ConfigError,
                "Scheduler offset is out of range",
                config.scheduler.utc_offset.as_str()
            ));
        };

        let pool = Arc::new(ConnectionPool::new(connector, config.source.pool_shards));
        let extractor = Extractor::new(pool.clone(), config.source.empty_result_retry);
        let writer = BatchWriter::new(destination.clone(), config.batch.max_concurrent_writes);
        let exporter = Exporter::new(
            catalog.clone(),
            extractor,
            writer,
            BatchAssembler::new(config.batch.row_limit),
        );
        let reconciler = Reconciler::new(
            exporter.clone(),
            destination.clone(),
            config.reconcile.clone(),
            config.mirror_schema_prefix.clone(),
        );
        let (shutdown_tx, _) = create_shutdown_channel();

        Ok(Self {
            catalog,
            pool,
            destination,
            exporter,
            reconciler,
            offset,
            config,
            shutdown_tx,
        })
    }

    pub fn catalog(&self) -> &Arc<K> {
        &self.catalog
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Sender stopping the pipeline's background tasks.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// The current date in the scheduler's offset, used for default request dates.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }

    /// Exports the rows `request` selects from `dataset_name` into its destination table.
    ///
    /// A [`ExportMode::Compare`] request does not export; it reconciles the dataset with every
    /// repair enabled and returns an empty summary.
    pub async fn export(
        &self,
        dataset_name: &str,
        request: QueryRequest,
    ) -> SyncResult<ExportSummary> {
        let dataset = self.catalog.resolve(dataset_name).await?;

        if request.mode == ExportMode::Compare {
            let summary = self
                .reconciler
                .reconcile(&dataset, RepairMode::DELETE | RepairMode::ADD, self.today())
                .await?;
            info!(
                dataset = dataset_name,
                rows_deleted = summary.rows_deleted,
                rows_inserted = summary.rows_inserted,
                "comparison export finished"
            );

            return Ok(ExportSummary::default());
        }

        let query = ResolvedQuery::for_request(&dataset, &request, request.mode, self.today())?;
        info!(
            dataset = dataset_name,
            mode = %request.mode,
            trigger = ?request.trigger,
            "starting export"
        );

        self.exporter
            .run(&dataset, &query, &dataset.table, Validation::Apply)
            .await
    }

    /// Reconciles `dataset_name` against a freshly rebuilt mirror, applying the repairs in
    /// `mode`.
    pub async fn reconcile(
        &self,
        dataset_name: &str,
        mode: RepairMode,
    ) -> SyncResult<ReconcileSummary> {
        let dataset = self.catalog.resolve(dataset_name).await?;

        self.reconciler.reconcile(&dataset, mode, self.today()).await
    }

    /// Pings the destination, then sweeps the source pool.
    pub async fn health_check(&self) -> SyncResult<()> {
        self.destination.ping().await.map_err(|err| {
            sync_error!(
                ErrorKind::ConnectionUnavailable,
                "Destination is unreachable",
                D::name(),
                source: err
            )
        })?;

        self.pool.sweep().await
    }

    /// Starts the periodic source health sweep, which runs until [`Pipeline::shutdown_tx`] fires.
    pub fn spawn_health_sweep(&self) -> JoinHandle<()> {
        self.pool.clone().spawn_health_sweep(
            self.config.source.health_check_interval(),
            self.shutdown_tx.subscribe(),
        )
    }

    /// Signals every background task to stop.
    pub fn shutdown(&self) {
        if self.shutdown_tx.send(()).is_err() {
            warn!("no background task was listening for shutdown");
        }
    }
}

impl<K, C, D> ScheduledRun for Pipeline<K, C, D>
where
    K: MetadataCatalog,
    C: SourceConnector,
    D: Destination,
{
    async fn run(&self, dataset: &str, mode: ExportMode) -> SyncResult<()> {
        let request = QueryRequest::new(dataset, mode, Trigger::Scheduled);
        self.export(dataset, request).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::MemoryCatalog;
    use crate::destination::memory::MemoryDestination;
    use crate::source::memory::MemorySource;
    use crate::test_utils::test_pipeline_config;

    #[test]
    fn invalid_scheduler_offset_is_a_config_error() {
        let mut config = test_pipeline_config();
        config.scheduler.utc_offset = "eight hours".to_string();

        let err = Pipeline::new(
            config,
            Arc::new(MemoryCatalog::new()),
            MemorySource::new(),
            Arc::new(MemoryDestination::new()),
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[test]
    fn today_uses_the_scheduler_offset() {
        let mut config = test_pipeline_config();
        config.scheduler.utc_offset = "-05:30".to_string();

        let pipeline = Pipeline::new(
            config,
            Arc::new(MemoryCatalog::new()),
            MemorySource::new(),
            Arc::new(MemoryDestination::new()),
        )
        .unwrap();

        assert_eq!(pipeline.offset().local_minus_utc(), -(5 * 3600 + 30 * 60));
        let expected = Utc::now()
            .with_timezone(&FixedOffset::west_opt(5 * 3600 + 30 * 60).unwrap())
            .date_naive();
        assert_eq!(pipeline.today(), expected);
    }
}
