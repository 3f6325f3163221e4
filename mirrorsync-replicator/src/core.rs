use std::sync::Arc;

use anyhow::Context;
use mirrorsync::catalog::mysql::MySqlCatalog;
use mirrorsync::destination::mysql::MySqlDestination;
use mirrorsync::pipeline::Pipeline;
use mirrorsync::scheduler::TaskScheduler;
use mirrorsync::source::postgres::PgConnector;
use mirrorsync_config::shared::{
    BatchConfig, DestinationConfig, MySqlConnectionConfig, ReplicatorConfig, SchedulerConfig,
    SourceConfig,
};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

/// Starts the replicator with `replicator_config` and runs it until SIGINT or SIGTERM.
///
/// Scheduled exports in progress when the signal arrives are allowed to finish.
pub async fn start_replicator_with_config(
    replicator_config: ReplicatorConfig,
) -> anyhow::Result<()> {
    info!("starting replicator service");

    log_config(&replicator_config);

    let catalog = Arc::new(
        MySqlCatalog::connect(
            &replicator_config.catalog,
            replicator_config.source.tls.clone(),
        )
        .await
        .context("failed to load the metadata catalog")?,
    );
    let destination = Arc::new(MySqlDestination::new(&replicator_config.destination));
    let connector = PgConnector::new(replicator_config.source.statement_timeout_ms);

    let pipeline = Arc::new(Pipeline::new(
        replicator_config.pipeline_config(),
        catalog.clone(),
        connector,
        destination,
    )
    .context("failed to build the pipeline")?);

    if let Err(err) = pipeline.health_check().await {
        warn!(error = %err, "destination is not reachable yet, exports will retry");
    }

    let scheduler = TaskScheduler::new(
        pipeline.clone(),
        pipeline.offset(),
        replicator_config.scheduler.retry,
    );
    scheduler
        .register_catalog_tasks(catalog.as_ref())
        .await
        .context("failed to register scheduled tasks")?;
    scheduler.start().await;

    let health_sweep = pipeline.spawn_health_sweep();

    wait_for_shutdown_signal().await?;

    scheduler.shutdown().await;
    pipeline.shutdown();
    if let Err(err) = health_sweep.await {
        warn!(error = %err, "health sweep ended abnormally");
    }

    info!("replicator stopped");

    Ok(())
}

async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("sigint (ctrl+c) received, shutting down replicator");
        }
        _ = sigterm.recv() => {
            info!("sigterm received, shutting down replicator");
        }
    }

    Ok(())
}

fn log_config(config: &ReplicatorConfig) {
    log_mysql_connection_config("catalog", &config.catalog);
    log_destination_config(&config.destination);
    log_source_config(&config.source);
    log_batch_config(&config.batch);
    log_scheduler_config(&config.scheduler);
}

fn log_mysql_connection_config(role: &str, config: &MySqlConnectionConfig) {
    debug!(
        role,
        host = config.host,
        port = config.port,
        dbname = config.name,
        username = config.username,
        "mysql connection config"
    );
}

fn log_destination_config(config: &DestinationConfig) {
    log_mysql_connection_config("destination", &config.connection);
    debug!(
        max_connections = config.max_connections,
        mirror_schema_prefix = config.mirror_schema_prefix,
        "destination config"
    );
}

fn log_source_config(config: &SourceConfig) {
    debug!(
        statement_timeout_ms = config.statement_timeout_ms,
        health_check_interval_ms = config.health_check_interval_ms,
        pool_shards = config.pool_shards,
        tls_enabled = config.tls.enabled,
        "source config"
    );
}

fn log_batch_config(config: &BatchConfig) {
    debug!(
        row_limit = config.row_limit,
        max_concurrent_writes = config.max_concurrent_writes,
        "batch config"
    );
}

fn log_scheduler_config(config: &SchedulerConfig) {
    debug!(
        utc_offset = config.utc_offset,
        retry_attempts = config.retry.max_attempts,
        retry_delay_ms = config.retry.delay_ms,
        "scheduler config"
    );
}
