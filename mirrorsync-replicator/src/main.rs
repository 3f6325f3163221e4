//! Mirrorsync replicator service binary.
//!
//! Loads the dataset catalog, schedules the catalog's export tasks and keeps the source
//! connections healthy until a shutdown signal arrives.

use mirrorsync_config::shared::ReplicatorConfig;
use mirrorsync_telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::load_replicator_config;
use crate::core::start_replicator_with_config;
use crate::error::{ReplicatorError, ReplicatorResult};

mod config;
mod core;
mod error;

fn main() -> ReplicatorResult<()> {
    let replicator_config = load_replicator_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME")).map_err(ReplicatorError::config)?;

    // Both rustls backends can end up enabled through feature unification.
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("a rustls crypto provider was already installed");
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(replicator_config))?;

    Ok(())
}

async fn async_main(replicator_config: ReplicatorConfig) -> ReplicatorResult<()> {
    if let Err(err) = start_replicator_with_config(replicator_config).await {
        let err = ReplicatorError::from(err);
        error!("{err}");
        eprint!("{}", err.render_report());

        return Err(err);
    }

    Ok(())
}
