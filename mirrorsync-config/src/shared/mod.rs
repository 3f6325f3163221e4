//! Configuration shared by the mirrorsync library and its binaries.

mod base;
mod batch;
mod connection;
mod destination;
mod pipeline;
mod reconcile;
mod replicator;
mod retry;
mod scheduler;
mod source;

pub use base::ValidationError;
pub use batch::BatchConfig;
pub use connection::{
    MySqlConnectionConfig, PgConnectionConfig, PgConnectionOptions, TlsConfig,
};
pub use destination::DestinationConfig;
pub use pipeline::PipelineConfig;
pub use reconcile::ReconcileConfig;
pub use replicator::ReplicatorConfig;
pub use retry::RetryConfig;
pub use scheduler::SchedulerConfig;
pub use source::SourceConfig;
