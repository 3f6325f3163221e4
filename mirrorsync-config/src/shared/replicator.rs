use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{
    BatchConfig, DestinationConfig, MySqlConnectionConfig, PipelineConfig, ReconcileConfig,
    SchedulerConfig, SourceConfig, ValidationError,
};

/// Complete configuration of the replicator service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicatorConfig {
    /// Metadata store holding dataset definitions, schedules and validation rules.
    pub catalog: MySqlConnectionConfig,
    pub destination: DestinationConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl ReplicatorConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.destination.validate()?;
        self.source.validate()?;
        self.batch.validate()?;
        self.reconcile.validate()?;
        self.scheduler.validate()
    }

    /// Pipeline settings carried by this configuration.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            source: self.source.clone(),
            batch: self.batch.clone(),
            reconcile: self.reconcile.clone(),
            scheduler: self.scheduler.clone(),
            mirror_schema_prefix: self.destination.mirror_schema_prefix.clone(),
        }
    }
}

impl Config for ReplicatorConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: ReplicatorConfig = serde_json::from_str(
            r#"{
                "catalog": {"host": "meta", "port": 3306, "name": "topview", "username": "u", "password": "p"},
                "destination": {"connection": {"host": "dest", "port": 3306, "username": "u", "password": null}}
            }"#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.batch.row_limit, BatchConfig::DEFAULT_ROW_LIMIT);
        assert_eq!(config.destination.mirror_schema_prefix, "compare_");
        assert_eq!(config.source.empty_result_retry.max_attempts, 3);
        assert_eq!(config.scheduler.retry.delay_ms, 5_000);
    }
}
