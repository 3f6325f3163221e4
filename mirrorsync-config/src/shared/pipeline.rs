use serde::{Deserialize, Serialize};

use crate::shared::{
    BatchConfig, DestinationConfig, ReconcileConfig, SchedulerConfig, SourceConfig,
    ValidationError,
};

/// Settings of the export and reconciliation pipeline, independent of where the catalog and
/// the destination live.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default = "default_mirror_schema_prefix")]
    pub mirror_schema_prefix: String,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.mirror_schema_prefix.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "mirror_schema_prefix".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        self.source.validate()?;
        self.batch.validate()?;
        self.reconcile.validate()?;
        self.scheduler.validate()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            batch: BatchConfig::default(),
            reconcile: ReconcileConfig::default(),
            scheduler: SchedulerConfig::default(),
            mirror_schema_prefix: default_mirror_schema_prefix(),
        }
    }
}

fn default_mirror_schema_prefix() -> String {
    DestinationConfig::DEFAULT_MIRROR_SCHEMA_PREFIX.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pipeline_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mirror_schema_prefix, "compare_");
    }
}
