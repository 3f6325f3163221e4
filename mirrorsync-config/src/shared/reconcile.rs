use serde::{Deserialize, Serialize};

use crate::shared::{RetryConfig, ValidationError};

/// Settings for the reconciliation workflow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Retry applied when a key listing comes back empty.
    #[serde(default = "default_key_list_retry")]
    pub key_list_retry: RetryConfig,
    /// Number of keys per version lookup query.
    #[serde(default = "default_version_lookup_chunk")]
    pub version_lookup_chunk: usize,
}

impl ReconcileConfig {
    pub const DEFAULT_KEY_LIST_RETRY: RetryConfig = RetryConfig::new(3, 3_000);

    pub const DEFAULT_VERSION_LOOKUP_CHUNK: usize = 500;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version_lookup_chunk == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "reconcile.version_lookup_chunk".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        self.key_list_retry.validate("reconcile.key_list_retry")
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            key_list_retry: default_key_list_retry(),
            version_lookup_chunk: default_version_lookup_chunk(),
        }
    }
}

fn default_key_list_retry() -> RetryConfig {
    ReconcileConfig::DEFAULT_KEY_LIST_RETRY
}

fn default_version_lookup_chunk() -> usize {
    ReconcileConfig::DEFAULT_VERSION_LOOKUP_CHUNK
}
