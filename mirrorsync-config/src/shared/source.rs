use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::{RetryConfig, TlsConfig, ValidationError};

/// Settings for source connections and extraction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Statement timeout applied to every source session, in milliseconds.
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
    /// Interval between two health sweeps of the connection pool, in milliseconds.
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    /// Number of independently locked shards of the connection pool.
    #[serde(default = "default_pool_shards")]
    pub pool_shards: usize,
    /// Retry applied when a query returns no rows.
    #[serde(default = "default_empty_result_retry")]
    pub empty_result_retry: RetryConfig,
    #[serde(default)]
    pub tls: TlsConfig,
}

impl SourceConfig {
    pub const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 30_000;

    pub const DEFAULT_HEALTH_CHECK_INTERVAL_MS: u64 = 60_000;

    pub const DEFAULT_POOL_SHARDS: usize = 16;

    pub const DEFAULT_EMPTY_RESULT_RETRY: RetryConfig = RetryConfig::new(3, 3_000);

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.pool_shards == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "source.pool_shards".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.health_check_interval_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "source.health_check_interval_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        self.empty_result_retry
            .validate("source.empty_result_retry")?;
        self.tls.validate()
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            statement_timeout_ms: default_statement_timeout_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            pool_shards: default_pool_shards(),
            empty_result_retry: default_empty_result_retry(),
            tls: TlsConfig::default(),
        }
    }
}

fn default_statement_timeout_ms() -> u64 {
    SourceConfig::DEFAULT_STATEMENT_TIMEOUT_MS
}

fn default_health_check_interval_ms() -> u64 {
    SourceConfig::DEFAULT_HEALTH_CHECK_INTERVAL_MS
}

fn default_pool_shards() -> usize {
    SourceConfig::DEFAULT_POOL_SHARDS
}

fn default_empty_result_retry() -> RetryConfig {
    SourceConfig::DEFAULT_EMPTY_RESULT_RETRY
}
