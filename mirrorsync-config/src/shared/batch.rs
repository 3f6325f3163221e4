use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Sizing of write statements sent to the destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Maximum number of value tuples in one write statement.
    #[serde(default = "default_row_limit")]
    pub row_limit: usize,
    /// Maximum number of batches written concurrently during a full export.
    #[serde(default = "default_max_concurrent_writes")]
    pub max_concurrent_writes: usize,
}

impl BatchConfig {
    pub const DEFAULT_ROW_LIMIT: usize = 500;

    pub const DEFAULT_MAX_CONCURRENT_WRITES: usize = 16;

    /// Ensures both limits are non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.row_limit == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "batch.row_limit".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.max_concurrent_writes == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "batch.max_concurrent_writes".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            row_limit: default_row_limit(),
            max_concurrent_writes: default_max_concurrent_writes(),
        }
    }
}

fn default_row_limit() -> usize {
    BatchConfig::DEFAULT_ROW_LIMIT
}

fn default_max_concurrent_writes() -> usize {
    BatchConfig::DEFAULT_MAX_CONCURRENT_WRITES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_row_limit_is_rejected() {
        let config = BatchConfig {
            row_limit: 0,
            ..BatchConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidFieldValue { field, .. }) if field == "batch.row_limit"
        ));
    }

    #[test]
    fn defaults_apply_to_missing_fields() {
        let config: BatchConfig = serde_json::from_str("{\"row_limit\": 2}").unwrap();
        assert_eq!(config.row_limit, 2);
        assert_eq!(
            config.max_concurrent_writes,
            BatchConfig::DEFAULT_MAX_CONCURRENT_WRITES
        );
    }
}
