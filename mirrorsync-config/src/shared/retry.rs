use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// A bounded retry loop with a fixed delay between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay between two attempts in milliseconds.
    pub delay_ms: u64,
}

impl RetryConfig {
    pub const fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            delay_ms,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn validate(&self, field: &str) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: format!("{field}.max_attempts"),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}
