use serde::{Deserialize, Serialize};

use crate::shared::{RetryConfig, ValidationError};

/// Settings for scheduled exports.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fixed UTC offset, such as `+08:00`, in which schedule expressions are evaluated.
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
    /// Retry applied to a scheduled run that fails.
    #[serde(default = "default_retry")]
    pub retry: RetryConfig,
}

impl SchedulerConfig {
    pub const DEFAULT_UTC_OFFSET: &'static str = "+08:00";

    pub const DEFAULT_RETRY: RetryConfig = RetryConfig::new(3, 5_000);

    /// Returns the configured offset in seconds east of UTC.
    pub fn utc_offset_seconds(&self) -> Result<i32, ValidationError> {
        parse_utc_offset(&self.utc_offset).ok_or_else(|| ValidationError::InvalidFieldValue {
            field: "scheduler.utc_offset".to_string(),
            constraint: "must look like `+HH:MM` or `-HH:MM`".to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.utc_offset_seconds()?;
        self.retry.validate("scheduler.retry")
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            utc_offset: default_utc_offset(),
            retry: default_retry(),
        }
    }
}

fn parse_utc_offset(value: &str) -> Option<i32> {
    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }

    Some(sign * (hours * 3600 + minutes * 60))
}

fn default_utc_offset() -> String {
    SchedulerConfig::DEFAULT_UTC_OFFSET.to_string()
}

fn default_retry() -> RetryConfig {
    SchedulerConfig::DEFAULT_RETRY
}
