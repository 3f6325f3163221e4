use serde::{Deserialize, Serialize};

use crate::shared::{MySqlConnectionConfig, ValidationError};

/// The MySQL server holding authoritative and mirror tables.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub connection: MySqlConnectionConfig,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Prefix turning an authoritative schema name into its mirror schema name.
    #[serde(default = "default_mirror_schema_prefix")]
    pub mirror_schema_prefix: String,
}

impl DestinationConfig {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

    pub const DEFAULT_MIRROR_SCHEMA_PREFIX: &'static str = "compare_";

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_connections == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "destination.max_connections".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.mirror_schema_prefix.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "destination.mirror_schema_prefix".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

fn default_max_connections() -> u32 {
    DestinationConfig::DEFAULT_MAX_CONNECTIONS
}

fn default_mirror_schema_prefix() -> String {
    DestinationConfig::DEFAULT_MIRROR_SCHEMA_PREFIX.to_string()
}
