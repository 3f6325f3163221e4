//! Configuration types and loading for mirrorsync services.

mod environment;
mod load;
pub mod shared;

use secrecy::{ExposeSecret, Secret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from};

/// A [`SecretString`] that can be deserialized from and serialized to configuration files.
///
/// Debug output stays redacted.
#[derive(Clone, Debug)]
pub struct SerializableSecretString(SecretString);

impl SerializableSecretString {
    pub fn into_inner(self) -> SecretString {
        self.0
    }
}

impl ExposeSecret<String> for SerializableSecretString {
    fn expose_secret(&self) -> &String {
        self.0.expose_secret()
    }
}

impl From<String> for SerializableSecretString {
    fn from(value: String) -> Self {
        Self(Secret::new(value))
    }
}

impl From<&str> for SerializableSecretString {
    fn from(value: &str) -> Self {
        Self(Secret::new(value.to_owned()))
    }
}

impl Serialize for SerializableSecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.expose_secret())
    }
}

impl<'de> Deserialize<'de> for SerializableSecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_is_redacted_in_debug_output() {
        let secret = SerializableSecretString::from("hunter2");
        assert!(!format!("{secret:?}").contains("hunter2"));
        assert_eq!(secret.expose_secret(), "hunter2");
    }

    #[test]
    fn secret_round_trips_through_serde() {
        let secret: SerializableSecretString = serde_json::from_str("\"pw\"").unwrap();
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"pw\"");
    }
}
