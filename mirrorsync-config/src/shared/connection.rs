use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sqlx::mysql::MySqlConnectOptions;
use tokio_postgres::Config as TokioPgConnectOptions;
use tokio_postgres::config::SslMode as TokioPgSslMode;

use crate::SerializableSecretString;
use crate::shared::ValidationError;

const SOURCE_DATESTYLE: &str = "ISO";
const SOURCE_CLIENT_ENCODING: &str = "UTF8";
const SOURCE_APPLICATION_NAME: &str = "mirrorsync_extract";

/// Session settings applied to every source connection at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgConnectionOptions {
    pub datestyle: String,
    pub client_encoding: String,
    /// Statement timeout in milliseconds, `0` disables it.
    pub statement_timeout: u64,
    pub application_name: String,
}

impl PgConnectionOptions {
    /// Options used by extraction connections with the given statement timeout.
    pub fn extract(statement_timeout: u64) -> Self {
        Self {
            datestyle: SOURCE_DATESTYLE.to_string(),
            client_encoding: SOURCE_CLIENT_ENCODING.to_string(),
            statement_timeout,
            application_name: SOURCE_APPLICATION_NAME.to_string(),
        }
    }

    /// Renders the options as a libpq `options` string.
    pub fn to_options_string(&self) -> String {
        format!(
            "-c datestyle={} -c client_encoding={} -c statement_timeout={}",
            self.datestyle, self.client_encoding, self.statement_timeout
        )
    }
}

/// TLS settings for source connections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    #[serde(default)]
    pub trusted_root_certs: String,
    #[serde(default)]
    pub enabled: bool,
}

impl TlsConfig {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

/// Connection parameters of one Postgres source database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PgConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Database name.
    pub name: String,
    pub username: String,
    pub password: Option<SerializableSecretString>,
    #[serde(default)]
    pub tls: TlsConfig,
}

impl PgConnectionConfig {
    /// Builds `tokio-postgres` connect options for the configured database.
    pub fn with_db(&self, options: &PgConnectionOptions) -> TokioPgConnectOptions {
        let mut config = TokioPgConnectOptions::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.name)
            .user(&self.username)
            .application_name(&options.application_name)
            .options(&options.to_options_string())
            .ssl_mode(if self.tls.enabled {
                TokioPgSslMode::Require
            } else {
                TokioPgSslMode::Disable
            });

        if let Some(password) = &self.password {
            config.password(password.expose_secret());
        }

        config
    }
}

/// Connection parameters of a MySQL server used as catalog or destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MySqlConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Default database, if any. Destination statements always qualify tables with their
    /// schema so this may be omitted there.
    #[serde(default)]
    pub name: Option<String>,
    pub username: String,
    pub password: Option<SerializableSecretString>,
}

impl MySqlConnectionConfig {
    /// Connect options without selecting a default database.
    pub fn without_db(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username);

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }

    /// Connect options selecting the configured default database when set.
    pub fn with_db(&self) -> MySqlConnectOptions {
        let options = self.without_db();
        match &self.name {
            Some(name) => options.database(name),
            None => options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_options_carry_statement_timeout() {
        let options = PgConnectionOptions::extract(15_000);
        assert_eq!(
            options.to_options_string(),
            "-c datestyle=ISO -c client_encoding=UTF8 -c statement_timeout=15000"
        );
    }

    #[test]
    fn enabled_tls_requires_root_certs() {
        let tls = TlsConfig {
            trusted_root_certs: String::new(),
            enabled: true,
        };
        assert_eq!(tls.validate(), Err(ValidationError::MissingTrustedRootCerts));
        assert!(TlsConfig::disabled().validate().is_ok());
    }

    #[test]
    fn pg_config_builds_connect_options() {
        let config = PgConnectionConfig {
            host: "db.internal".to_string(),
            port: 5433,
            name: "finance".to_string(),
            username: "reader".to_string(),
            password: Some("secret".into()),
            tls: TlsConfig::disabled(),
        };

        let options = config.with_db(&PgConnectionOptions::extract(1000));
        assert_eq!(options.get_dbname(), Some("finance"));
        assert_eq!(options.get_user(), Some("reader"));
        assert_eq!(options.get_ports(), &[5433]);
        assert_eq!(options.get_password(), Some(b"secret".as_slice()));
    }
}
