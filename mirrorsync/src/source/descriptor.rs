use std::fmt;
use std::hash::{Hash, Hasher};

use mirrorsync_config::shared::{PgConnectionConfig, TlsConfig};

use crate::bail;
use crate::error::{ErrorKind, SyncResult};

/// Identifies one physical source database.
///
/// Two descriptors that differ only in their password address the same connection, so equality
/// and hashing ignore it.
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    config: PgConnectionConfig,
}

impl ConnectionDescriptor {
    pub fn new(config: PgConnectionConfig) -> Self {
        Self { config }
    }

    /// Builds a descriptor from the catalog's `host:port` server string.
    pub fn from_server(
        server: &str,
        database: impl Into<String>,
        username: impl Into<String>,
        password: Option<String>,
        tls: TlsConfig,
    ) -> SyncResult<Self> {
        let Some((host, port)) = server.trim().rsplit_once(':') else {
            bail!(
                ErrorKind::CatalogLookupFailed,
                "Source server is not in host:port form",
                server
            );
        };
        let port = match port.parse::<u16>() {
            Ok(port) => port,
            Err(err) => bail!(
                ErrorKind::CatalogLookupFailed,
                "Source server port is invalid",
                server,
                source: err
            ),
        };

        Ok(Self::new(PgConnectionConfig {
            host: host.to_string(),
            port,
            name: database.into(),
            username: username.into(),
            password: password.map(Into::into),
            tls,
        }))
    }

    pub fn config(&self) -> &PgConnectionConfig {
        &self.config
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn database(&self) -> &str {
        &self.config.name
    }

    pub fn username(&self) -> &str {
        &self.config.username
    }

    fn identity(&self) -> (&str, u16, &str, &str) {
        (
            &self.config.host,
            self.config.port,
            &self.config.name,
            &self.config.username,
        )
    }
}

impl PartialEq for ConnectionDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for ConnectionDescriptor {}

impl Hash for ConnectionDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{}/{}",
            self.config.username, self.config.host, self.config.port, self.config.name
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn descriptor(password: &str) -> ConnectionDescriptor {
        ConnectionDescriptor::from_server(
            "10.0.0.7:5432",
            "finance",
            "reader",
            Some(password.to_string()),
            TlsConfig::disabled(),
        )
        .unwrap()
    }

    #[test]
    fn identity_ignores_password() {
        let mut set = HashSet::new();
        set.insert(descriptor("one"));
        set.insert(descriptor("two"));
        assert_eq!(set.len(), 1);
        assert_eq!(descriptor("one").to_string(), "reader@10.0.0.7:5432/finance");
    }

    #[test]
    fn malformed_server_is_rejected() {
        for server in ["10.0.0.7", "10.0.0.7:port"] {
            let err = ConnectionDescriptor::from_server(
                server,
                "finance",
                "reader",
                None,
                TlsConfig::disabled(),
            )
            .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::CatalogLookupFailed);
        }
    }
}
