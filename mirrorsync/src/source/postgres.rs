use std::io::BufReader;

use mirrorsync_config::shared::PgConnectionOptions;
use pg_escape::quote_identifier;
use rustls::ClientConfig;
use tokio::sync::Mutex;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::types::Type;
use tokio_postgres::{Client, Config, Connection, NoTls, SimpleQueryMessage, Socket};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{Instrument, debug, error, info, warn};

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::source::query::{QueryShape, ResolvedQuery};
use crate::source::{
    ConnectionDescriptor, SourceClient, SourceColumn, SourceConnector, SourceRows,
};

const ENABLE_NESTLOOP: &str = "set enable_nestloop = on;";
const DISABLE_NESTLOOP: &str = "set enable_nestloop = off;";

/// Spawns a background task driving a Postgres connection until it terminates.
fn spawn_postgres_connection<T>(connection: Connection<Socket, T::Stream>)
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let span = tracing::Span::current();
    let task = async move {
        match connection.await {
            Err(err) => error!("an error occurred during the postgres connection: {}", err),
            Ok(()) => debug!("postgres connection terminated"),
        }
    }
    .instrument(span);

    // The client closes the connection when dropped, so the handle is not tracked.
    tokio::spawn(task);
}

fn is_timestamp_type(ty: &Type) -> bool {
    *ty == Type::TIMESTAMP || *ty == Type::TIMESTAMPTZ || *ty == Type::DATE
}

/// Opens `tokio-postgres` connections for extraction.
#[derive(Debug, Clone)]
pub struct PgConnector {
    options: PgConnectionOptions,
}

impl PgConnector {
    pub fn new(statement_timeout_ms: u64) -> Self {
        Self {
            options: PgConnectionOptions::extract(statement_timeout_ms),
        }
    }

    async fn connect_no_tls(&self, descriptor: &ConnectionDescriptor) -> SyncResult<Client> {
        let config: Config = descriptor.config().with_db(&self.options);
        let (client, connection) = config.connect(NoTls).await?;
        spawn_postgres_connection::<NoTls>(connection);

        info!(source = %descriptor, "connected to source without tls");

        Ok(client)
    }

    async fn connect_tls(&self, descriptor: &ConnectionDescriptor) -> SyncResult<Client> {
        let config: Config = descriptor.config().with_db(&self.options);

        let mut root_store = rustls::RootCertStore::empty();
        let mut root_certs_reader =
            BufReader::new(descriptor.config().tls.trusted_root_certs.as_bytes());
        for cert in rustls_pemfile::certs(&mut root_certs_reader) {
            let cert = cert?;
            root_store.add(cert)?;
        }

        let tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let (client, connection) = config.connect(MakeRustlsConnect::new(tls_config)).await?;
        spawn_postgres_connection::<MakeRustlsConnect>(connection);

        info!(source = %descriptor, "connected to source with tls");

        Ok(client)
    }
}

impl SourceConnector for PgConnector {
    type Client = PgSourceClient;

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> SyncResult<PgSourceClient> {
        let client = match descriptor.config().tls.enabled {
            true => self.connect_tls(descriptor).await?,
            false => self.connect_no_tls(descriptor).await?,
        };

        Ok(PgSourceClient {
            client: Mutex::new(client),
        })
    }
}

/// A source connection. Statements are serialised through a lock because some query shapes
/// rely on session state.
#[derive(Debug)]
pub struct PgSourceClient {
    client: Mutex<Client>,
}

impl PgSourceClient {
    async fn select(client: &Client, sql: &str) -> SyncResult<SourceRows> {
        debug!(sql, "executing source query");

        // The statement is only described here; rows are read through the text protocol so every
        // value arrives in its canonical text form.
        let statement = client.prepare(sql).await?;
        let columns = statement
            .columns()
            .iter()
            .map(|column| SourceColumn::new(column.name(), is_timestamp_type(column.type_())))
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for message in client.simple_query(sql).await? {
            if let SimpleQueryMessage::Row(row) = message {
                let values = (0..row.len())
                    .map(|index| row.get(index).map(str::to_string))
                    .collect();
                rows.push(values);
            }
        }

        Ok(SourceRows::new(columns, rows))
    }

    async fn fetch_cursor(client: &Client, sql: &str) -> SyncResult<SourceRows> {
        debug!(sql, "opening source cursor");

        let mut cursor = None;
        for message in client.simple_query(sql).await? {
            if let SimpleQueryMessage::Row(row) = message {
                cursor = row.get(0).map(str::to_string);
                break;
            }
        }

        let Some(cursor) = cursor else {
            bail!(
                ErrorKind::SourceError,
                "Stored procedure did not return a cursor",
                sql
            );
        };

        Self::select(client, &format!("fetch all in {}", quote_identifier(&cursor))).await
    }
}

impl SourceClient for PgSourceClient {
    async fn ping(&self) -> SyncResult<()> {
        let client = self.client.lock().await;
        if client.is_closed() {
            bail!(
                ErrorKind::ConnectionUnavailable,
                "Source connection is closed"
            );
        }
        client.simple_query("select 1").await?;

        Ok(())
    }

    async fn fetch(&self, query: &ResolvedQuery) -> SyncResult<SourceRows> {
        let client = self.client.lock().await;

        match query.shape {
            QueryShape::Normal => Self::select(&client, &query.sql).await,
            QueryShape::IndexHint => {
                client.batch_execute(ENABLE_NESTLOOP).await?;
                let result = Self::select(&client, &query.sql).await;
                if let Err(err) = client.batch_execute(DISABLE_NESTLOOP).await {
                    warn!(error = %err, "could not reset enable_nestloop on source connection");
                }

                result
            }
            QueryShape::StoredProcedure => {
                // Cursors returned by the procedure only live inside the transaction.
                client.batch_execute("BEGIN;").await?;
                let result = Self::fetch_cursor(&client, &query.sql).await;
                if let Err(err) = client.batch_execute("END;").await {
                    warn!(error = %err, "could not end stored procedure transaction");
                }

                result
            }
        }
    }
}
