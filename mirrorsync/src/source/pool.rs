use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::source::{ConnectionDescriptor, SourceClient, SourceConnector};
use crate::sync_error;

#[derive(Debug)]
struct ConnectionHandle<T> {
    descriptor: ConnectionDescriptor,
    client: Arc<T>,
    last_checked_at: Instant,
}

type Shard<T> = Mutex<HashMap<ConnectionDescriptor, ConnectionHandle<T>>>;

/// Caches one source connection per [`ConnectionDescriptor`].
///
/// Connections are created lazily on first use. The cache is split into shards selected by the
/// descriptor hash; a cold connection is established while holding only its shard lock, so
/// connecting to one database does not block acquisitions for databases in other shards.
#[derive(Debug)]
pub struct ConnectionPool<C: SourceConnector> {
    connector: C,
    shards: Vec<Shard<C::Client>>,
}

impl<C> ConnectionPool<C>
where
    C: SourceConnector,
{
    pub fn new(connector: C, shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect();

        Self { connector, shards }
    }

    fn shard(&self, descriptor: &ConnectionDescriptor) -> &Shard<C::Client> {
        let mut hasher = DefaultHasher::new();
        descriptor.hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;

        &self.shards[index]
    }

    /// Returns the cached connection for `descriptor`, connecting first if there is none.
    pub async fn acquire(&self, descriptor: &ConnectionDescriptor) -> SyncResult<Arc<C::Client>> {
        let mut shard = self.shard(descriptor).lock().await;
        if let Some(handle) = shard.get(descriptor) {
            return Ok(handle.client.clone());
        }

        let client = Arc::new(self.connect(descriptor).await?);
        shard.insert(
            descriptor.clone(),
            ConnectionHandle {
                descriptor: descriptor.clone(),
                client: client.clone(),
                last_checked_at: Instant::now(),
            },
        );

        Ok(client)
    }

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> SyncResult<C::Client> {
        self.connector.connect(descriptor).await.map_err(|err| {
            sync_error!(
                ErrorKind::ConnectionUnavailable,
                "Could not connect to source",
                descriptor.to_string(),
                source: err
            )
        })
    }

    /// Number of cached connections.
    pub async fn len(&self) -> usize {
        let mut len = 0;
        for shard in &self.shards {
            len += shard.lock().await.len();
        }
        len
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Pings every cached connection and replaces the ones that fail.
    ///
    /// A connection that cannot be re-established is evicted so that the next acquisition
    /// retries from scratch. The first such failure is returned after the whole pool was visited.
    pub async fn sweep(&self) -> SyncResult<()> {
        let mut first_error: Option<SyncError> = None;

        for shard in &self.shards {
            let mut shard = shard.lock().await;
            let mut evicted = Vec::new();

            for handle in shard.values_mut() {
                let ping = handle.client.ping().await;
                handle.last_checked_at = Instant::now();

                let Err(err) = ping else {
                    continue;
                };

                warn!(source = %handle.descriptor, error = %err, "source ping failed, reconnecting");
                match self.connect(&handle.descriptor).await {
                    Ok(client) => {
                        handle.client = Arc::new(client);
                        info!(source = %handle.descriptor, "reconnected to source");
                    }
                    Err(err) => {
                        warn!(source = %handle.descriptor, error = %err, "could not reconnect to source");
                        evicted.push(handle.descriptor.clone());
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                }
            }

            for descriptor in evicted {
                shard.remove(&descriptor);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Runs [`ConnectionPool::sweep`] every `interval` until shutdown is signalled.
    pub fn spawn_health_sweep(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown_rx: ShutdownRx,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; connections are fresh at startup.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.changed() => {
                        info!("source health sweep stopped due to shutdown");

                        return;
                    }

                    _ = ticker.tick() => {
                        debug!("running source health sweep");
                        if let Err(err) = self.sweep().await {
                            warn!(error = %err, "source health sweep left connections unavailable");
                        }
                    }
                }
            }
        })
    }

    /// Instant of the last successful check or creation of the connection for `descriptor`.
    pub async fn last_checked_at(&self, descriptor: &ConnectionDescriptor) -> Option<Instant> {
        let shard = self.shard(descriptor).lock().await;
        shard.get(descriptor).map(|handle| handle.last_checked_at)
    }
}

#[cfg(test)]
mod tests {
    use mirrorsync_config::shared::TlsConfig;

    use super::*;
    use crate::source::memory::MemorySource;

    fn descriptor(host: &str) -> ConnectionDescriptor {
        ConnectionDescriptor::from_server(
            &format!("{host}:5432"),
            "finance",
            "reader",
            None,
            TlsConfig::disabled(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn connections_are_cached_per_descriptor() {
        let source = MemorySource::new();
        let pool = ConnectionPool::new(source.clone(), 4);

        let first = pool.acquire(&descriptor("a")).await.unwrap();
        let again = pool.acquire(&descriptor("a")).await.unwrap();
        pool.acquire(&descriptor("b")).await.unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(pool.len().await, 2);
        assert_eq!(source.connect_count().await, 2);
    }

    #[tokio::test]
    async fn unreachable_source_is_unavailable() {
        let source = MemorySource::new();
        source.set_reachable(&descriptor("a"), false).await;
        let pool = ConnectionPool::new(source, 1);

        let err = pool.acquire(&descriptor("a")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionUnavailable);
        assert!(pool.is_empty().await);
    }

    #[tokio::test]
    async fn sweep_replaces_broken_connections() {
        let source = MemorySource::new();
        let pool = ConnectionPool::new(source.clone(), 2);

        let stale = pool.acquire(&descriptor("a")).await.unwrap();
        source.break_connections().await;
        pool.sweep().await.unwrap();

        let fresh = pool.acquire(&descriptor("a")).await.unwrap();
        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert!(fresh.ping().await.is_ok());
        assert_eq!(source.connect_count().await, 2);
    }

    #[tokio::test]
    async fn sweep_evicts_connections_that_cannot_reconnect() {
        let source = MemorySource::new();
        let pool = ConnectionPool::new(source.clone(), 2);

        pool.acquire(&descriptor("a")).await.unwrap();
        source.break_connections().await;
        source.set_reachable(&descriptor("a"), false).await;

        let err = pool.sweep().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionUnavailable);
        assert!(pool.is_empty().await);
    }
}
