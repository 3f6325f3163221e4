use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::source::query::ResolvedQuery;
use crate::source::{ConnectionDescriptor, SourceClient, SourceConnector, SourceRows};

#[derive(Debug, Default)]
struct Inner {
    results: HashMap<String, VecDeque<SourceRows>>,
    unreachable: HashSet<ConnectionDescriptor>,
    executed: Vec<ResolvedQuery>,
    generation: u64,
    connects: usize,
}

/// In-memory source for tests and development.
///
/// Results are registered per SQL text. A query without registered results returns no rows.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every execution of `sql` return `rows`.
    pub async fn register(&self, sql: impl Into<String>, rows: SourceRows) {
        self.register_sequence(sql, vec![rows]).await;
    }

    /// Makes successive executions of `sql` return `results` in order. The last result keeps
    /// being returned once the others were consumed.
    pub async fn register_sequence(&self, sql: impl Into<String>, results: Vec<SourceRows>) {
        let mut inner = self.inner.lock().await;
        inner.results.insert(sql.into(), results.into());
    }

    pub async fn set_reachable(&self, descriptor: &ConnectionDescriptor, reachable: bool) {
        let mut inner = self.inner.lock().await;
        if reachable {
            inner.unreachable.remove(descriptor);
        } else {
            inner.unreachable.insert(descriptor.clone());
        }
    }

    /// Invalidates every client handed out so far.
    pub async fn break_connections(&self) {
        let mut inner = self.inner.lock().await;
        inner.generation += 1;
    }

    pub async fn connect_count(&self) -> usize {
        self.inner.lock().await.connects
    }

    /// Queries executed so far, in order.
    pub async fn executed(&self) -> Vec<ResolvedQuery> {
        self.inner.lock().await.executed.clone()
    }
}

impl SourceConnector for MemorySource {
    type Client = MemorySourceClient;

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> SyncResult<MemorySourceClient> {
        let mut inner = self.inner.lock().await;
        if inner.unreachable.contains(descriptor) {
            bail!(
                ErrorKind::ConnectionUnavailable,
                "Source is unreachable",
                descriptor.to_string()
            );
        }
        inner.connects += 1;

        Ok(MemorySourceClient {
            source: self.clone(),
            generation: inner.generation,
        })
    }
}

/// Client handed out by [`MemorySource`].
#[derive(Debug)]
pub struct MemorySourceClient {
    source: MemorySource,
    generation: u64,
}

impl MemorySourceClient {
    fn check_alive(&self, inner: &Inner) -> SyncResult<()> {
        if inner.generation != self.generation {
            bail!(
                ErrorKind::ConnectionUnavailable,
                "Source connection is closed"
            );
        }

        Ok(())
    }
}

impl SourceClient for MemorySourceClient {
    async fn ping(&self) -> SyncResult<()> {
        let inner = self.source.inner.lock().await;
        self.check_alive(&inner)
    }

    async fn fetch(&self, query: &ResolvedQuery) -> SyncResult<SourceRows> {
        let mut inner = self.source.inner.lock().await;
        self.check_alive(&inner)?;

        debug!(sql = %query.sql, "executing in-memory source query");
        inner.executed.push(query.clone());

        let Some(results) = inner.results.get_mut(&query.sql) else {
            return Ok(SourceRows::default());
        };
        let rows = match results.len() {
            0 => SourceRows::default(),
            1 => results.front().cloned().unwrap_or_default(),
            _ => results.pop_front().unwrap_or_default(),
        };

        Ok(rows)
    }
}
