use std::future::Future;

use crate::error::SyncResult;
use crate::source::ConnectionDescriptor;
use crate::source::query::ResolvedQuery;

/// Column of a source result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceColumn {
    pub name: String,
    /// Whether the column holds a date or timestamp, which the transformer renders specially.
    pub is_timestamp: bool,
}

impl SourceColumn {
    pub fn new(name: impl Into<String>, is_timestamp: bool) -> Self {
        Self {
            name: name.into(),
            is_timestamp,
        }
    }
}

/// A fully materialised result set in text form. `None` cells are SQL `NULL`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRows {
    pub columns: Vec<SourceColumn>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl SourceRows {
    pub fn new(columns: Vec<SourceColumn>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }
}

/// An open connection to a source database.
///
/// Implementations serialise statements issued through one client, since stored-procedure and
/// index-hint queries depend on session state.
pub trait SourceClient: Send + Sync + 'static {
    /// Checks that the connection is still usable.
    fn ping(&self) -> impl Future<Output = SyncResult<()>> + Send;

    /// Executes `query` and returns all of its rows.
    fn fetch(&self, query: &ResolvedQuery) -> impl Future<Output = SyncResult<SourceRows>> + Send;
}

/// Opens [`SourceClient`]s for connection descriptors.
pub trait SourceConnector: Send + Sync + 'static {
    type Client: SourceClient + std::fmt::Debug;

    fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> impl Future<Output = SyncResult<Self::Client>> + Send;
}
