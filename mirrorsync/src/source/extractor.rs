use std::sync::Arc;

use mirrorsync_config::shared::RetryConfig;
use tracing::{info, warn};

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::source::pool::ConnectionPool;
use crate::source::query::ResolvedQuery;
use crate::source::{ConnectionDescriptor, SourceClient, SourceConnector, SourceRows};

/// Runs resolved queries against pooled source connections.
///
/// An empty result is treated as possibly transient: the query is repeated up to the configured
/// number of attempts before the extraction fails with [`ErrorKind::NoData`]. Errors other than an
/// empty result are returned immediately.
#[derive(Debug)]
pub struct Extractor<C: SourceConnector> {
    pool: Arc<ConnectionPool<C>>,
    empty_result_retry: RetryConfig,
}

impl<C> Clone for Extractor<C>
where
    C: SourceConnector,
{
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            empty_result_retry: self.empty_result_retry,
        }
    }
}

impl<C> Extractor<C>
where
    C: SourceConnector,
{
    pub fn new(pool: Arc<ConnectionPool<C>>, empty_result_retry: RetryConfig) -> Self {
        Self {
            pool,
            empty_result_retry,
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<C>> {
        &self.pool
    }

    pub async fn extract(
        &self,
        descriptor: &ConnectionDescriptor,
        query: &ResolvedQuery,
    ) -> SyncResult<SourceRows> {
        let max_attempts = self.empty_result_retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let client = self.pool.acquire(descriptor).await?;

            info!(source = %descriptor, sql = %query.sql, attempt, "extracting rows from source");
            let rows = client.fetch(query).await?;
            if !rows.is_empty() {
                info!(source = %descriptor, rows = rows.len(), "extracted rows from source");

                return Ok(rows);
            }

            if attempt < max_attempts {
                warn!(
                    source = %descriptor,
                    attempt,
                    max_attempts,
                    "source query returned no rows, retrying"
                );
                tokio::time::sleep(self.empty_result_retry.delay()).await;
            }
        }

        bail!(
            ErrorKind::NoData,
            "Source query returned no rows",
            format!("{} after {max_attempts} attempts: {}", descriptor, query.sql)
        )
    }
}

#[cfg(test)]
mod tests {
    use mirrorsync_config::shared::TlsConfig;

    use super::*;
    use crate::source::SourceColumn;
    use crate::source::memory::MemorySource;
    use crate::source::query::QueryShape;

    fn descriptor() -> ConnectionDescriptor {
        ConnectionDescriptor::from_server("src:5432", "finance", "reader", None, TlsConfig::disabled())
            .unwrap()
    }

    fn rows(count: usize) -> SourceRows {
        SourceRows::new(
            vec![SourceColumn::new("zqdm", false)],
            (0..count).map(|i| vec![Some(format!("{i:06}"))]).collect(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn empty_results_are_retried() {
        let source = MemorySource::new();
        source
            .register_sequence("select zqdm from t;", vec![rows(0), rows(0), rows(2)])
            .await;
        let pool = Arc::new(ConnectionPool::new(source.clone(), 1));
        let extractor = Extractor::new(pool, RetryConfig::new(3, 3000));

        let query = ResolvedQuery::new("select zqdm from t;", QueryShape::Normal);
        let result = extractor.extract(&descriptor(), &query).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(source.executed().await.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_report_no_data() {
        let source = MemorySource::new();
        let pool = Arc::new(ConnectionPool::new(source.clone(), 1));
        let extractor = Extractor::new(pool, RetryConfig::new(3, 3000));

        let query = ResolvedQuery::new("select zqdm from t;", QueryShape::Normal);
        let err = extractor.extract(&descriptor(), &query).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NoData);
        assert_eq!(source.executed().await.len(), 3);
    }

    #[tokio::test]
    async fn unreachable_source_is_not_retried() {
        let source = MemorySource::new();
        source.set_reachable(&descriptor(), false).await;
        let pool = Arc::new(ConnectionPool::new(source.clone(), 1));
        let extractor = Extractor::new(pool, RetryConfig::new(3, 3000));

        let query = ResolvedQuery::new("select zqdm from t;", QueryShape::Normal);
        let err = extractor.extract(&descriptor(), &query).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConnectionUnavailable);
        assert_eq!(source.connect_count().await, 0);
    }
}
