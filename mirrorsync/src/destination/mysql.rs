use std::collections::HashMap;

use mirrorsync_config::shared::DestinationConfig;
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::{Column, MySqlPool, Row};
use tracing::{debug, info};

use crate::batch::RowBatch;
use crate::destination::{Destination, KeyColumns};
use crate::error::{ErrorKind, SyncResult};
use crate::source::{SourceColumn, SourceRows};
use crate::sync_error;
use crate::transform::Literal;
use crate::types::{TableName, quote_mysql_identifier};

/// Destination backed by a MySQL connection pool.
///
/// Reads go through the text protocol so that every column arrives as text regardless of its
/// declared type, which is how rows are copied between a table and its mirror.
#[derive(Debug, Clone)]
pub struct MySqlDestination {
    pool: MySqlPool,
}

impl MySqlDestination {
    /// Creates a lazily connected destination; no connection is opened until first use.
    pub fn new(config: &DestinationConfig) -> Self {
        let pool = MySqlPoolOptions::new()
            .min_connections(0)
            .max_connections(config.max_connections)
            .connect_lazy_with(config.connection.with_db());

        Self { pool }
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn fetch_text_rows(&self, sql: &str) -> SyncResult<SourceRows> {
        debug!(sql, "querying destination");
        let rows = sqlx::raw_sql(sql).fetch_all(&self.pool).await?;

        let Some(first) = rows.first() else {
            return Ok(SourceRows::default());
        };
        let columns = first
            .columns()
            .iter()
            .map(|column| SourceColumn::new(column.name(), false))
            .collect::<Vec<_>>();

        let rows = rows
            .iter()
            .map(|row| text_values(row, columns.len()))
            .collect::<SyncResult<Vec<_>>>()?;

        Ok(SourceRows::new(columns, rows))
    }
}

fn text_values(row: &MySqlRow, len: usize) -> SyncResult<Vec<Option<String>>> {
    (0..len)
        .map(|index| {
            // Text protocol values decode as strings whatever their column type.
            row.try_get_unchecked::<Option<String>, _>(index)
                .map_err(Into::into)
        })
        .collect()
}

fn key_filter(columns: KeyColumns<'_>, key: &str, versions: Option<&[i64]>) -> String {
    let mut filter = format!(
        "{} = {}",
        quote_mysql_identifier(columns.key),
        Literal::Quoted(key.to_string())
    );

    if let Some(versions) = versions {
        let versions = versions
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        filter.push_str(&format!(
            " and {} in ({versions})",
            quote_mysql_identifier(columns.version)
        ));
    }

    filter
}

impl Destination for MySqlDestination {
    fn name() -> &'static str {
        "mysql"
    }

    async fn ping(&self) -> SyncResult<()> {
        sqlx::query("select 1").execute(&self.pool).await?;

        Ok(())
    }

    async fn write_batch(&self, batch: &RowBatch) -> SyncResult<u64> {
        let statement = batch.statement();
        debug!(table = %batch.table, rows = batch.len(), "writing batch to destination");

        let result = sqlx::raw_sql(&statement)
            .execute(&self.pool)
            .await
            .map_err(|err| {
                sync_error!(
                    ErrorKind::WriteFailure,
                    "Destination batch write failed",
                    batch.table.to_string(),
                    source: err
                )
            })?;

        Ok(result.rows_affected())
    }

    async fn truncate(&self, table: &TableName) -> SyncResult<()> {
        info!(%table, "truncating destination table");

        let sql = format!("delete from {}", table.as_quoted_identifier());
        sqlx::raw_sql(&sql).execute(&self.pool).await?;

        Ok(())
    }

    async fn distinct_keys(
        &self,
        table: &TableName,
        columns: KeyColumns<'_>,
    ) -> SyncResult<Vec<String>> {
        let key = quote_mysql_identifier(columns.key);
        let sql = format!(
            "select {key} from {} group by {key}",
            table.as_quoted_identifier()
        );

        let mut keys = self
            .fetch_text_rows(&sql)
            .await?
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next().flatten())
            .collect::<Vec<_>>();
        keys.sort_unstable();
        keys.dedup();

        Ok(keys)
    }

    async fn key_versions(
        &self,
        table: &TableName,
        columns: KeyColumns<'_>,
        keys: &[String],
    ) -> SyncResult<HashMap<String, Vec<i64>>> {
        let mut versions: HashMap<String, Vec<i64>> = HashMap::new();
        if keys.is_empty() {
            return Ok(versions);
        }

        let key_list = keys
            .iter()
            .map(|key| Literal::Quoted(key.clone()).to_string())
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "select {}, {} from {} where {} in ({key_list})",
            quote_mysql_identifier(columns.key),
            quote_mysql_identifier(columns.version),
            table.as_quoted_identifier(),
            quote_mysql_identifier(columns.key),
        );

        for row in self.fetch_text_rows(&sql).await?.rows {
            let mut values = row.into_iter();
            let (Some(Some(key)), Some(Some(version))) = (values.next(), values.next()) else {
                continue;
            };
            let version = version.trim().parse::<i64>().map_err(|err| {
                sync_error!(
                    ErrorKind::ConversionError,
                    "Destination version is not an integer",
                    format!("{table} key {key} has version `{version}`"),
                    source: err
                )
            })?;
            versions.entry(key).or_default().push(version);
        }

        Ok(versions)
    }

    async fn delete_rows(
        &self,
        table: &TableName,
        columns: KeyColumns<'_>,
        key: &str,
        versions: Option<&[i64]>,
    ) -> SyncResult<u64> {
        let sql = format!(
            "delete from {} where {}",
            table.as_quoted_identifier(),
            key_filter(columns, key, versions)
        );
        debug!(sql, "deleting destination rows");

        let result = sqlx::raw_sql(&sql).execute(&self.pool).await?;

        Ok(result.rows_affected())
    }

    async fn fetch_rows(
        &self,
        table: &TableName,
        columns: KeyColumns<'_>,
        key: &str,
        versions: Option<&[i64]>,
    ) -> SyncResult<SourceRows> {
        let sql = format!(
            "select * from {} where {}",
            table.as_quoted_identifier(),
            key_filter(columns, key, versions)
        );

        self.fetch_text_rows(&sql).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_filters_quote_keys_and_list_versions() {
        let columns = KeyColumns::new("zqdm", "bbrq");
        assert_eq!(key_filter(columns, "o'k", None), r"`zqdm` = 'o\'k'");
        assert_eq!(
            key_filter(columns, "000001", Some(&[20231231, 20240331])),
            "`zqdm` = '000001' and `bbrq` in (20231231,20240331)"
        );
    }
}
