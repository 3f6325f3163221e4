use std::collections::HashMap;
use std::sync::Arc;

use mirrorsync_config::shared::{MySqlConnectionConfig, TlsConfig};
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::catalog::{CatalogSnapshot, MetadataCatalog, ScheduledTask};
use crate::error::{ErrorKind, SyncResult};
use crate::source::ConnectionDescriptor;
use crate::types::{Dataset, ExportMode, FieldType, SqlTemplates, TableName};
use crate::validation::{FailureAction, RuleSet, ValidationRule};
use crate::{bail, sync_error};

/// Number of connections kept to the metadata store.
const NUM_POOL_CONNECTIONS: u32 = 2;

#[derive(Debug, sqlx::FromRow)]
struct TableInfoRow {
    table_name: String,
    schema_name: String,
    fin_name: String,
    all_proc: Option<String>,
    rep_proc: Option<String>,
    fin_proc: Option<String>,
    real_proc: Option<String>,
    code_proc: Option<String>,
    server: String,
    user_name: String,
    passwd: Option<String>,
    database: String,
}

#[derive(Debug, sqlx::FromRow)]
struct TaskItemRow {
    table_name: String,
    schema_name: String,
    export: i32,
    cron: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct TypeDescribeRow {
    field_name: String,
    field_type: i32,
    field_schema: String,
}

#[derive(Debug, sqlx::FromRow)]
struct CheckRuleRow {
    check_schema: String,
    check_table: String,
    check_formula: String,
    failed_operation: i32,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn lookup_error(what: &'static str) -> impl FnOnce(sqlx::Error) -> crate::error::SyncError {
    move |err| {
        sync_error!(
            ErrorKind::CatalogLookupFailed,
            "Could not read the metadata catalog",
            what,
            source: err
        )
    }
}

/// Catalog read from the MySQL metadata store.
///
/// The `TableInfo`, `TaskItems`, `type_describe` and `topview.UpdateCheckRule` tables are read
/// once when the catalog is created and again on every [`MySqlCatalog::reload`]; lookups are
/// served from memory in between.
#[derive(Debug)]
pub struct MySqlCatalog {
    pool: MySqlPool,
    tls: TlsConfig,
    snapshot: RwLock<CatalogSnapshot>,
}

impl MySqlCatalog {
    /// Connects to the metadata store and loads the catalog. Source descriptors built from it
    /// use `tls`.
    pub async fn connect(config: &MySqlConnectionConfig, tls: TlsConfig) -> SyncResult<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(NUM_POOL_CONNECTIONS)
            .connect_lazy_with(config.with_db());

        let catalog = Self {
            pool,
            tls,
            snapshot: RwLock::new(CatalogSnapshot::default()),
        };
        catalog.reload().await?;

        Ok(catalog)
    }

    /// Re-reads every catalog table and swaps the in-memory snapshot when all reads succeed.
    pub async fn reload(&self) -> SyncResult<()> {
        let snapshot = self.load().await?;
        info!(
            datasets = snapshot.len(),
            tasks = snapshot.tasks().len(),
            "metadata catalog loaded"
        );
        *self.snapshot.write().await = snapshot;

        Ok(())
    }

    async fn load(&self) -> SyncResult<CatalogSnapshot> {
        let tables = sqlx::query_as::<_, TableInfoRow>(
            r#"
            select table_name, schema_name, fin_name, all_proc, rep_proc, fin_proc, real_proc,
                   code_proc, server, user_name, passwd, `database`
            from TableInfo
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(lookup_error("TableInfo"))?;

        if tables.is_empty() {
            bail!(
                ErrorKind::CatalogLookupFailed,
                "The metadata catalog defines no tables"
            );
        }

        let tasks = sqlx::query_as::<_, TaskItemRow>(
            "select table_name, schema_name, export, cron from TaskItems",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(lookup_error("TaskItems"))?;

        let field_types = sqlx::query_as::<_, TypeDescribeRow>(
            "select field_name, field_type, field_schema from type_describe",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(lookup_error("type_describe"))?;

        let rules = sqlx::query_as::<_, CheckRuleRow>(
            r#"
            select check_schema, check_table, check_formula, failed_operation
            from topview.UpdateCheckRule
            order by check_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(lookup_error("topview.UpdateCheckRule"))?;

        let mut rules_by_table: HashMap<TableName, Vec<ValidationRule>> = HashMap::new();
        for rule in rules {
            let table = TableName::new(rule.check_schema, rule.check_table);
            let compiled = ValidationRule::new(
                rule.check_formula,
                FailureAction::from_code(rule.failed_operation),
            )
            .map_err(|err| {
                sync_error!(
                    ErrorKind::InvalidExpression,
                    "Validation rule of the catalog does not compile",
                    table.to_string(),
                    source: err
                )
            })?;
            rules_by_table.entry(table).or_default().push(compiled);
        }

        let mut snapshot = CatalogSnapshot::default();
        for row in tables {
            let table = TableName::new(row.schema_name, row.table_name);
            let source = ConnectionDescriptor::from_server(
                &row.server,
                row.database,
                row.user_name,
                non_empty(row.passwd),
                self.tls.clone(),
            )?;
            let templates = SqlTemplates {
                full: non_empty(row.all_proc),
                date_range: non_empty(row.rep_proc),
                timestamp_range: non_empty(row.fin_proc),
                real_time: non_empty(row.real_proc),
                code_filter: non_empty(row.code_proc),
            };
            let rules = rules_by_table.remove(&table).unwrap_or_default();

            snapshot.insert_dataset(
                Dataset::new(row.fin_name, table, templates, source).with_rules(RuleSet::new(rules)),
            );
        }

        for row in field_types {
            snapshot.insert_field_type(
                row.field_schema,
                row.field_name,
                FieldType::from_code(row.field_type),
            );
        }

        for row in tasks {
            let table = TableName::new(row.schema_name, row.table_name);
            let mode = match ExportMode::try_from(row.export) {
                Ok(mode) => mode,
                Err(err) => {
                    warn!(%table, error = %err, "skipping scheduled task with an unknown mode");
                    continue;
                }
            };
            snapshot.insert_task(ScheduledTask::new(
                table,
                mode,
                row.cron.as_deref().unwrap_or_default(),
            ));
        }

        Ok(snapshot)
    }
}

impl MetadataCatalog for MySqlCatalog {
    async fn resolve(&self, name: &str) -> SyncResult<Arc<Dataset>> {
        self.snapshot.read().await.resolve(name)
    }

    async fn resolve_table(&self, table: &TableName) -> SyncResult<Arc<Dataset>> {
        self.snapshot.read().await.resolve_table(table)
    }

    async fn field_types(
        &self,
        schema: &str,
        columns: &[String],
    ) -> SyncResult<HashMap<String, FieldType>> {
        Ok(self.snapshot.read().await.field_types(schema, columns))
    }

    async fn scheduled_tasks(&self) -> SyncResult<Vec<ScheduledTask>> {
        Ok(self.snapshot.read().await.tasks().to_vec())
    }
}
