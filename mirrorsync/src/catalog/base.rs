use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::types::{Dataset, ExportMode, FieldType, TableName};

/// Wildcard schema of field type entries that apply to every schema.
pub const ANY_SCHEMA: &str = "*";

/// A recurring export registered in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub table: TableName,
    pub mode: ExportMode,
    /// Cron expressions, one per firing rule.
    pub schedules: Vec<String>,
}

impl ScheduledTask {
    /// Builds a task from a `;`-separated list of schedule expressions, ignoring empty entries.
    pub fn new(table: TableName, mode: ExportMode, schedules: &str) -> Self {
        let schedules = schedules
            .split(';')
            .map(str::trim)
            .filter(|schedule| !schedule.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            table,
            mode,
            schedules,
        }
    }
}

/// Everything the catalog knows, as loaded at one point in time.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    datasets: HashMap<String, Arc<Dataset>>,
    by_table: HashMap<TableName, String>,
    field_types: HashMap<String, HashMap<String, FieldType>>,
    tasks: Vec<ScheduledTask>,
}

impl CatalogSnapshot {
    pub fn insert_dataset(&mut self, dataset: Dataset) {
        self.by_table
            .insert(dataset.table.clone(), dataset.name.clone());
        self.datasets
            .insert(dataset.name.clone(), Arc::new(dataset));
    }

    /// Records the type of `field` in `schema`, or in every schema for [`ANY_SCHEMA`].
    pub fn insert_field_type(
        &mut self,
        schema: impl Into<String>,
        field: impl Into<String>,
        field_type: FieldType,
    ) {
        self.field_types
            .entry(schema.into())
            .or_default()
            .insert(field.into(), field_type);
    }

    pub fn insert_task(&mut self, task: ScheduledTask) {
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn resolve(&self, name: &str) -> SyncResult<Arc<Dataset>> {
        match self.datasets.get(name) {
            Some(dataset) => Ok(dataset.clone()),
            None => bail!(
                ErrorKind::UnknownDataset,
                "Dataset is not registered in the catalog",
                name
            ),
        }
    }

    pub fn resolve_table(&self, table: &TableName) -> SyncResult<Arc<Dataset>> {
        match self.by_table.get(table) {
            Some(name) => self.resolve(name),
            None => bail!(
                ErrorKind::UnknownDataset,
                "Table is not registered in the catalog",
                table
            ),
        }
    }

    /// Looks up the types of `columns`. Entries of `schema` win over wildcard entries and
    /// columns known to neither are absent from the result.
    pub fn field_types(&self, schema: &str, columns: &[String]) -> HashMap<String, FieldType> {
        let exact = self.field_types.get(schema);
        let wildcard = self.field_types.get(ANY_SCHEMA);

        columns
            .iter()
            .filter_map(|column| {
                exact
                    .and_then(|types| types.get(column))
                    .or_else(|| wildcard.and_then(|types| types.get(column)))
                    .map(|field_type| (column.clone(), *field_type))
            })
            .collect()
    }

    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }
}

/// Source of dataset definitions, destination field types and export schedules.
pub trait MetadataCatalog: Send + Sync + 'static {
    /// Returns the dataset registered under `name`, or [`ErrorKind::UnknownDataset`].
    fn resolve(&self, name: &str) -> impl Future<Output = SyncResult<Arc<Dataset>>> + Send;

    /// Returns the dataset writing into `table`.
    fn resolve_table(
        &self,
        table: &TableName,
    ) -> impl Future<Output = SyncResult<Arc<Dataset>>> + Send;

    /// Returns the destination types of `columns` within `schema`.
    fn field_types(
        &self,
        schema: &str,
        columns: &[String],
    ) -> impl Future<Output = SyncResult<HashMap<String, FieldType>>> + Send;

    fn scheduled_tasks(&self) -> impl Future<Output = SyncResult<Vec<ScheduledTask>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedules_split_on_semicolons() {
        let task = ScheduledTask::new(
            TableName::new("fin", "balance"),
            ExportMode::Full,
            "0 3 * * *; ;30 12 * * 1-5;",
        );
        assert_eq!(task.schedules, vec!["0 3 * * *", "30 12 * * 1-5"]);
    }

    #[test]
    fn exact_schema_types_win_over_wildcard() {
        let mut snapshot = CatalogSnapshot::default();
        snapshot.insert_field_type(ANY_SCHEMA, "zqdm", FieldType::String);
        snapshot.insert_field_type(ANY_SCHEMA, "bbrq", FieldType::String);
        snapshot.insert_field_type("fin", "bbrq", FieldType::Int);
        snapshot.insert_field_type("other", "amount", FieldType::Double);

        let columns = ["zqdm", "bbrq", "amount"].map(String::from);
        let types = snapshot.field_types("fin", &columns);
        assert_eq!(types.get("zqdm"), Some(&FieldType::String));
        assert_eq!(types.get("bbrq"), Some(&FieldType::Int));
        assert_eq!(types.get("amount"), None);
    }

    #[test]
    fn unknown_names_are_unknown_datasets() {
        let snapshot = CatalogSnapshot::default();
        assert_eq!(
            snapshot.resolve("missing").unwrap_err().kind(),
            ErrorKind::UnknownDataset
        );
        assert_eq!(
            snapshot
                .resolve_table(&TableName::new("fin", "missing"))
                .unwrap_err()
                .kind(),
            ErrorKind::UnknownDataset
        );
    }
}
