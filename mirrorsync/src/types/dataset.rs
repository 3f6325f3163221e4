use crate::source::ConnectionDescriptor;
use crate::types::{ExportMode, TableName};
use crate::validation::RuleSet;

/// Column holding the key used for key-set differencing.
pub const DEFAULT_KEY_COLUMN: &str = "zqdm";

/// Column holding the per-key version used for sub-key differencing.
pub const DEFAULT_VERSION_COLUMN: &str = "bbrq";

/// Source SQL templates of a dataset, one per export mode.
///
/// Empty templates in the catalog are stored as [`None`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlTemplates {
    pub full: Option<String>,
    pub date_range: Option<String>,
    pub timestamp_range: Option<String>,
    pub real_time: Option<String>,
    pub code_filter: Option<String>,
}

impl SqlTemplates {
    /// Returns the template used by `mode`. Mirror rebuilds for [`ExportMode::Compare`] use the
    /// full template.
    pub fn for_mode(&self, mode: ExportMode) -> Option<&str> {
        let template = match mode {
            ExportMode::Full | ExportMode::Compare => &self.full,
            ExportMode::DateRange => &self.date_range,
            ExportMode::TimestampRange => &self.timestamp_range,
            ExportMode::RealTime => &self.real_time,
            ExportMode::CodeFilter => &self.code_filter,
        };

        template.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// A logical dataset: where its rows come from, where they go and how they are checked.
///
/// Loaded from the catalog at startup and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    pub table: TableName,
    pub templates: SqlTemplates,
    pub source: ConnectionDescriptor,
    pub rules: RuleSet,
    pub key_column: String,
    pub version_column: String,
}

impl Dataset {
    pub fn new(
        name: impl Into<String>,
        table: TableName,
        templates: SqlTemplates,
        source: ConnectionDescriptor,
    ) -> Self {
        Self {
            name: name.into(),
            table,
            templates,
            source,
            rules: RuleSet::default(),
            key_column: DEFAULT_KEY_COLUMN.to_string(),
            version_column: DEFAULT_VERSION_COLUMN.to_string(),
        }
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_templates_are_missing() {
        let templates = SqlTemplates {
            full: Some("select * from t".to_string()),
            date_range: Some("   ".to_string()),
            ..SqlTemplates::default()
        };

        assert_eq!(templates.for_mode(ExportMode::Compare), Some("select * from t"));
        assert_eq!(templates.for_mode(ExportMode::DateRange), None);
        assert_eq!(templates.for_mode(ExportMode::CodeFilter), None);
    }
}
