use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::source::{SourceColumn, SourceRows};
use crate::transform::literal::{Literal, ValueTuple};
use crate::types::{DEFAULT_KEY_COLUMN, DEFAULT_VERSION_COLUMN, FieldType, TableName};
use crate::validation::{RowVerdict, RuleSet, Value, Variables};

/// Source columns that have no destination counterpart and are dropped before formatting.
pub const CARRIER_COLUMNS: [&str; 3] = ["market", "mtime", "id"];

/// Timestamp column rendered with full microsecond precision instead of as a date.
pub const PRECISE_TIMESTAMP_COLUMN: &str = "rtime";

const PRECISE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub fn is_carrier_column(name: &str) -> bool {
    CARRIER_COLUMNS.contains(&name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rendering {
    Text,
    PreciseTimestamp,
    LegacyDate,
}

#[derive(Debug, Clone)]
struct OutputColumn {
    source_index: usize,
    name: String,
    field_type: FieldType,
    rendering: Rendering,
}

/// Rows formatted for the destination.
#[derive(Debug, Clone, Default)]
pub struct TransformedRows {
    /// Output column names, carrier columns excluded.
    pub columns: Arc<[String]>,
    pub tuples: Vec<ValueTuple>,
    /// Rows dropped by `SkipRow` rules.
    pub skipped_rows: usize,
    /// Rows kept despite a failing `Continue` rule.
    pub rows_with_warnings: usize,
}

/// Turns source rows into destination value tuples.
///
/// The per-column plan (which columns survive, how each is quoted and rendered) is computed once
/// from the source column descriptions and the destination field types.
#[derive(Debug)]
pub struct RowTransformer<'a> {
    table: &'a TableName,
    columns: Vec<OutputColumn>,
    rules: Option<&'a RuleSet>,
    key_column: &'a str,
    version_column: &'a str,
}

impl<'a> RowTransformer<'a> {
    pub fn new(
        table: &'a TableName,
        source_columns: &[SourceColumn],
        field_types: &HashMap<String, FieldType>,
    ) -> Self {
        let columns = source_columns
            .iter()
            .enumerate()
            .filter(|(_, column)| !is_carrier_column(&column.name))
            .map(|(source_index, column)| {
                let rendering = match (column.is_timestamp, column.name.as_str()) {
                    (false, _) => Rendering::Text,
                    (true, PRECISE_TIMESTAMP_COLUMN) => Rendering::PreciseTimestamp,
                    (true, _) => Rendering::LegacyDate,
                };

                OutputColumn {
                    source_index,
                    name: column.name.clone(),
                    field_type: field_types.get(&column.name).copied().unwrap_or_default(),
                    rendering,
                }
            })
            .collect();

        Self {
            table,
            columns,
            rules: None,
            key_column: DEFAULT_KEY_COLUMN,
            version_column: DEFAULT_VERSION_COLUMN,
        }
    }

    /// Validates every row against `rules`. Empty rule sets are ignored.
    pub fn with_rules(mut self, rules: &'a RuleSet) -> Self {
        self.rules = (!rules.is_empty()).then_some(rules);
        self
    }

    /// Columns whose values identify a row in log messages.
    pub fn with_key_columns(mut self, key_column: &'a str, version_column: &'a str) -> Self {
        self.key_column = key_column;
        self.version_column = version_column;
        self
    }

    pub fn output_columns(&self) -> Arc<[String]> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    /// Formats and validates every row of `rows`.
    ///
    /// A `SkipAll` verdict on any row fails the whole call with [`ErrorKind::ValidationAbort`], so
    /// no partial output exists for that extraction.
    pub fn transform(&self, rows: SourceRows) -> SyncResult<TransformedRows> {
        let mut output = TransformedRows {
            columns: self.output_columns(),
            tuples: Vec::with_capacity(rows.rows.len()),
            ..TransformedRows::default()
        };

        for (row_index, row) in rows.rows.into_iter().enumerate() {
            let mut variables = Variables::new();
            let mut literals = Vec::with_capacity(self.columns.len());

            for column in &self.columns {
                let raw = row.get(column.source_index).and_then(|value| value.as_deref());
                let rendered = self.render(column, raw)?;

                if self.rules.is_some() {
                    variables.insert(
                        column.name.clone(),
                        Value::from_column(rendered.as_deref(), column.field_type),
                    );
                }
                literals.push(Literal::typed(rendered, column.field_type.is_quoted()));
            }

            let Some(rules) = self.rules else {
                output.tuples.push(ValueTuple(literals));
                continue;
            };

            let key = self.column_text(&literals, self.key_column);
            let version = self.column_text(&literals, self.version_column);
            match rules.evaluate(&variables) {
                RowVerdict::Keep { warning: None } => output.tuples.push(ValueTuple(literals)),
                RowVerdict::Keep {
                    warning: Some(warning),
                } => {
                    warn!(
                        table = %self.table,
                        key,
                        version,
                        error = %warning,
                        "row failed validation, keeping it"
                    );
                    output.rows_with_warnings += 1;
                    output.tuples.push(ValueTuple(literals));
                }
                RowVerdict::SkipRow(err) => {
                    debug!(table = %self.table, key, version, error = %err, "row skipped by validation");
                    output.skipped_rows += 1;
                }
                RowVerdict::Abort(err) => {
                    warn!(
                        table = %self.table,
                        key,
                        version,
                        row = row_index,
                        error = %err,
                        "validation aborted the extraction"
                    );
                    return Err(err);
                }
            }
        }

        info!(
            table = %self.table,
            rows = output.tuples.len(),
            skipped_rows = output.skipped_rows,
            rows_with_warnings = output.rows_with_warnings,
            "transformed source rows"
        );

        Ok(output)
    }

    fn column_text<'b>(&self, literals: &'b [Literal], name: &str) -> &'b str {
        self.columns
            .iter()
            .position(|column| column.name == name)
            .and_then(|index| literals.get(index))
            .and_then(Literal::as_text)
            .unwrap_or("default")
    }

    fn render(&self, column: &OutputColumn, raw: Option<&str>) -> SyncResult<Option<String>> {
        let Some(raw) = raw.filter(|raw| !raw.is_empty()) else {
            return Ok(None);
        };

        let rendered = match column.rendering {
            Rendering::Text => raw.to_string(),
            Rendering::PreciseTimestamp => parse_timestamp(raw, &column.name)?
                .format(PRECISE_TIMESTAMP_FORMAT)
                .to_string(),
            Rendering::LegacyDate => legacy_date(parse_timestamp(raw, &column.name)?).to_string(),
        };

        Ok(Some(rendered))
    }
}

/// Collapses a timestamp into the `YYYYMMDD` integer used by legacy date columns.
pub fn legacy_date(timestamp: NaiveDateTime) -> u32 {
    let date = timestamp.date();
    date.year() as u32 * 10_000 + date.month() * 100 + date.day()
}

/// Parses a source timestamp, keeping the wall-clock time of its own offset.
pub fn parse_timestamp(text: &str, column: &str) -> SyncResult<NaiveDateTime> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Ok(timestamp.naive_local());
    }
    if let Ok(timestamp) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(timestamp.naive_local());
    }
    if let Ok(timestamp) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(timestamp);
    }
    if let Some(timestamp) = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(timestamp);
    }

    bail!(
        ErrorKind::ConversionError,
        "Source timestamp could not be parsed",
        format!("column {column} has value `{text}`")
    )
}
