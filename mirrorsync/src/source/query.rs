use chrono::NaiveDate;
use pg_escape::quote_literal;

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::types::{Dataset, ExportMode, QueryRequest};

const START_PLACEHOLDER: &str = "[start]";
const END_PLACEHOLDER: &str = "[end]";
const CODE_LIST_PLACEHOLDER: &str = "[codelist]";

/// How a resolved query has to be executed against the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    /// A plain select.
    Normal,
    /// A function returning a cursor, run inside a transaction and drained with `fetch all`.
    StoredProcedure,
    /// A select preceded by session settings in the template; nested loop joins are enabled
    /// for the duration of the query.
    IndexHint,
}

/// A source query with all placeholders substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedQuery {
    pub sql: String,
    pub shape: QueryShape,
}

impl ResolvedQuery {
    pub fn new(sql: impl Into<String>, shape: QueryShape) -> Self {
        Self {
            sql: sql.into(),
            shape,
        }
    }

    /// Resolves the template `dataset` declares for `mode`.
    ///
    /// `today` replaces default dates and must already be expressed in the scheduler's offset.
    pub fn for_request(
        dataset: &Dataset,
        request: &QueryRequest,
        mode: ExportMode,
        today: NaiveDate,
    ) -> SyncResult<Self> {
        let Some(template) = dataset.templates.for_mode(mode) else {
            bail!(
                ErrorKind::InvalidTemplate,
                "Dataset has no query template for the export mode",
                format!("dataset {} has no {mode} template", dataset.name)
            );
        };

        let sql = substitute_placeholders(template, request, mode, today)?;

        Ok(detect_shape(&sql))
    }
}

fn substitute_placeholders(
    template: &str,
    request: &QueryRequest,
    mode: ExportMode,
    today: NaiveDate,
) -> SyncResult<String> {
    match mode {
        ExportMode::DateRange | ExportMode::TimestampRange => Ok(template
            .replacen(START_PLACEHOLDER, &request.start_date.render(today), 1)
            .replacen(END_PLACEHOLDER, &request.end_date.render(today), 1)),
        ExportMode::CodeFilter => {
            if request.codes.is_empty() {
                bail!(
                    ErrorKind::InvalidData,
                    "Code filter export requires at least one code",
                    request.dataset_name.as_str()
                );
            }

            let code_list = request
                .codes
                .iter()
                .map(|code| quote_literal(code))
                .collect::<Vec<_>>()
                .join(",");
            Ok(template.replacen(CODE_LIST_PLACEHOLDER, &code_list, 1))
        }
        _ => Ok(template.to_string()),
    }
}

/// Classifies the query text and rewrites it into the statement that is actually executed.
pub fn detect_shape(sql: &str) -> ResolvedQuery {
    // Stored procedure calls are written as `{proc_name(args)}` without the select.
    if sql.contains('{') && sql.contains('}') {
        let sql = sql.replacen('{', "select ", 1).replacen('}', ";", 1);
        return ResolvedQuery::new(sql, QueryShape::StoredProcedure);
    }

    let mut shape = QueryShape::Normal;
    for fragment in sql.split(';') {
        let fragment = fragment.trim_matches(' ');
        if fragment.contains("select") || fragment.contains("SELECT") {
            return ResolvedQuery::new(format!("{fragment};"), shape);
        }
        if !fragment.is_empty() {
            shape = QueryShape::IndexHint;
        }
    }

    ResolvedQuery::new(sql, shape)
}

#[cfg(test)]
mod tests {
    use mirrorsync_config::shared::TlsConfig;

    use super::*;
    use crate::source::ConnectionDescriptor;
    use crate::types::{SqlTemplates, TableName, Trigger};

    fn dataset(templates: SqlTemplates) -> Dataset {
        let source = ConnectionDescriptor::from_server(
            "localhost:5432",
            "finance",
            "reader",
            None,
            TlsConfig::disabled(),
        )
        .unwrap();
        Dataset::new("balance", TableName::new("fin", "balance"), templates, source)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    #[test]
    fn date_placeholders_are_replaced_once() {
        let dataset = dataset(SqlTemplates {
            date_range: Some("select * from t where d between [start] and [end]".to_string()),
            ..SqlTemplates::default()
        });
        let request = QueryRequest::new("balance", ExportMode::DateRange, Trigger::Manual)
            .with_dates(20240101, 0);

        let query =
            ResolvedQuery::for_request(&dataset, &request, ExportMode::DateRange, today()).unwrap();
        assert_eq!(
            query,
            ResolvedQuery::new(
                "select * from t where d between 20240101 and 20240305;",
                QueryShape::Normal
            )
        );
    }

    #[test]
    fn code_list_is_quoted() {
        let dataset = dataset(SqlTemplates {
            code_filter: Some("select * from t where code in ([codelist])".to_string()),
            ..SqlTemplates::default()
        });
        let request = QueryRequest::new("balance", ExportMode::CodeFilter, Trigger::Manual)
            .with_codes(["000001", "o'k"]);

        let query =
            ResolvedQuery::for_request(&dataset, &request, ExportMode::CodeFilter, today())
                .unwrap();
        assert_eq!(
            query.sql,
            "select * from t where code in ('000001','o''k');"
        );
    }

    #[test]
    fn missing_template_is_invalid() {
        let dataset = dataset(SqlTemplates::default());
        let request = QueryRequest::new("balance", ExportMode::RealTime, Trigger::Scheduled);
        let err = ResolvedQuery::for_request(&dataset, &request, ExportMode::RealTime, today())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTemplate);
    }

    #[test]
    fn braces_mark_stored_procedures() {
        let query = detect_shape("{fin.get_balance('20240101')}");
        assert_eq!(
            query,
            ResolvedQuery::new(
                "select fin.get_balance('20240101');",
                QueryShape::StoredProcedure
            )
        );
    }

    #[test]
    fn leading_statements_mark_index_hints() {
        let query = detect_shape("set enable_nestloop=on; select a from t ;");
        assert_eq!(
            query,
            ResolvedQuery::new("select a from t;", QueryShape::IndexHint)
        );
    }
}
