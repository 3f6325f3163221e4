use std::sync::Arc;

use mirrorsync_config::shared::TlsConfig;

use crate::batch::RowBatch;
use crate::catalog::ANY_SCHEMA;
use crate::catalog::memory::MemoryCatalog;
use crate::source::{ConnectionDescriptor, SourceColumn, SourceRows};
use crate::transform::{Literal, ValueTuple};
use crate::types::{Dataset, FieldType, SqlTemplates, TableName};

pub const BALANCE_FULL_TEMPLATE: &str = "select zqdm, bbrq, amount from fin.balance";

/// The statement executed for [`BALANCE_FULL_TEMPLATE`].
pub const BALANCE_FULL_SQL: &str = "select zqdm, bbrq, amount from fin.balance;";

pub const BALANCE_DATE_RANGE_TEMPLATE: &str =
    "select zqdm, bbrq, amount from fin.balance where bbrq between [start] and [end]";

pub fn source_descriptor() -> ConnectionDescriptor {
    ConnectionDescriptor::from_server(
        "source.test:5432",
        "finance",
        "reader",
        None,
        TlsConfig::disabled(),
    )
    .expect("test server string is valid")
}

/// The `balance` dataset writing into `fin.balance`, keyed by `zqdm` and versioned by `bbrq`.
pub fn balance_dataset() -> Dataset {
    let templates = SqlTemplates {
        full: Some(BALANCE_FULL_TEMPLATE.to_string()),
        date_range: Some(BALANCE_DATE_RANGE_TEMPLATE.to_string()),
        code_filter: Some(
            "select zqdm, bbrq, amount from fin.balance where zqdm in ([codelist])".to_string(),
        ),
        ..SqlTemplates::default()
    };

    Dataset::new(
        "balance",
        TableName::new("fin", "balance"),
        templates,
        source_descriptor(),
    )
}

/// Registers the destination types of the `balance` columns.
pub async fn register_field_types(catalog: &MemoryCatalog) {
    catalog
        .add_field_type(ANY_SCHEMA, "zqdm", FieldType::String)
        .await;
    catalog.add_field_type("fin", "bbrq", FieldType::Int).await;
    catalog
        .add_field_type("fin", "amount", FieldType::Double)
        .await;
}

/// Source rows of the `balance` dataset from `(zqdm, bbrq, amount)` triples.
pub fn balance_rows(rows: &[(&str, i64, &str)]) -> SourceRows {
    let columns = ["zqdm", "bbrq", "amount"]
        .into_iter()
        .map(|name| SourceColumn::new(name, false))
        .collect();
    let rows = rows
        .iter()
        .map(|(key, version, amount)| {
            vec![
                Some(key.to_string()),
                Some(version.to_string()),
                Some(amount.to_string()),
            ]
        })
        .collect();

    SourceRows::new(columns, rows)
}

/// One batch of `balance` rows for seeding a destination table directly.
pub fn row_batch(table: &TableName, rows: &[(&str, i64, &str)]) -> RowBatch {
    RowBatch {
        table: table.clone(),
        columns: Arc::from(vec![
            "zqdm".to_string(),
            "bbrq".to_string(),
            "amount".to_string(),
        ]),
        tuples: rows
            .iter()
            .map(|(key, version, amount)| {
                ValueTuple(vec![
                    Literal::Quoted(key.to_string()),
                    Literal::Bare(version.to_string()),
                    Literal::Bare(amount.to_string()),
                ])
            })
            .collect(),
    }
}
