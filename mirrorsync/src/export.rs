//! The extract, transform, batch and write chain shared by exports and reconciliation.

use std::sync::Arc;

use tracing::{Instrument, info, info_span};

use crate::batch::{BatchAssembler, RowBatch};
use crate::catalog::MetadataCatalog;
use crate::destination::Destination;
use crate::error::SyncResult;
use crate::source::extractor::Extractor;
use crate::source::query::ResolvedQuery;
use crate::source::{SourceConnector, SourceRows};
use crate::transform::{RowTransformer, TransformedRows};
use crate::types::{Dataset, TableName};
use crate::writer::{BatchWriter, ExportSummary};

/// Whether the dataset's validation rules run while rows are transformed.
///
/// Rows copied into or out of a mirror are compared as they are, so rules are skipped there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Apply,
    Skip,
}

#[derive(Debug)]
pub struct Exporter<K, C: SourceConnector, D> {
    catalog: Arc<K>,
    extractor: Extractor<C>,
    writer: BatchWriter<D>,
    assembler: BatchAssembler,
}

impl<K, C, D> Clone for Exporter<K, C, D>
where
    C: SourceConnector,
{
    fn clone(&self) -> Self {
        Self {
            catalog: self.catalog.clone(),
            extractor: self.extractor.clone(),
            writer: self.writer.clone(),
            assembler: self.assembler,
        }
    }
}

impl<K, C, D> Exporter<K, C, D>
where
    K: MetadataCatalog,
    C: SourceConnector,
    D: Destination,
{
    pub fn new(
        catalog: Arc<K>,
        extractor: Extractor<C>,
        writer: BatchWriter<D>,
        assembler: BatchAssembler,
    ) -> Self {
        Self {
            catalog,
            extractor,
            writer,
            assembler,
        }
    }

    pub fn writer(&self) -> &BatchWriter<D> {
        &self.writer
    }

    /// Extracts `query` from the dataset's source and writes the formatted rows into `target`
    /// with concurrent batches.
    ///
    /// Extraction and validation failures are returned before anything is written, so a run
    /// aborted by a rule leaves the destination untouched.
    pub async fn run(
        &self,
        dataset: &Dataset,
        query: &ResolvedQuery,
        target: &TableName,
        validation: Validation,
    ) -> SyncResult<ExportSummary> {
        let span = info_span!("export", dataset = %dataset.name, table = %target);

        async {
            let rows = self.extractor.extract(&dataset.source, query).await?;
            let transformed = self.transform(dataset, target, rows, validation).await?;
            let skipped_rows = transformed.skipped_rows;

            let batches = self.batches(target, transformed);
            let mut summary = self.writer.write_concurrent(batches).await?;
            summary.skipped_rows = skipped_rows;

            info!(
                batches = summary.batches,
                failed_batches = summary.failed_batches,
                rows_written = summary.rows_written,
                skipped_rows,
                "export finished"
            );

            Ok(summary)
        }
        .instrument(span)
        .await
    }

    /// Formats `rows` for `target`, typing columns with the destination types of the dataset's
    /// schema.
    pub async fn transform(
        &self,
        dataset: &Dataset,
        target: &TableName,
        rows: SourceRows,
        validation: Validation,
    ) -> SyncResult<TransformedRows> {
        let columns = rows.column_names().map(str::to_string).collect::<Vec<_>>();
        let field_types = self
            .catalog
            .field_types(&dataset.table.schema, &columns)
            .await?;

        let mut transformer = RowTransformer::new(target, &rows.columns, &field_types)
            .with_key_columns(&dataset.key_column, &dataset.version_column);
        if validation == Validation::Apply {
            transformer = transformer.with_rules(&dataset.rules);
        }

        transformer.transform(rows)
    }

    pub fn batches(&self, target: &TableName, rows: TransformedRows) -> Vec<RowBatch> {
        self.assembler.assemble(target, rows.columns, rows.tuples)
    }
}
