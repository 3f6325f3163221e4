use std::fmt::Write;
use std::sync::Arc;

use crate::transform::ValueTuple;
use crate::types::{TableName, quote_mysql_identifier};

/// Rows destined for one write statement.
///
/// Never holds more rows than the row limit of the [`BatchAssembler`] that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowBatch {
    pub table: TableName,
    pub columns: Arc<[String]>,
    pub tuples: Vec<ValueTuple>,
}

impl RowBatch {
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Renders the batch as a single terminated `REPLACE` statement.
    pub fn statement(&self) -> String {
        let mut sql = format!("REPLACE INTO {}(", self.table.as_quoted_identifier());
        for (index, column) in self.columns.iter().enumerate() {
            if index > 0 {
                sql.push(',');
            }
            sql.push_str(&quote_mysql_identifier(column));
        }
        sql.push_str(")VALUES");

        for (index, tuple) in self.tuples.iter().enumerate() {
            if index > 0 {
                sql.push(',');
            }
            // Writing into a `String` cannot fail.
            let _ = write!(sql, "{tuple}");
        }
        sql.push(';');

        sql
    }
}

/// Splits formatted rows into batches of at most `row_limit` rows, preserving row order.
#[derive(Debug, Clone, Copy)]
pub struct BatchAssembler {
    row_limit: usize,
}

impl BatchAssembler {
    pub fn new(row_limit: usize) -> Self {
        Self {
            row_limit: row_limit.max(1),
        }
    }

    pub fn row_limit(&self) -> usize {
        self.row_limit
    }

    pub fn assemble(
        &self,
        table: &TableName,
        columns: Arc<[String]>,
        tuples: Vec<ValueTuple>,
    ) -> Vec<RowBatch> {
        let mut batches = Vec::with_capacity(tuples.len().div_ceil(self.row_limit));
        let mut current = Vec::with_capacity(self.row_limit.min(tuples.len()));

        for tuple in tuples {
            current.push(tuple);
            if current.len() == self.row_limit {
                batches.push(RowBatch {
                    table: table.clone(),
                    columns: columns.clone(),
                    tuples: std::mem::take(&mut current),
                });
            }
        }

        if !current.is_empty() {
            batches.push(RowBatch {
                table: table.clone(),
                columns,
                tuples: current,
            });
        }

        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Literal;

    fn tuples(count: usize) -> Vec<ValueTuple> {
        (0..count)
            .map(|i| {
                ValueTuple(vec![
                    Literal::Quoted(format!("{i:06}")),
                    Literal::Bare(i.to_string()),
                ])
            })
            .collect()
    }

    fn columns() -> Arc<[String]> {
        Arc::from(vec!["zqdm".to_string(), "bbrq".to_string()])
    }

    #[test]
    fn five_rows_with_limit_two() {
        let table = TableName::new("fin", "balance");
        let batches = BatchAssembler::new(2).assemble(&table, columns(), tuples(5));

        let sizes: Vec<_> = batches.iter().map(RowBatch::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(
            batches[2].statement(),
            "REPLACE INTO `fin`.`balance`(`zqdm`,`bbrq`)VALUES('000004',4);"
        );
    }

    #[test]
    fn batch_count_is_ceiling_of_rows_over_limit() {
        let table = TableName::new("fin", "balance");
        for (rows, limit) in [(0, 3), (1, 3), (3, 3), (7, 3), (500, 500), (1001, 500)] {
            let batches = BatchAssembler::new(limit).assemble(&table, columns(), tuples(rows));
            assert_eq!(batches.len(), rows.div_ceil(limit), "{rows} rows, limit {limit}");
            assert!(batches.iter().all(|batch| batch.len() <= limit));
            assert!(batches.iter().all(|batch| batch.statement().ends_with(';')));

            let expected_last = match rows % limit {
                0 => limit,
                rest => rest,
            };
            if let Some(last) = batches.last() {
                assert_eq!(last.len(), expected_last);
            }
        }
    }

    #[test]
    fn statements_join_rows_in_order() {
        let table = TableName::new("fin", "balance");
        let batches = BatchAssembler::new(10).assemble(&table, columns(), tuples(2));
        assert_eq!(
            batches[0].statement(),
            "REPLACE INTO `fin`.`balance`(`zqdm`,`bbrq`)VALUES('000000',0),('000001',1);"
        );
    }
}
