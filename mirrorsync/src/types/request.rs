use std::fmt;

use chrono::{Datelike, NaiveDate};

use crate::bail;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::types::TableName;

/// How rows are selected from the source for one export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportMode {
    /// Every row of the dataset.
    Full,
    /// Rows whose version (report date) falls within the requested dates.
    DateRange,
    /// Rows whose modification timestamp falls within the requested dates.
    TimestampRange,
    /// Rows changed since the last real-time poll, as defined by the dataset's template.
    RealTime,
    /// Rows whose key is in the requested code list.
    CodeFilter,
    /// No extraction; reconciles the destination against a freshly rebuilt mirror.
    Compare,
}

impl ExportMode {
    pub fn code(&self) -> i32 {
        match self {
            ExportMode::Full => 0,
            ExportMode::DateRange => 1,
            ExportMode::TimestampRange => 2,
            ExportMode::RealTime => 3,
            ExportMode::CodeFilter => 4,
            ExportMode::Compare => 5,
        }
    }

    /// Whether the dataset template for this mode carries `[start]`/`[end]` placeholders.
    pub fn uses_dates(&self) -> bool {
        matches!(self, ExportMode::DateRange | ExportMode::TimestampRange)
    }
}

impl TryFrom<i32> for ExportMode {
    type Error = SyncError;

    fn try_from(code: i32) -> SyncResult<Self> {
        let mode = match code {
            0 => ExportMode::Full,
            1 => ExportMode::DateRange,
            2 => ExportMode::TimestampRange,
            3 => ExportMode::RealTime,
            4 => ExportMode::CodeFilter,
            5 => ExportMode::Compare,
            other => bail!(
                ErrorKind::InvalidData,
                "Unknown export mode code",
                format!("code {other} is not one of 0..=5")
            ),
        };

        Ok(mode)
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportMode::Full => "full",
            ExportMode::DateRange => "date_range",
            ExportMode::TimestampRange => "timestamp_range",
            ExportMode::RealTime => "real_time",
            ExportMode::CodeFilter => "code_filter",
            ExportMode::Compare => "compare",
        };
        f.write_str(name)
    }
}

/// What started an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Scheduled,
    Manual,
}

impl TryFrom<i32> for Trigger {
    type Error = SyncError;

    fn try_from(code: i32) -> SyncResult<Self> {
        match code {
            0 => Ok(Trigger::Scheduled),
            1 => Ok(Trigger::Manual),
            other => bail!(
                ErrorKind::InvalidData,
                "Unknown trigger code",
                format!("code {other} is not one of 0..=1")
            ),
        }
    }
}

/// A date in `YYYYMMDD` integer form where `0` selects the default date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DateParam(pub u32);

impl DateParam {
    pub const DEFAULT: DateParam = DateParam(0);

    pub fn is_default(&self) -> bool {
        self.0 == 0
    }

    /// Renders the date as eight digits, substituting `today` for the default date.
    pub fn render(&self, today: NaiveDate) -> String {
        if self.is_default() {
            return format!(
                "{:04}{:02}{:02}",
                today.year(),
                today.month(),
                today.day()
            );
        }

        let day = self.0 % 100;
        let month = (self.0 / 100) % 100;
        let year = self.0 / 10_000;
        format!("{year:04}{month:02}{day:02}")
    }
}

impl From<u32> for DateParam {
    fn from(value: u32) -> Self {
        DateParam(value)
    }
}

/// Parameters of one export invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub dataset_name: String,
    /// Target table, filled from the catalog when the request is resolved.
    pub table: Option<TableName>,
    pub start_date: DateParam,
    pub end_date: DateParam,
    /// Codes for [`ExportMode::CodeFilter`], in request order without duplicates.
    pub codes: Vec<String>,
    pub mode: ExportMode,
    pub trigger: Trigger,
}

impl QueryRequest {
    pub fn new(dataset_name: impl Into<String>, mode: ExportMode, trigger: Trigger) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            table: None,
            start_date: DateParam::DEFAULT,
            end_date: DateParam::DEFAULT,
            codes: Vec::new(),
            mode,
            trigger,
        }
    }

    pub fn with_dates(mut self, start: impl Into<DateParam>, end: impl Into<DateParam>) -> Self {
        self.start_date = start.into();
        self.end_date = end.into();
        self
    }

    /// Sets the code list, dropping empty entries and repeated codes while keeping order.
    pub fn with_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codes.clear();
        for code in codes {
            let code = code.into();
            let code = code.trim();
            if !code.is_empty() && !self.codes.iter().any(|c| c == code) {
                self.codes.push(code.to_string());
            }
        }
        self
    }

    pub fn with_table(mut self, table: TableName) -> Self {
        self.table = Some(table);
        self
    }

    /// Parses a comma-separated code list, as sent by manual triggers.
    pub fn with_code_list(self, code_list: &str) -> Self {
        self.with_codes(code_list.split(','))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_codes_round_trip() {
        for code in 0..=5 {
            assert_eq!(ExportMode::try_from(code).unwrap().code(), code);
        }
        assert_eq!(
            ExportMode::try_from(9).unwrap_err().kind(),
            ErrorKind::InvalidData
        );
    }

    #[test]
    fn default_date_renders_today() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(DateParam::DEFAULT.render(today), "20240305");
        assert_eq!(DateParam(20231231).render(today), "20231231");
    }

    #[test]
    fn code_list_is_an_ordered_set() {
        let request = QueryRequest::new("balance", ExportMode::CodeFilter, Trigger::Manual)
            .with_code_list("000002, 000001,,000002");
        assert_eq!(request.codes, vec!["000002", "000001"]);
    }
}
