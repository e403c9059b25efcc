//! Parser for `ccs` run reports.
//!
//! A report holds two blocks, each a header line followed by
//! `status,number,percent%` lines:
//!
//! ```text
//! ZMW Yield
//! Success -- CCS generated,8164,66.67%
//! Failed -- Lacking full passes,4082,33.33%
//!
//!
//! Subread Yield
//! Success - Used for CCS,135620,90.00%
//! Failed -- Lacking full passes,15069,10.00%
//! ```

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use super::ParseError;
use crate::core::table::{Column, ColumnData, Table, TableError};

const ZMW_HEADER: &str = "ZMW Yield";
const SUBREAD_HEADER: &str = "Subread Yield";

fn status_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<status>.+?),\s*(?P<number>\d+),\s*(?P<percent>\d+(?:\.\d*)?)%$")
            .unwrap_or_else(|e| unreachable!("status line regex is valid: {e}"))
    })
}

/// Which block of a report to summarize
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportType {
    Zmw,
    Subread,
}

/// One status line of a report block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub number: i64,
    pub percent: f64,
    /// `percent / 100`
    pub fraction: f64,
}

/// ZMW and subread yields of one `ccs` run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CcsReport {
    pub zmw: Vec<StatusCount>,
    pub subread: Vec<StatusCount>,
}

impl CcsReport {
    /// Parse report text.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::InvalidFormat` if either block is missing or
    /// empty, or a status line is malformed.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut report = Self::default();
        let mut current: Option<ReportType> = None;
        let mut seen = (false, false);

        for (i, line) in text.lines().enumerate() {
            let line = line.trim_end();
            match line {
                ZMW_HEADER => {
                    current = Some(ReportType::Zmw);
                    seen.0 = true;
                }
                SUBREAD_HEADER => {
                    current = Some(ReportType::Subread);
                    seen.1 = true;
                }
                "" => current = None,
                _ => {
                    let Some(kind) = current else {
                        return Err(ParseError::InvalidFormat(format!(
                            "Line {} is outside a yield block: '{line}'",
                            i + 1
                        )));
                    };
                    let count = parse_status_line(line, i + 1)?;
                    match kind {
                        ReportType::Zmw => report.zmw.push(count),
                        ReportType::Subread => report.subread.push(count),
                    }
                }
            }
        }

        for (present, rows, header) in [
            (seen.0, &report.zmw, ZMW_HEADER),
            (seen.1, &report.subread, SUBREAD_HEADER),
        ] {
            if !present || rows.is_empty() {
                return Err(ParseError::InvalidFormat(format!(
                    "Report has no '{header}' block"
                )));
            }
        }

        debug!(
            zmw = report.zmw.len(),
            subread = report.subread.len(),
            "Parsed ccs report"
        );
        Ok(report)
    }

    /// Parse a report file.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::Io` if the file cannot be read, or the errors of
    /// [`CcsReport::parse`].
    pub fn from_path(path: &Path) -> Result<Self, ParseError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    #[must_use]
    pub fn block(&self, kind: ReportType) -> &[StatusCount] {
        match kind {
            ReportType::Zmw => &self.zmw,
            ReportType::Subread => &self.subread,
        }
    }
}

fn parse_status_line(line: &str, line_num: usize) -> Result<StatusCount, ParseError> {
    let caps = status_line().captures(line).ok_or_else(|| {
        ParseError::InvalidFormat(format!("Invalid status line {line_num}: '{line}'"))
    })?;
    let number = caps["number"].parse().map_err(|_| {
        ParseError::InvalidFormat(format!("Invalid count on line {line_num}: '{line}'"))
    })?;
    let percent: f64 = caps["percent"].parse().map_err(|_| {
        ParseError::InvalidFormat(format!("Invalid percent on line {line_num}: '{line}'"))
    })?;

    Ok(StatusCount {
        status: caps["status"].trim().to_string(),
        number,
        percent,
        fraction: percent / 100.0,
    })
}

/// Combine one block from several samples' reports into one table.
///
/// Columns are `sample`, `status`, `number` and `fraction`; rows are sorted
/// by sample and then by number, both descending.
///
/// # Errors
///
/// Only fails if the assembled columns are inconsistent, which cannot happen
/// for well-formed reports.
pub fn summarize(reports: &[(String, CcsReport)], kind: ReportType) -> Result<Table, TableError> {
    let mut rows: Vec<(&str, &StatusCount)> = reports
        .iter()
        .flat_map(|(sample, report)| {
            report
                .block(kind)
                .iter()
                .map(move |count| (sample.as_str(), count))
        })
        .collect();
    rows.sort_by(|a, b| b.0.cmp(a.0).then(b.1.number.cmp(&a.1.number)));

    Table::new(vec![
        Column::new(
            "sample",
            ColumnData::Text(rows.iter().map(|(s, _)| (*s).to_string()).collect()),
        ),
        Column::new(
            "status",
            ColumnData::Text(rows.iter().map(|(_, c)| c.status.clone()).collect()),
        ),
        Column::new(
            "number",
            ColumnData::Int(rows.iter().map(|(_, c)| c.number).collect()),
        ),
        Column::new(
            "fraction",
            ColumnData::Float(rows.iter().map(|(_, c)| c.fraction).collect()),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "ZMW Yield\n\
        Success -- CCS generated,8164,66.67%\n\
        Failed -- Lacking full passes,4082,33.33%\n\
        \n\
        \n\
        Subread Yield\n\
        Success - Used for CCS,135620,90.00%\n\
        Failed -- Lacking full passes,15069,10.00%\n";

    #[test]
    fn test_parse_report() {
        let report = CcsReport::parse(REPORT).unwrap();
        assert_eq!(report.zmw.len(), 2);
        assert_eq!(report.subread.len(), 2);

        let first = &report.zmw[0];
        assert_eq!(first.status, "Success -- CCS generated");
        assert_eq!(first.number, 8164);
        assert!((first.fraction - 0.6667).abs() < 1e-9);
        assert_eq!(report.block(ReportType::Subread)[1].number, 15069);
    }

    #[test]
    fn test_missing_block() {
        let text = "ZMW Yield\nSuccess -- CCS generated,10,100.00%\n";
        assert!(matches!(
            CcsReport::parse(text),
            Err(ParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_malformed_line() {
        let text = REPORT.replace("8164,66.67%", "many,66.67%");
        assert!(matches!(
            CcsReport::parse(&text),
            Err(ParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_summarize_sorts_descending() {
        let a = CcsReport::parse(REPORT).unwrap();
        let mut b = a.clone();
        b.zmw[0].number = 10;
        b.zmw[1].number = 20;

        let table = summarize(
            &[("lib1".to_string(), a), ("lib2".to_string(), b)],
            ReportType::Zmw,
        )
        .unwrap();

        assert_eq!(table.column_names(), vec!["sample", "status", "number", "fraction"]);
        assert_eq!(table.text("sample").unwrap(), &["lib2", "lib2", "lib1", "lib1"]);
        assert_eq!(
            table.column("number").unwrap().as_ints().unwrap(),
            &[20, 10, 8164, 4082]
        );
    }

    #[test]
    fn test_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ccs_report.txt");
        std::fs::write(&path, REPORT).unwrap();
        assert_eq!(CcsReport::from_path(&path).unwrap().zmw.len(), 2);
    }
}
