//! Dual-orientation pattern matching.
//!
//! Each read is searched as given and, failing that, as its reverse
//! complement. When the reverse complement matches, the quality array is
//! reversed too so qualities stay aligned with the bases they describe.

use rayon::prelude::*;
use tracing::{debug, info};

use super::AnnotateError;
use crate::core::quality::accuracy;
use crate::core::read::{qvals_column, NAME_COLUMN};
use crate::core::sequence::{reverse_complement, reversed_qualities};
use crate::core::table::{Column, ColumnData, Table, TableError};
use crate::core::types::Polarity;
use crate::pattern::{Pattern, PatternMatch};
use crate::utils::validation::{ensure_column, ensure_no_collisions, ensure_unique};

/// Accuracy reported for segments of unmatched reads
pub const UNMATCHED_ACCURACY: f64 = -1.0;

/// Which columns a match adds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOptions {
    /// Add `{match}_polarity`
    pub add_polarity: bool,
    /// Add one column per named group holding its sequence
    pub add_group_cols: bool,
    /// Add `{group}_accuracy` for each named group
    pub add_accuracy: bool,
    /// Add `{group}_qvals` for each named group
    pub add_qvals: bool,
    /// Rewrite ambiguous nucleotide codes before compiling
    pub expand_iupac: bool,
    /// Replace existing columns instead of failing
    pub overwrite: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            add_polarity: true,
            add_group_cols: true,
            add_accuracy: true,
            add_qvals: true,
            expand_iupac: true,
            overwrite: false,
        }
    }
}

impl MatchOptions {
    /// Only the match flag: no polarity, no group columns
    #[must_use]
    pub fn presence_only() -> Self {
        Self {
            add_polarity: false,
            add_group_cols: false,
            ..Self::default()
        }
    }
}

/// Output column names of one call, fixed before any row is processed
struct MatchSchema {
    match_col: String,
    polarity_col: Option<String>,
    groups: Vec<String>,
    accuracy_cols: Vec<String>,
    qvals_cols: Vec<String>,
}

impl MatchSchema {
    fn new(pattern: &Pattern, match_column: &str, options: &MatchOptions) -> Self {
        let groups: Vec<String> = if options.add_group_cols {
            pattern.segments().iter().map(|s| s.name.clone()).collect()
        } else {
            Vec::new()
        };

        let suffixed = |enabled: bool, suffix: &str| -> Vec<String> {
            if enabled {
                groups.iter().map(|g| format!("{g}{suffix}")).collect()
            } else {
                Vec::new()
            }
        };
        let accuracy_cols = suffixed(options.add_accuracy, "_accuracy");
        let qvals_cols = suffixed(options.add_qvals, "_qvals");

        Self {
            match_col: match_column.to_string(),
            polarity_col: options
                .add_polarity
                .then(|| format!("{match_column}_polarity")),
            groups,
            accuracy_cols,
            qvals_cols,
        }
    }

    fn needs_qualities(&self) -> bool {
        !self.accuracy_cols.is_empty() || !self.qvals_cols.is_empty()
    }

    fn names(&self) -> Vec<String> {
        std::iter::once(self.match_col.clone())
            .chain(self.polarity_col.clone())
            .chain(self.groups.iter().cloned())
            .chain(self.accuracy_cols.iter().cloned())
            .chain(self.qvals_cols.iter().cloned())
            .collect()
    }
}

/// Extracted value of one named group
#[derive(Debug, Clone, PartialEq)]
struct SegmentValue {
    sequence: String,
    qualities: Vec<u8>,
}

/// Outcome of matching one read
#[derive(Debug, Clone, PartialEq)]
struct RowMatch {
    polarity: Polarity,
    segments: Vec<SegmentValue>,
}

impl RowMatch {
    fn segment(&self, index: usize) -> Option<&SegmentValue> {
        self.segments.get(index)
    }
}

/// Match `pattern` against `source_column` of every row.
///
/// Compiles the pattern (expanding IUPAC codes unless disabled) and
/// delegates to [`match_pattern`].
///
/// # Errors
///
/// Returns an error if the pattern does not compile or for any of the
/// conditions listed on [`match_pattern`].
pub fn match_seqs(
    table: &Table,
    pattern: &str,
    source_column: &str,
    match_column: &str,
    options: &MatchOptions,
) -> Result<Table, AnnotateError> {
    let pattern = if options.expand_iupac {
        Pattern::compile_iupac(pattern)?
    } else {
        Pattern::compile(pattern)?
    };
    match_pattern(table, &pattern, source_column, match_column, options)
}

/// Match a compiled pattern against `source_column` of every row.
///
/// Adds, in order: `match_column` (bool), `{match_column}_polarity` (1, -1
/// or 0), then one text column per named group, then `{group}_accuracy`
/// for each group, then `{group}_qvals` for each group.
///
/// # Errors
///
/// Returns `TableError::MissingColumn` if the source column is absent, or
/// if accuracy or quality columns are requested and `{source_column}_qvals`
/// is absent. Returns `TableError::ColumnCollision` if an output column
/// exists and `overwrite` is off, `TableError::DuplicateId` if the table
/// has a read name column with a repeated value, and
/// `TableError::LengthMismatch` if a read's qualities do not cover its
/// sequence.
pub fn match_pattern(
    table: &Table,
    pattern: &Pattern,
    source_column: &str,
    match_column: &str,
    options: &MatchOptions,
) -> Result<Table, AnnotateError> {
    let schema = MatchSchema::new(pattern, match_column, options);
    let sequences = table.text(source_column)?;

    let qualities = if schema.needs_qualities() {
        let qvals = qvals_column(source_column);
        ensure_column(table, &qvals)?;
        Some(table.qualities(&qvals)?)
    } else {
        None
    };

    if table.has_column(NAME_COLUMN) {
        ensure_unique(table, NAME_COLUMN)?;
    }
    ensure_no_collisions(table, &schema.names(), options.overwrite)?;

    debug!(
        pattern = pattern.as_str(),
        column = source_column,
        rows = table.n_rows(),
        "Matching pattern"
    );

    let matches = sequences
        .par_iter()
        .enumerate()
        .map(|(row, sequence)| {
            let quals = qualities.map(|q| q[row].as_slice());
            match_row(pattern, row, sequence, quals)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let n_forward = matches
        .iter()
        .filter(|m| m.polarity == Polarity::Forward)
        .count();
    let n_reverse = matches
        .iter()
        .filter(|m| m.polarity == Polarity::Reverse)
        .count();
    info!(
        column = match_column,
        rows = matches.len(),
        forward = n_forward,
        reverse = n_reverse,
        "Matched reads"
    );

    let columns = build_columns(&schema, &matches);
    Ok(table.with_columns(columns, options.overwrite)?)
}

/// Match one read, falling back to its reverse complement
fn match_row(
    pattern: &Pattern,
    row: usize,
    sequence: &str,
    qualities: Option<&[u8]>,
) -> Result<RowMatch, TableError> {
    if let Some(q) = qualities {
        if q.len() != sequence.len() {
            return Err(TableError::LengthMismatch {
                id: format!("row {row}"),
                sequence: sequence.len(),
                qualities: q.len(),
            });
        }
    }

    if let Some(m) = pattern.search(sequence.as_bytes()) {
        return Ok(extract(&m, sequence, qualities, Polarity::Forward));
    }

    let rc = reverse_complement(sequence);
    if let Some(m) = pattern.search(rc.as_bytes()) {
        let reversed = qualities.map(reversed_qualities);
        return Ok(extract(&m, &rc, reversed.as_deref(), Polarity::Reverse));
    }

    Ok(RowMatch {
        polarity: Polarity::Unmatched,
        segments: Vec::new(),
    })
}

fn extract(
    m: &PatternMatch,
    sequence: &str,
    qualities: Option<&[u8]>,
    polarity: Polarity,
) -> RowMatch {
    let bytes = sequence.as_bytes();
    let segments = m
        .groups
        .iter()
        .map(|span| match span {
            Some(span) => SegmentValue {
                sequence: String::from_utf8_lossy(&bytes[span.clone()]).into_owned(),
                qualities: qualities.map_or_else(Vec::new, |q| q[span.clone()].to_vec()),
            },
            None => SegmentValue {
                sequence: String::new(),
                qualities: Vec::new(),
            },
        })
        .collect();

    RowMatch { polarity, segments }
}

fn build_columns(schema: &MatchSchema, matches: &[RowMatch]) -> Vec<Column> {
    let mut columns = vec![Column::new(
        schema.match_col.clone(),
        ColumnData::Bool(matches.iter().map(|m| m.polarity.is_match()).collect()),
    )];

    if let Some(name) = &schema.polarity_col {
        columns.push(Column::new(
            name.clone(),
            ColumnData::Int(matches.iter().map(|m| m.polarity.as_i64()).collect()),
        ));
    }

    for (g, name) in schema.groups.iter().enumerate() {
        columns.push(Column::new(
            name.clone(),
            ColumnData::Text(
                matches
                    .iter()
                    .map(|m| m.segment(g).map_or_else(String::new, |s| s.sequence.clone()))
                    .collect(),
            ),
        ));
    }

    for (g, name) in schema.accuracy_cols.iter().enumerate() {
        columns.push(Column::new(
            name.clone(),
            ColumnData::Float(
                matches
                    .iter()
                    .map(|m| {
                        if m.polarity.is_match() {
                            m.segment(g).map_or(f64::NAN, |s| accuracy(&s.qualities))
                        } else {
                            UNMATCHED_ACCURACY
                        }
                    })
                    .collect(),
            ),
        ));
    }

    for (g, name) in schema.qvals_cols.iter().enumerate() {
        columns.push(Column::new(
            name.clone(),
            ColumnData::Qualities(
                matches
                    .iter()
                    .map(|m| m.segment(g).map_or_else(Vec::new, |s| s.qualities.clone()))
                    .collect(),
            ),
        ));
    }

    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::quality::decode_sanger;
    use crate::core::read::{reads_to_table, Read};

    const BARCODE_PATTERN: &str = "ACG(?P<barcode>N{3})(?P<read>N+)CTT";

    fn read(id: &str, sequence: &str, qualities: &str) -> Read {
        Read {
            id: id.to_string(),
            sample: "sample".to_string(),
            sequence: sequence.to_string(),
            qualities: decode_sanger(qualities),
            passes: None,
            accuracy: None,
        }
    }

    /// Forward, reverse-complement and unmatched reads built from one template
    fn scenario_table() -> Table {
        let forward = format!("T{}{}{}{}A", "ACG", "TTC", "ACG", "CTT");
        let template = format!("T{}{}{}{}A", "ACG", "AGA", "GCA", "CTT");
        let reversed = reverse_complement(&template);
        let reversed_quals: String = format!("{}5?9{}", "?".repeat(4), "?".repeat(7))
            .chars()
            .rev()
            .collect();

        reads_to_table(vec![
            read("fwd", &forward, &"?".repeat(forward.len())),
            read("rev", &reversed, &reversed_quals),
            read("none", "GGGCATGCACTT", &"?".repeat(12)),
        ])
        .unwrap()
    }

    fn text<'a>(table: &'a Table, column: &str) -> &'a [String] {
        table.text(column).unwrap()
    }

    #[test]
    fn test_forward_reverse_and_unmatched() {
        let table = scenario_table();
        let out = match_seqs(&table, BARCODE_PATTERN, "CCS", "barcoded", &MatchOptions::default())
            .unwrap();

        assert_eq!(out.bools("barcoded").unwrap(), &[true, true, false]);
        assert_eq!(
            out.column("barcoded_polarity").unwrap().as_ints().unwrap(),
            &[1, -1, 0]
        );
        assert_eq!(text(&out, "barcode"), &["TTC", "AGA", ""]);
        assert_eq!(text(&out, "read"), &["ACG", "GCA", ""]);

        let acc = out.column("barcode_accuracy").unwrap().as_floats().unwrap();
        assert!((acc[0] - 0.999).abs() < 1e-4);
        assert!((acc[1] - 0.995).abs() < 1e-3);
        assert!((acc[2] - UNMATCHED_ACCURACY).abs() < f64::EPSILON);

        let qvals = out.qualities("barcode_qvals").unwrap();
        assert_eq!(qvals[1], vec![20, 30, 24]);
        assert!(qvals[2].is_empty());
    }

    #[test]
    fn test_column_order() {
        let table = scenario_table();
        let out = match_seqs(&table, BARCODE_PATTERN, "CCS", "barcoded", &MatchOptions::default())
            .unwrap();
        let names = out.column_names();
        assert_eq!(
            &names[table.n_columns()..],
            &[
                "barcoded",
                "barcoded_polarity",
                "barcode",
                "read",
                "barcode_accuracy",
                "read_accuracy",
                "barcode_qvals",
                "read_qvals"
            ]
        );
    }

    #[test]
    fn test_segments_reproduce_matched_span() {
        let table = scenario_table();
        let out = match_seqs(&table, BARCODE_PATTERN, "CCS", "barcoded", &MatchOptions::default())
            .unwrap();

        let ccs = text(&out, "CCS");
        let barcode = text(&out, "barcode");
        let read = text(&out, "read");

        assert!(ccs[0].contains(&format!("ACG{}{}CTT", barcode[0], read[0])));
        let rc = reverse_complement(&ccs[1]);
        assert!(rc.contains(&format!("ACG{}{}CTT", barcode[1], read[1])));
    }

    #[test]
    fn test_presence_only() {
        let table = scenario_table();
        let out = match_seqs(&table, "ACG", "CCS", "has_termini5", &MatchOptions::presence_only())
            .unwrap();
        assert_eq!(out.n_columns(), table.n_columns() + 1);
        assert_eq!(out.bools("has_termini5").unwrap(), &[true, true, false]);
    }

    #[test]
    fn test_collision_and_overwrite() {
        let table = scenario_table();
        let options = MatchOptions::default();
        let once = match_seqs(&table, BARCODE_PATTERN, "CCS", "barcoded", &options).unwrap();

        let err = match_seqs(&once, BARCODE_PATTERN, "CCS", "barcoded", &options).unwrap_err();
        assert!(matches!(err, AnnotateError::Table(TableError::ColumnCollision(_))));

        let overwrite = MatchOptions {
            overwrite: true,
            ..MatchOptions::default()
        };
        let twice = match_seqs(&once, BARCODE_PATTERN, "CCS", "barcoded", &overwrite).unwrap();
        assert_eq!(twice.n_columns(), once.n_columns());
        assert_eq!(text(&twice, "barcode"), text(&once, "barcode"));
    }

    #[test]
    fn test_idempotent() {
        let table = scenario_table();
        let options = MatchOptions::default();
        let a = match_seqs(&table, BARCODE_PATTERN, "CCS", "barcoded", &options).unwrap();
        let b = match_seqs(&table, BARCODE_PATTERN, "CCS", "barcoded", &options).unwrap();
        for row in 0..a.n_rows() {
            assert_eq!(a.row_json(row), b.row_json(row));
        }
    }

    #[test]
    fn test_missing_qvals_column() {
        let table = scenario_table();
        let sequences_only = Table::new(vec![table.column("CCS").unwrap().clone()]).unwrap();

        let err = match_seqs(
            &sequences_only,
            BARCODE_PATTERN,
            "CCS",
            "barcoded",
            &MatchOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnnotateError::Table(TableError::MissingColumn(c)) if c == "CCS_qvals"));

        let no_quals = MatchOptions {
            add_accuracy: false,
            add_qvals: false,
            ..MatchOptions::default()
        };
        let out = match_seqs(&sequences_only, BARCODE_PATTERN, "CCS", "barcoded", &no_quals).unwrap();
        assert_eq!(text(&out, "barcode"), &["TTC", "AGA", ""]);
    }

    #[test]
    fn test_duplicate_group_names() {
        let table = scenario_table();
        let err = match_seqs(
            &table,
            "(?P<x>ACG)(?P<x>N)",
            "CCS",
            "m",
            &MatchOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnnotateError::Pattern(_)));
    }

    #[test]
    fn test_source_table_unchanged() {
        let table = scenario_table();
        let before = table.column_names().len();
        let _ = match_seqs(&table, BARCODE_PATTERN, "CCS", "barcoded", &MatchOptions::default())
            .unwrap();
        assert_eq!(table.column_names().len(), before);
    }

    #[test]
    fn test_duplicate_read_names_rejected() {
        let first = reads_to_table(vec![read("r1", "ACGTTCACGCTT", &"?".repeat(12))]).unwrap();
        let second = first.clone();
        let table = Table::concat(&[first, second]).unwrap();

        let err = match_seqs(&table, BARCODE_PATTERN, "CCS", "barcoded", &MatchOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            AnnotateError::Table(TableError::DuplicateId { ref value, .. }) if value == "r1"
        ));
    }
}
