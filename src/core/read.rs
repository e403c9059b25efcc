//! CCS reads and the read table built from them.

use std::collections::HashSet;

use crate::core::quality::accuracy;
use crate::core::table::{Column, ColumnData, Table, TableError};

/// Unique read identifier column
pub const NAME_COLUMN: &str = "name";
pub const SAMPLE_COLUMN: &str = "samplename";
/// Read sequence column
pub const CCS_COLUMN: &str = "CCS";
pub const PASSES_COLUMN: &str = "passes";
pub const CCS_ACCURACY_COLUMN: &str = "CCS_accuracy";
pub const CCS_LENGTH_COLUMN: &str = "CCS_length";

/// Suffix naming the per-base quality column of a sequence column
pub const QVALS_SUFFIX: &str = "_qvals";

/// Name of the quality column belonging to sequence column `column`
#[must_use]
pub fn qvals_column(column: &str) -> String {
    format!("{column}{QVALS_SUFFIX}")
}

/// One circular consensus read
#[derive(Debug, Clone, PartialEq)]
pub struct Read {
    pub id: String,
    pub sample: String,
    pub sequence: String,
    /// Numeric Phred scores, one per base
    pub qualities: Vec<u8>,
    /// Number of subread passes, if the source records it
    pub passes: Option<i64>,
    /// Read-level accuracy reported by the caller, if any
    pub accuracy: Option<f64>,
}

impl Read {
    /// Read-level accuracy, falling back to the mean of the base qualities
    #[must_use]
    pub fn read_accuracy(&self) -> f64 {
        self.accuracy.unwrap_or_else(|| accuracy(&self.qualities))
    }
}

/// Build the read table.
///
/// Columns: `name`, `samplename`, `CCS`, `CCS_qvals`, `passes` (`-1` when
/// unknown), `CCS_accuracy` and `CCS_length`.
///
/// # Errors
///
/// Returns `TableError::DuplicateId` if two reads share an id and
/// `TableError::LengthMismatch` if a read's sequence and qualities differ in
/// length.
pub fn reads_to_table(reads: Vec<Read>) -> Result<Table, TableError> {
    let mut seen = HashSet::with_capacity(reads.len());
    for read in &reads {
        if read.sequence.len() != read.qualities.len() {
            return Err(TableError::LengthMismatch {
                id: read.id.clone(),
                sequence: read.sequence.len(),
                qualities: read.qualities.len(),
            });
        }
        if !seen.insert(read.id.as_str()) {
            return Err(TableError::DuplicateId {
                column: NAME_COLUMN.to_string(),
                value: read.id.clone(),
            });
        }
    }

    let n = reads.len();
    let mut names = Vec::with_capacity(n);
    let mut samples = Vec::with_capacity(n);
    let mut sequences = Vec::with_capacity(n);
    let mut qualities = Vec::with_capacity(n);
    let mut passes = Vec::with_capacity(n);
    let mut accuracies = Vec::with_capacity(n);
    let mut lengths = Vec::with_capacity(n);

    for read in reads {
        accuracies.push(read.read_accuracy());
        passes.push(read.passes.unwrap_or(-1));
        lengths.push(i64::try_from(read.sequence.len()).unwrap_or(i64::MAX));
        names.push(read.id);
        samples.push(read.sample);
        sequences.push(read.sequence);
        qualities.push(read.qualities);
    }

    Table::new(vec![
        Column::new(NAME_COLUMN, ColumnData::Text(names)),
        Column::new(SAMPLE_COLUMN, ColumnData::Text(samples)),
        Column::new(CCS_COLUMN, ColumnData::Text(sequences)),
        Column::new(qvals_column(CCS_COLUMN), ColumnData::Qualities(qualities)),
        Column::new(PASSES_COLUMN, ColumnData::Int(passes)),
        Column::new(CCS_ACCURACY_COLUMN, ColumnData::Float(accuracies)),
        Column::new(CCS_LENGTH_COLUMN, ColumnData::Int(lengths)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(id: &str, sequence: &str, q: u8) -> Read {
        Read {
            id: id.to_string(),
            sample: "s1".to_string(),
            sequence: sequence.to_string(),
            qualities: vec![q; sequence.len()],
            passes: None,
            accuracy: None,
        }
    }

    #[test]
    fn test_reads_to_table() {
        let mut first = read("r1", "ACGT", 30);
        first.passes = Some(12);
        first.accuracy = Some(0.999);

        let table = reads_to_table(vec![first, read("r2", "GG", 20)]).unwrap();
        assert_eq!(
            table.column_names(),
            vec!["name", "samplename", "CCS", "CCS_qvals", "passes", "CCS_accuracy", "CCS_length"]
        );
        assert_eq!(table.column("passes").unwrap().as_ints().unwrap(), &[12, -1]);
        assert_eq!(table.column("CCS_length").unwrap().as_ints().unwrap(), &[4, 2]);

        let acc = table.column("CCS_accuracy").unwrap().as_floats().unwrap();
        assert!((acc[0] - 0.999).abs() < 1e-12);
        assert!((acc[1] - 0.99).abs() < 1e-12);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = reads_to_table(vec![read("r1", "A", 30), read("r1", "C", 30)]).unwrap_err();
        assert!(matches!(err, TableError::DuplicateId { value, .. } if value == "r1"));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut bad = read("r1", "ACGT", 30);
        bad.qualities.pop();
        assert!(matches!(
            reads_to_table(vec![bad]),
            Err(TableError::LengthMismatch { sequence: 4, qualities: 3, .. })
        ));
    }

    #[test]
    fn test_qvals_column() {
        assert_eq!(qvals_column("CCS"), "CCS_qvals");
        assert_eq!(qvals_column("gene"), "gene_qvals");
    }
}
