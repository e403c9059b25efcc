//! Match-and-align pipeline for CCS reads.
//!
//! The pipeline is a fixed composition of the two annotators:
//!
//! 1. Match the full read layout (`termini5`, `gene`, `spacer`, `UMI`,
//!    `barcode`, `termini3`) into the `barcoded` columns.
//! 2. Check the termini and spacer on their own (`has_termini5`,
//!    `has_termini3`, `has_spacer`).
//! 3. Align the extracted gene (`gene_aligned` columns), running any
//!    configured variant and mutation callers.
//! 4. Align the whole read in both orientations and keep the forward
//!    alignment when both align (`CCS_aligned` columns).
//! 5. Optionally reverse complement the barcode and UMI.

use std::path::PathBuf;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::align_seqs::{align_seqs, AlignHooks, AlignOptions};
use super::match_seqs::{match_seqs, MatchOptions};
use super::AnnotateError;
use crate::align::Mapper;
use crate::core::read::{qvals_column, CCS_COLUMN};
use crate::core::sequence::{reverse_complement, reversed_qualities};
use crate::core::table::{Column, ColumnData, Table};

pub const BARCODED_COLUMN: &str = "barcoded";
pub const GENE_GROUP: &str = "gene";
pub const GENE_ALIGNED_COLUMN: &str = "gene_aligned";
pub const UMI_GROUP: &str = "UMI";
pub const BARCODE_GROUP: &str = "barcode";
pub const CCS_ALIGNED_COLUMN: &str = "CCS_aligned";

const CCS_FOR_ALIGNED: &str = "CCS_for_aligned";
const CCS_REV: &str = "CCS_rev";
const CCS_REV_ALIGNED: &str = "CCS_rev_aligned";

fn default_rc_barcode_umi() -> bool {
    true
}

/// Pattern fragments describing the expected read layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub termini5: Option<String>,
    pub gene: String,
    #[serde(default)]
    pub spacer: Option<String>,
    #[serde(default)]
    pub umi: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub termini3: Option<String>,
    /// Reverse complement the barcode and UMI after matching
    #[serde(default = "default_rc_barcode_umi")]
    pub rc_barcode_umi: bool,
}

impl PipelineConfig {
    pub fn new(gene: impl Into<String>) -> Self {
        Self {
            termini5: None,
            gene: gene.into(),
            spacer: None,
            umi: None,
            barcode: None,
            termini3: None,
            rc_barcode_umi: true,
        }
    }

    /// Parse a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or `gene` is missing.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The configured layout as `(group name, fragment)` pairs in read order
    #[must_use]
    pub fn segments(&self) -> Vec<(&'static str, &str)> {
        [
            ("termini5", self.termini5.as_deref()),
            (GENE_GROUP, Some(self.gene.as_str())),
            ("spacer", self.spacer.as_deref()),
            (UMI_GROUP, self.umi.as_deref()),
            (BARCODE_GROUP, self.barcode.as_deref()),
            ("termini3", self.termini3.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, fragment)| fragment.map(|f| (name, f)))
        .collect()
    }

    /// Full layout pattern with one named group per configured fragment
    ///
    /// # Examples
    ///
    /// ```
    /// use ccs_match::annotate::PipelineConfig;
    ///
    /// let mut config = PipelineConfig::new("N+");
    /// config.termini5 = Some("ACG".to_string());
    /// config.barcode = Some("N{4}".to_string());
    /// assert_eq!(
    ///     config.match_pattern(),
    ///     "(?P<termini5>ACG)(?P<gene>N+)(?P<barcode>N{4})"
    /// );
    /// ```
    #[must_use]
    pub fn match_pattern(&self) -> String {
        self.segments()
            .into_iter()
            .map(|(name, fragment)| format!("(?P<{name}>{fragment})"))
            .collect()
    }

    /// Fragments checked on their own, with the column each check adds
    fn presence_checks(&self) -> Vec<(&str, String)> {
        [
            (self.termini5.as_deref(), "has_termini5"),
            (self.termini3.as_deref(), "has_termini3"),
            (self.spacer.as_deref(), "has_spacer"),
        ]
        .into_iter()
        .filter_map(|(fragment, column)| fragment.map(|f| (f, column.to_string())))
        .collect()
    }
}

/// Runs the match-and-align pipeline against one mapper
pub struct Pipeline<'a> {
    mapper: &'a dyn Mapper,
    config: PipelineConfig,
    hooks: AlignHooks<'a>,
    gene_paf: Option<PathBuf>,
}

impl<'a> Pipeline<'a> {
    pub fn new(mapper: &'a dyn Mapper, config: PipelineConfig) -> Self {
        Self {
            mapper,
            config,
            hooks: AlignHooks::default(),
            gene_paf: None,
        }
    }

    /// Variant and mutation callers for the gene alignment
    #[must_use]
    pub fn with_hooks(mut self, hooks: AlignHooks<'a>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Keep the raw aligner output of the gene alignment
    #[must_use]
    pub fn with_gene_paf(mut self, path: impl Into<PathBuf>) -> Self {
        self.gene_paf = Some(path.into());
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Concatenate the read tables and annotate them.
    ///
    /// # Errors
    ///
    /// Returns `TableError::SchemaMismatch` if the tables differ in columns,
    /// and any error raised by the matching or alignment stages.
    pub fn run(&self, tables: &[Table]) -> Result<Table, AnnotateError> {
        let reads = Table::concat(tables)?;
        info!(
            tables = tables.len(),
            reads = reads.n_rows(),
            pattern = %self.config.match_pattern(),
            "Running pipeline"
        );

        let mut table = match_seqs(
            &reads,
            &self.config.match_pattern(),
            CCS_COLUMN,
            BARCODED_COLUMN,
            &MatchOptions::default(),
        )?;

        for (fragment, column) in self.config.presence_checks() {
            table = match_seqs(
                &table,
                fragment,
                CCS_COLUMN,
                &column,
                &MatchOptions::presence_only(),
            )?;
        }

        let gene_options = AlignOptions {
            paf_file: self.gene_paf.clone(),
            ..AlignOptions::default()
        };
        table = align_seqs(
            &table,
            self.mapper,
            GENE_GROUP,
            GENE_ALIGNED_COLUMN,
            &gene_options,
            self.hooks,
        )?;

        table = self.align_both_orientations(&table)?;

        if self.config.rc_barcode_umi {
            if self.config.barcode.is_some() {
                table = reverse_complement_segment(&table, BARCODE_GROUP)?;
            }
            if self.config.umi.is_some() {
                table = reverse_complement_segment(&table, UMI_GROUP)?;
            }
        }

        Ok(table)
    }

    /// Align the read as given and reverse complemented, adding only
    /// `CCS_aligned`, `CCS_aligned_alignment` and `CCS_aligned_target`
    fn align_both_orientations(&self, table: &Table) -> Result<Table, AnnotateError> {
        let options = AlignOptions::default();
        let hooks = AlignHooks::default();

        let forward = align_seqs(table, self.mapper, CCS_COLUMN, CCS_FOR_ALIGNED, &options, hooks)?;
        let reversed: Vec<String> = table
            .text(CCS_COLUMN)?
            .par_iter()
            .map(|s| reverse_complement(s))
            .collect();
        let forward = forward.with_columns(
            vec![Column::new(CCS_REV, ColumnData::Text(reversed))],
            true,
        )?;
        let both = align_seqs(&forward, self.mapper, CCS_REV, CCS_REV_ALIGNED, &options, hooks)?;

        let for_aligned = both.bools(CCS_FOR_ALIGNED)?;
        let for_alignment = both.alignments(&format!("{CCS_FOR_ALIGNED}_alignment"))?;
        let rev_alignment = both.alignments(&format!("{CCS_REV_ALIGNED}_alignment"))?;

        let best: Vec<_> = for_aligned
            .iter()
            .zip(for_alignment.iter().zip(rev_alignment))
            .map(|(&fwd, (f, r))| if fwd { f.clone() } else { r.clone() })
            .collect();
        let aligned: Vec<bool> = best.iter().map(Option::is_some).collect();
        let targets: Vec<String> = best
            .iter()
            .map(|a| a.as_ref().map_or_else(String::new, |a| a.target.clone()))
            .collect();

        Ok(table.with_columns(
            vec![
                Column::new(CCS_ALIGNED_COLUMN, ColumnData::Bool(aligned)),
                Column::new(
                    format!("{CCS_ALIGNED_COLUMN}_alignment"),
                    ColumnData::Alignment(best),
                ),
                Column::new(
                    format!("{CCS_ALIGNED_COLUMN}_target"),
                    ColumnData::Text(targets),
                ),
            ],
            true,
        )?)
    }
}

/// Reverse complement a segment column in place, with its qualities
fn reverse_complement_segment(table: &Table, group: &str) -> Result<Table, AnnotateError> {
    let values: Vec<String> = table.text(group)?.iter().map(|s| reverse_complement(s)).collect();
    let mut table = table.replace_column(Column::new(group, ColumnData::Text(values)))?;

    let qvals = qvals_column(group);
    if table.has_column(&qvals) {
        let reversed: Vec<Vec<u8>> = table
            .qualities(&qvals)?
            .iter()
            .map(|q| reversed_qualities(q))
            .collect();
        table = table.replace_column(Column::new(qvals, ColumnData::Qualities(reversed)))?;
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::testing::{alignment, StaticMapper};
    use crate::core::read::{reads_to_table, Read};
    use crate::core::table::TableError;

    const TERMINI5: &str = "ACGT";
    const GENE: &str = "GGGGCCCCAAAATTTT";
    const SPACER: &str = "CA";
    const UMI: &str = "TTAG";
    const BARCODE: &str = "ACCG";
    const TERMINI3: &str = "TGCA";

    fn config() -> PipelineConfig {
        PipelineConfig {
            termini5: Some(TERMINI5.to_string()),
            gene: "N+".to_string(),
            spacer: Some(SPACER.to_string()),
            umi: Some("N{4}".to_string()),
            barcode: Some("N{4}".to_string()),
            termini3: Some(TERMINI3.to_string()),
            rc_barcode_umi: true,
        }
    }

    fn read(id: &str, sequence: String) -> Read {
        let mut qualities = vec![30; sequence.len()];
        if let Some(q) = qualities.first_mut() {
            *q = 10;
        }
        Read {
            id: id.to_string(),
            sample: "lib1".to_string(),
            sequence,
            qualities,
            passes: Some(5),
            accuracy: None,
        }
    }

    fn full_read() -> String {
        format!("{TERMINI5}{GENE}{SPACER}{UMI}{BARCODE}{TERMINI3}")
    }

    fn mapper() -> StaticMapper {
        StaticMapper::default()
            .with(GENE, alignment("geneA", GENE.len()))
            .with(&full_read(), alignment("ccs_target", full_read().len()))
    }

    fn reads() -> Table {
        reads_to_table(vec![
            read("forward", full_read()),
            read("reverse", reverse_complement(&full_read())),
            read("junk", "GGGGGGGGGGGG".to_string()),
        ])
        .unwrap()
    }

    #[test]
    fn test_match_pattern() {
        assert_eq!(
            config().match_pattern(),
            "(?P<termini5>ACGT)(?P<gene>N+)(?P<spacer>CA)(?P<UMI>N{4})(?P<barcode>N{4})(?P<termini3>TGCA)"
        );
        assert_eq!(PipelineConfig::new("N+").match_pattern(), "(?P<gene>N+)");
    }

    #[test]
    fn test_config_from_json() {
        let config = PipelineConfig::from_json(r#"{"gene": "N+", "barcode": "N{4}"}"#).unwrap();
        assert_eq!(config.gene, "N+");
        assert_eq!(config.barcode.as_deref(), Some("N{4}"));
        assert!(config.termini5.is_none());
        assert!(config.rc_barcode_umi);

        assert!(PipelineConfig::from_json(r#"{"barcode": "N{4}"}"#).is_err());
    }

    #[test]
    fn test_pipeline() {
        let mapper = mapper();
        let out = Pipeline::new(&mapper, config()).run(&[reads()]).unwrap();

        assert_eq!(out.bools("barcoded").unwrap(), &[true, true, false]);
        assert_eq!(
            out.column("barcoded_polarity").unwrap().as_ints().unwrap(),
            &[1, -1, 0]
        );
        assert_eq!(out.text("gene").unwrap(), &[GENE, GENE, ""]);
        assert_eq!(out.bools("has_termini5").unwrap(), &[true, true, false]);
        assert_eq!(out.bools("has_termini3").unwrap(), &[true, true, false]);
        assert_eq!(out.bools("has_spacer").unwrap(), &[true, true, false]);

        assert_eq!(out.bools("gene_aligned").unwrap(), &[true, true, false]);
        assert_eq!(out.text("gene_aligned_target").unwrap(), &["geneA", "geneA", ""]);

        // The reverse read aligns through its reverse complement
        assert_eq!(out.bools("CCS_aligned").unwrap(), &[true, true, false]);
        assert_eq!(
            out.text("CCS_aligned_target").unwrap(),
            &["ccs_target", "ccs_target", ""]
        );
        assert!(!out.has_column("CCS_rev"));
        assert!(!out.has_column("CCS_for_aligned"));

        // Barcode and UMI are reverse complemented, qualities reversed
        let barcode_rc = reverse_complement(BARCODE);
        assert_eq!(out.text("barcode").unwrap(), &[barcode_rc.as_str(), barcode_rc.as_str(), ""]);
        assert_eq!(out.text("UMI").unwrap()[0], reverse_complement(UMI));
        assert_eq!(out.qualities("barcode_qvals").unwrap()[0], vec![30; 4]);

        // Accuracy is orientation independent
        let acc = out.column("barcode_accuracy").unwrap().as_floats().unwrap();
        assert!((acc[0] - 0.999).abs() < 1e-9);
        assert!((acc[2] + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reverse_read_keeps_reversed_qualities() {
        let mapper = mapper();
        let out = Pipeline::new(&mapper, config()).run(&[reads()]).unwrap();

        // The low-quality first base of the reverse read ends up as the last
        // base of termini3 once the read is reverse complemented
        let termini3_q = out.qualities("termini3_qvals").unwrap();
        assert_eq!(termini3_q[1], vec![30, 30, 30, 10]);
        assert_eq!(termini3_q[0], vec![30; 4]);
    }

    #[test]
    fn test_gene_paf_and_hooks() {
        use crate::align::mutations::CsMutationCaller;

        let mapper = mapper();
        let dir = tempfile::tempdir().unwrap();
        let out = Pipeline::new(&mapper, config())
            .with_hooks(AlignHooks {
                mutations: Some(&CsMutationCaller),
                ..AlignHooks::default()
            })
            .with_gene_paf(dir.path().join("gene.paf"))
            .run(&[reads()])
            .unwrap();

        assert!(out.has_column("gene_aligned_substitutions"));
        assert!(!out.has_column("CCS_aligned_substitutions"));
    }

    #[test]
    fn test_concatenates_matching_tables() {
        let mapper = mapper();
        let first = reads_to_table(vec![read("a", full_read())]).unwrap();
        let second = reads_to_table(vec![read("b", full_read())]).unwrap();

        let out = Pipeline::new(&mapper, config()).run(&[first, second]).unwrap();
        assert_eq!(out.text("name").unwrap(), &["a", "b"]);
        assert_eq!(out.bools("barcoded").unwrap(), &[true, true]);
    }

    #[test]
    fn test_mismatched_tables_are_fatal() {
        let mapper = mapper();
        let first = reads_to_table(vec![read("a", full_read())]).unwrap();
        let second = first
            .with_columns(
                vec![Column::new("extra", ColumnData::Int(vec![1]))],
                false,
            )
            .unwrap();

        let err = Pipeline::new(&mapper, config()).run(&[first, second]).unwrap_err();
        assert!(matches!(err, AnnotateError::Table(TableError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_duplicate_names_across_tables_are_fatal() {
        let mapper = mapper();
        let first = reads_to_table(vec![read("a", full_read())]).unwrap();
        let second = reads_to_table(vec![read("a", full_read())]).unwrap();

        let err = Pipeline::new(&mapper, config()).run(&[first, second]).unwrap_err();
        assert!(matches!(err, AnnotateError::Table(TableError::DuplicateId { .. })));
    }
}
