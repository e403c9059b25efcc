//! Command-line interface for ccs-match.
//!
//! Available commands:
//!
//! - **match**: Match a pattern against reads in both orientations
//! - **annotate**: Run the full match-and-align pipeline
//! - **report**: Summarize `ccs` run reports across samples
//!
//! ## Usage
//!
//! ```text
//! # Flag reads carrying both termini and pull out the barcode
//! ccs-match match lib1.ccs.bam --pattern 'ACG(?P<barcode>N{3})CTT' --format tsv
//!
//! # Full pipeline against a target FASTA
//! ccs-match annotate lib1.ccs.bam lib2.ccs.bam --targets amplicons.fasta \
//!     --config layout.json --call-mutations --format json
//!
//! # Summarize ZMW yields
//! ccs-match report lib1_report.txt lib2_report.txt --sample lib1 --sample lib2
//! ```

use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, Subcommand};

use crate::core::table::Table;
use crate::parsing::reads::load_read_table;

pub mod annotate;
pub mod match_reads;
pub mod report;

#[derive(Parser)]
#[command(name = "ccs-match")]
#[command(author = "Fulcrum Genomics")]
#[command(version)]
#[command(about = "Match and align PacBio circular consensus sequences")]
#[command(
    long_about = "ccs-match checks PacBio CCS reads against an expected layout (termini, gene, spacer, UMI, barcode) on either strand.\n\nIt extracts each named region with its qualities and accuracy, aligns the gene and the whole read with minimap2, and reports:\n- Whether and in which orientation each read matched\n- Best alignment, trimming and multi-mapping counts\n- Substitutions, insertions and deletions relative to the target"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Worker threads for per-read work (defaults to all cores)
    #[arg(short, long, global = true)]
    pub threads: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Match a pattern against reads in both orientations
    Match(match_reads::MatchArgs),

    /// Match the read layout and align gene and read
    Annotate(annotate::AnnotateArgs),

    /// Summarize ccs run reports
    Report(report::ReportArgs),
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Tsv,
}

/// Load one read table per input, naming samples from `samples` or the file names.
///
/// # Errors
///
/// Returns an error if `samples` is non-empty and its length differs from
/// `inputs`, or an input cannot be read.
pub fn load_inputs(inputs: &[PathBuf], samples: &[String]) -> anyhow::Result<Vec<Table>> {
    if !samples.is_empty() && samples.len() != inputs.len() {
        bail!(
            "Got {} --sample values for {} inputs; give one per input or none",
            samples.len(),
            inputs.len()
        );
    }

    inputs
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let sample = samples.get(i).map(String::as_str);
            load_read_table(path, sample)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))
        })
        .collect()
}

/// Print every column of `table` as TSV with a header line
pub fn print_tsv(table: &Table) {
    println!("{}", table.column_names().join("\t"));
    for row in 0..table.n_rows() {
        let cells: Vec<String> = table.columns().map(|c| c.cell_text(row)).collect();
        println!("{}", cells.join("\t"));
    }
}

/// Print `table` as a JSON array of row objects
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn print_json(table: &Table) -> anyhow::Result<()> {
    let rows: Vec<serde_json::Value> = (0..table.n_rows())
        .map(|row| serde_json::Value::Object(table.row_json(row)))
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

/// Count of `true` values in a boolean column, 0 if absent
pub(crate) fn count_true(table: &Table, column: &str) -> usize {
    table
        .bools(column)
        .map(|values| values.iter().filter(|&&v| v).count())
        .unwrap_or(0)
}

#[allow(clippy::cast_precision_loss)] // Read counts are far below 2^52
pub(crate) fn percent(n: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        n as f64 * 100.0 / total as f64
    }
}
