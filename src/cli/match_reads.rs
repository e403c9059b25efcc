use std::path::PathBuf;

use clap::Args;
use tracing::info;

use crate::annotate::{match_seqs, MatchOptions};
use crate::cli::{count_true, load_inputs, percent, print_json, print_tsv, OutputFormat};
use crate::core::read::CCS_COLUMN;
use crate::core::table::Table;

#[derive(Args)]
pub struct MatchArgs {
    /// CCS files (SAM, BAM, FASTQ or FASTQ.gz)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Pattern to match; named groups `(?P<name>...)` become columns
    #[arg(short, long)]
    pub pattern: String,

    /// Sequence column to match against
    #[arg(long, default_value = CCS_COLUMN)]
    pub column: String,

    /// Name of the column flagging matched reads
    #[arg(long, default_value = "matched")]
    pub match_col: String,

    /// Sample name per input, in order (defaults to the file names)
    #[arg(long)]
    pub sample: Vec<String>,

    /// Do not add the polarity column
    #[arg(long)]
    pub no_polarity: bool,

    /// Do not add a column per named group
    #[arg(long)]
    pub no_groups: bool,

    /// Do not add group accuracy columns
    #[arg(long)]
    pub no_accuracy: bool,

    /// Do not add group quality columns
    #[arg(long)]
    pub no_qvals: bool,

    /// Treat ambiguous nucleotide codes as literal characters
    #[arg(long)]
    pub no_iupac: bool,

    /// Replace existing columns with the same names
    #[arg(long)]
    pub overwrite: bool,
}

impl MatchArgs {
    fn options(&self) -> MatchOptions {
        MatchOptions {
            add_polarity: !self.no_polarity,
            add_group_cols: !self.no_groups,
            add_accuracy: !self.no_accuracy,
            add_qvals: !self.no_qvals,
            expand_iupac: !self.no_iupac,
            overwrite: self.overwrite,
        }
    }
}

/// Execute match subcommand
///
/// # Errors
///
/// Returns an error if an input cannot be read, the pattern is invalid, or
/// the new columns collide with existing ones.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: MatchArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let tables = load_inputs(&args.inputs, &args.sample)?;
    let reads = Table::concat(&tables)?;

    if verbose {
        eprintln!(
            "Loaded {} reads from {} files",
            reads.n_rows(),
            args.inputs.len()
        );
    }

    let table = match_seqs(
        &reads,
        &args.pattern,
        &args.column,
        &args.match_col,
        &args.options(),
    )?;
    info!(
        reads = table.n_rows(),
        matched = count_true(&table, &args.match_col),
        "Matching complete"
    );

    match format {
        OutputFormat::Text => print_text_summary(&table, &args),
        OutputFormat::Json => print_json(&table)?,
        OutputFormat::Tsv => print_tsv(&table),
    }

    Ok(())
}

fn print_text_summary(table: &Table, args: &MatchArgs) {
    let total = table.n_rows();
    let matched = count_true(table, &args.match_col);

    println!("Pattern: {}", args.pattern);
    println!("Reads:   {total}");
    println!(
        "Matched: {matched} ({:.1}%)",
        percent(matched, total)
    );

    if let Ok(polarity) = table
        .column(&format!("{}_polarity", args.match_col))
        .and_then(|c| c.as_ints())
    {
        let forward = polarity.iter().filter(|&&p| p == 1).count();
        let reverse = polarity.iter().filter(|&&p| p == -1).count();
        println!("  forward: {forward}");
        println!("  reverse: {reverse}");
    }

    println!();
    println!("Use --format tsv or --format json for per-read columns.");
}
