use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Args;

use crate::cli::{print_json, print_tsv, OutputFormat};
use crate::core::table::Table;
use crate::parsing::reads::sample_from_path;
use crate::parsing::report::{summarize, CcsReport, ReportType};

#[derive(Args)]
pub struct ReportArgs {
    /// Report files written by ccs
    #[arg(required = true)]
    pub reports: Vec<PathBuf>,

    /// Sample name per report, in order (defaults to the file names)
    #[arg(long)]
    pub sample: Vec<String>,

    /// Which yield block to summarize
    #[arg(long = "type", value_enum, default_value = "zmw")]
    pub report_type: ReportType,
}

/// Execute report subcommand
///
/// # Errors
///
/// Returns an error if a report cannot be read or parsed.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: ReportArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    if !args.sample.is_empty() && args.sample.len() != args.reports.len() {
        bail!(
            "Got {} --sample values for {} reports; give one per report or none",
            args.sample.len(),
            args.reports.len()
        );
    }

    let reports = args
        .reports
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let sample = args
                .sample
                .get(i)
                .cloned()
                .unwrap_or_else(|| sample_from_path(path));
            let report = CcsReport::from_path(path)
                .with_context(|| format!("Failed to parse report {}", path.display()))?;
            Ok((sample, report))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    if verbose {
        eprintln!("Parsed {} reports", reports.len());
    }

    let table = summarize(&reports, args.report_type)?;

    match format {
        OutputFormat::Text => print_text(&table)?,
        OutputFormat::Json => print_json(&table)?,
        OutputFormat::Tsv => print_tsv(&table),
    }

    Ok(())
}

fn print_text(table: &Table) -> anyhow::Result<()> {
    let samples = table.text("sample")?;
    let statuses = table.text("status")?;
    let numbers = table.column("number")?.as_ints()?;
    let fractions = table.column("fraction")?.as_floats()?;

    let sample_width = samples.iter().map(String::len).max().unwrap_or(0).max(6);
    let status_width = statuses.iter().map(String::len).max().unwrap_or(0).max(6);

    println!(
        "{:<sample_width$}  {:<status_width$}  {:>10}  {:>8}",
        "Sample", "Status", "Number", "Percent"
    );
    for i in 0..table.n_rows() {
        println!(
            "{:<sample_width$}  {:<status_width$}  {:>10}  {:>7.2}%",
            samples[i],
            statuses[i],
            numbers[i],
            fractions[i] * 100.0
        );
    }

    Ok(())
}
