use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Args;

use crate::align::minimap2::{Minimap2, DEFAULT_EXECUTABLE};
use crate::align::mutations::CsMutationCaller;
use crate::align::{Mapper, MutationCaller};
use crate::annotate::pipeline::{BARCODED_COLUMN, CCS_ALIGNED_COLUMN, GENE_ALIGNED_COLUMN};
use crate::annotate::{AlignHooks, Pipeline, PipelineConfig};
use crate::cli::{count_true, load_inputs, percent, print_json, print_tsv, OutputFormat};
use crate::core::table::Table;
use crate::parsing::isoforms::parse_isoforms_file;

#[derive(Args)]
pub struct AnnotateArgs {
    /// CCS files (SAM, BAM, FASTQ or FASTQ.gz)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// FASTA of alignment targets
    #[arg(long)]
    pub targets: PathBuf,

    /// JSON file with the read layout; flags below override its fields
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Pattern for the gene region
    #[arg(long)]
    pub gene: Option<String>,

    /// Pattern for the 5' terminus
    #[arg(long)]
    pub termini5: Option<String>,

    /// Pattern for the spacer between gene and UMI
    #[arg(long)]
    pub spacer: Option<String>,

    /// Pattern for the UMI
    #[arg(long)]
    pub umi: Option<String>,

    /// Pattern for the barcode
    #[arg(long)]
    pub barcode: Option<String>,

    /// Pattern for the 3' terminus
    #[arg(long)]
    pub termini3: Option<String>,

    /// Keep barcode and UMI in read orientation
    #[arg(long)]
    pub no_rc_barcode_umi: bool,

    /// minimap2 executable
    #[arg(long, default_value = DEFAULT_EXECUTABLE)]
    pub minimap2: PathBuf,

    /// File of isoform groups, one group per line
    #[arg(long)]
    pub isoforms: Option<PathBuf>,

    /// Keep minimap2's PAF output for the gene alignment here
    #[arg(long)]
    pub paf: Option<PathBuf>,

    /// Add substitution, insertion and deletion columns for the gene
    #[arg(long)]
    pub call_mutations: bool,

    /// Sample name per input, in order (defaults to the file names)
    #[arg(long)]
    pub sample: Vec<String>,
}

impl AnnotateArgs {
    /// Layout from `--config`, overridden by any pattern flags
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                PipelineConfig::from_json(&json)
                    .with_context(|| format!("Invalid pipeline config {}", path.display()))?
            }
            None => match &self.gene {
                Some(gene) => PipelineConfig::new(gene.clone()),
                None => bail!("--gene is required unless --config is given"),
            },
        };

        if let Some(gene) = &self.gene {
            config.gene.clone_from(gene);
        }
        for (flag, field) in [
            (&self.termini5, &mut config.termini5),
            (&self.spacer, &mut config.spacer),
            (&self.umi, &mut config.umi),
            (&self.barcode, &mut config.barcode),
            (&self.termini3, &mut config.termini3),
        ] {
            if flag.is_some() {
                field.clone_from(flag);
            }
        }
        if self.no_rc_barcode_umi {
            config.rc_barcode_umi = false;
        }

        Ok(config)
    }

    fn mapper(&self) -> anyhow::Result<Minimap2> {
        let mut mapper = Minimap2::new(&self.targets).with_executable(&self.minimap2);
        if let Some(path) = &self.isoforms {
            let isoforms = parse_isoforms_file(path)
                .with_context(|| format!("Failed to read isoforms {}", path.display()))?;
            mapper = mapper.with_isoforms(isoforms);
        }
        Ok(mapper)
    }
}

/// Execute annotate subcommand
///
/// # Errors
///
/// Returns an error if an input or the configuration cannot be read, a
/// pattern is invalid, or minimap2 fails.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: AnnotateArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let config = args.pipeline_config()?;
    let mapper = args.mapper()?;
    let tables = load_inputs(&args.inputs, &args.sample)?;

    if verbose {
        let reads: usize = tables.iter().map(Table::n_rows).sum();
        eprintln!("Loaded {reads} reads from {} files", args.inputs.len());
        eprintln!("Read layout: {}", config.match_pattern());
        eprintln!(
            "Targets: {} ({} in isoform groups)",
            mapper.targets().display(),
            mapper.target_isoforms().n_grouped_targets()
        );
    }

    let mutations: &dyn MutationCaller = &CsMutationCaller;
    let hooks = AlignHooks {
        mutations: args.call_mutations.then_some(mutations),
        ..AlignHooks::default()
    };

    let mut pipeline = Pipeline::new(&mapper, config).with_hooks(hooks);
    if let Some(paf) = &args.paf {
        pipeline = pipeline.with_gene_paf(paf);
    }
    let table = pipeline.run(&tables)?;

    match format {
        OutputFormat::Text => print_text_summary(&table),
        OutputFormat::Json => print_json(&table)?,
        OutputFormat::Tsv => print_tsv(&table),
    }

    Ok(())
}

fn print_text_summary(table: &Table) {
    let total = table.n_rows();
    println!("Reads: {total}");

    for (label, column) in [
        ("Barcoded", BARCODED_COLUMN),
        ("Has termini5", "has_termini5"),
        ("Has termini3", "has_termini3"),
        ("Has spacer", "has_spacer"),
        ("Gene aligned", GENE_ALIGNED_COLUMN),
        ("CCS aligned", CCS_ALIGNED_COLUMN),
    ] {
        if table.has_column(column) {
            let n = count_true(table, column);
            println!("{label:<14}{n:>8} ({:.1}%)", percent(n, total));
        }
    }

    println!();
    println!("Use --format tsv or --format json for per-read columns.");
}
