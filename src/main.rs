use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ccs_match::cli;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Initialize logging based on verbosity flag
    let filter = if cli.verbose {
        EnvFilter::new("ccs_match=debug,info")
    } else {
        EnvFilter::new("ccs_match=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure worker threads")?;
    }

    match cli.command {
        cli::Commands::Match(args) => {
            cli::match_reads::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::Annotate(args) => {
            cli::annotate::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::Report(args) => {
            cli::report::run(args, cli.format, cli.verbose)?;
        }
    }

    Ok(())
}
