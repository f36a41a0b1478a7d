use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::Parser;
use clusterfetch::cli::commands::{init, run};
use clusterfetch::cli::{Cli, Commands};
use clusterfetch::{Settings, logging};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Init { force } = cli.command {
        return init::run_init(force);
    }

    let mut settings = match &cli.config {
        Some(path) => {
            if !path.exists() {
                bail!("configuration file not found: {}", path.display());
            }
            Settings::load_from(path)
        }
        None => Settings::load(),
    }
    .context("failed to load configuration")?;

    logging::init_with_config(&settings.logging);
    run::apply_overrides(&mut settings, &cli.command)?;

    match &cli.command {
        Commands::Init { .. } => unreachable!("handled above"),
        Commands::Config => init::run_config(&settings),
        Commands::Kmeans { run: args, .. } => {
            let report = run::run_kmeans(&settings, args)?;
            run::emit(&report, args)
        }
        Commands::Som { run: args, .. } => {
            let report = run::run_som(&settings, args)?;
            run::emit(&report, args)
        }
    }
}
