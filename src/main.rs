//! fraudcv - Main Entry Point

use clap::Parser;
use fraudcv::cli::{cmd_evaluate, cmd_init_config, cmd_run, cmd_search, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fraudcv=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, no_search, n_trials, timeout } => {
            cmd_run(config.as_deref(), no_search, n_trials, timeout)?;
        }
        Commands::Search { config, n_trials, timeout } => {
            cmd_search(config.as_deref(), n_trials, timeout)?;
        }
        Commands::Evaluate { config, params } => {
            cmd_evaluate(config.as_deref(), params.as_deref())?;
        }
        Commands::InitConfig { output, force } => {
            cmd_init_config(&output, force)?;
        }
    }

    Ok(())
}
