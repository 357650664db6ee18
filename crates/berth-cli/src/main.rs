use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use berth_infrastructure::paths::BerthPaths;

mod app;
mod commands;

#[derive(Parser)]
#[command(name = "berth")]
#[command(about = "berth - run LLM inference containers and work through a prompt queue", long_about = None)]
struct Cli {
    /// Directory holding config.toml and the persisted collections
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the prompt scheduler and flush loops until interrupted
    Serve {
        /// Also write logs to <config-dir>/logs
        #[arg(long)]
        log_file: bool,
    },
    /// Launch a model container (the configured default when no id is given)
    StartModel {
        model_id: Option<String>,
        /// Store the model as the configured default
        #[arg(long)]
        make_default: bool,
        /// Block until the model answers
        #[arg(long)]
        wait: bool,
    },
    /// Print the status of a model as JSON
    Status { model_id: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = BerthPaths::new(cli.config_dir.as_deref()).context("failed to resolve config directory")?;

    let log_dir = match cli.command {
        Commands::Serve { log_file: true } => Some(paths.logs_dir()),
        _ => None,
    };
    let _log_guard = berth_execution::init_logging(log_dir.as_deref()).context("failed to initialise logging")?;

    match cli.command {
        Commands::Serve { .. } => commands::serve::run(paths).await?,
        Commands::StartModel {
            model_id,
            make_default,
            wait,
        } => commands::model::start(paths, model_id.unwrap_or_default(), make_default, wait).await?,
        Commands::Status { model_id } => commands::model::status(paths, model_id.unwrap_or_default()).await?,
    }

    Ok(())
}
