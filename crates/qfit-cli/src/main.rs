mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod utils;

use crate::cli::{Cli, Commands};
use crate::commands::CommandStatus;
use crate::error::{CliError, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    match run_app().await {
        Ok(status) => std::process::exit(status.exit_code()),
        Err(e) => {
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_app() -> Result<CommandStatus> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref())?;

    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install().map_err(|e| CliError::Other(e.into()))?;
    std::panic::set_hook(Box::new(move |pi| {
        error!("{}", panic_hook.panic_report(pi));
    }));

    info!("🚀 qFit CLI v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);

    if let Some(num_threads) = cli.threads {
        info!(
            "Setting Rayon global thread pool to {} threads.",
            num_threads
        );
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .map_err(|e| {
                CliError::Other(anyhow::anyhow!("Failed to build global thread pool: {}", e))
            })?;
    }

    let command_result = match cli.command {
        Commands::Refine(args) => {
            info!("Dispatching to 'refine' command.");
            commands::refine::run(args).await
        }
        Commands::Solvers => {
            info!("Dispatching to 'solvers' command.");
            commands::solvers::run().await
        }
    };

    match &command_result {
        Ok(CommandStatus::Success) => {
            info!("✅ Command completed successfully.");
        }
        Ok(CommandStatus::PartialSuccess) => {
            warn!("Command completed with failed or non-optimal regions.");
            println!("⚠ Completed with failed or non-optimal regions; see diagnostics.csv.");
        }
        Err(e) => {
            error!("❌ Command failed: {}", e);
        }
    }

    command_result
}
