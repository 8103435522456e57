//! Command implementations
//!
//! Each command takes the destination URL as its first argument, connects
//! with credentials from the environment and runs one backend operation.

pub mod completions;
pub mod get;
pub mod ls;
pub mod put;
pub mod rm;
pub mod stat;

use clap::Subcommand;
use dg_core::{Config, ConfigManager, FolderBackend, is_retryable_error, retry_with_backoff};
use dg_gdrive::DriveClient;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List objects in a destination folder
    Ls(ls::LsArgs),

    /// Show the size of an object
    Stat(stat::StatArgs),

    /// Download an object to a local file
    Get(get::GetArgs),

    /// Upload a local file, replacing any object with the same name
    Put(put::PutArgs),

    /// Remove objects by name
    Rm(rm::RmArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Open the backend for `url`, retrying transient failures
pub(crate) async fn connect(
    url: &str,
    config: &Config,
    formatter: &Formatter,
) -> Result<FolderBackend<DriveClient>, ExitCode> {
    retry_with_backoff(
        &config.retry,
        || dg_gdrive::connect(url, config),
        is_retryable_error,
    )
    .await
    .map_err(|e| {
        formatter.failure("Failed to connect", &e);
        ExitCode::from_error(&e)
    })
}

/// Execute a command
pub async fn execute(command: Commands, output_config: OutputConfig) -> ExitCode {
    match command {
        Commands::Completions(args) => completions::execute(args),
        command => run(command, output_config).await,
    }
}

async fn run(command: Commands, output_config: OutputConfig) -> ExitCode {
    let loaded = ConfigManager::new().and_then(|manager| {
        let config = manager.load()?;
        tracing::debug!(path = %manager.config_path().display(), ?config, "Loaded configuration");
        Ok(config)
    });
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            Formatter::new(output_config).failure("Failed to load configuration", &e);
            return ExitCode::from_error(&e);
        }
    };

    match command {
        Commands::Ls(args) => ls::execute(args, output_config, &config).await,
        Commands::Stat(args) => stat::execute(args, output_config, &config).await,
        Commands::Get(args) => get::execute(args, output_config, &config).await,
        Commands::Put(args) => put::execute(args, output_config, &config).await,
        Commands::Rm(args) => rm::execute(args, output_config, &config).await,
        Commands::Completions(args) => completions::execute(args),
    }
}
