//! dg - command line access to a drivegate destination
//!
//! Credentials come from the environment (`GDRIVE_SERVICE_KEY_FILE`, or
//! `GDRIVE_APP_SECRET` with `GDRIVE_APP_TOKEN_FILE`); tuning comes from
//! `config.toml` in `$DG_CONFIG_DIR` or the platform config directory.

mod commands;
mod exit_code;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Commands;
use crate::output::OutputConfig;

#[derive(Parser, Debug)]
#[command(name = "dg", version, about = "Google Drive folder backend for backup archives")]
pub struct Cli {
    /// Output strict JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    fn output_config(&self) -> OutputConfig {
        OutputConfig {
            json: self.json,
            no_color: self.no_color,
            quiet: self.quiet,
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output_config = cli.output_config();
    let code = commands::execute(cli.command, output_config).await;
    std::process::exit(code.as_i32());
}
