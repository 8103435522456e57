//! rm command - Remove objects by name
//!
//! Removing a name that does not exist succeeds. When several objects
//! share a name, all of them are removed.

use clap::Args;
use dg_core::{Backend as _, Config, is_retryable_error, retry_with_backoff};
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Remove objects by name
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Destination URL (gdrive://<id>/<folder path>)
    pub url: String,

    /// Object names to remove
    #[arg(required = true)]
    pub names: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
struct RmOutput {
    removed: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failed: Vec<String>,
}

/// Execute the rm command
pub async fn execute(args: RmArgs, output_config: OutputConfig, config: &Config) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let backend = match super::connect(&args.url, config, &formatter).await {
        Ok(b) => b,
        Err(code) => return code,
    };

    let mut output = RmOutput::default();
    let mut exit_code = ExitCode::Success;

    for name in args.names {
        let name_ref = name.as_str();
        let result =
            retry_with_backoff(&config.retry, || backend.delete(name_ref), is_retryable_error)
                .await;
        match result {
            Ok(()) => {
                formatter.success(&format!("Removed {}", formatter.style_name(&name)));
                output.removed.push(name);
            }
            Err(e) => {
                formatter.failure(&format!("Failed to remove '{name}'"), &e);
                exit_code = ExitCode::from_error(&e);
                output.failed.push(name);
            }
        }
    }

    if formatter.is_json() {
        formatter.json(&output);
    }

    exit_code
}
