//! stat command - Show the size of an object

use clap::Args;
use dg_core::{Backend as _, Config, is_retryable_error, retry_with_backoff};
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Show the size of an object
#[derive(Args, Debug)]
pub struct StatArgs {
    /// Destination URL (gdrive://<id>/<folder path>)
    pub url: String,

    /// Object name
    pub name: String,
}

#[derive(Debug, Serialize)]
struct StatOutput {
    name: String,
    size_bytes: u64,
    size_human: String,
}

/// Execute the stat command
pub async fn execute(args: StatArgs, output_config: OutputConfig, config: &Config) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let backend = match super::connect(&args.url, config, &formatter).await {
        Ok(b) => b,
        Err(code) => return code,
    };

    let name = args.name.as_str();
    match retry_with_backoff(&config.retry, || backend.query(name), is_retryable_error).await {
        Ok(Some(size)) => {
            let output = StatOutput {
                name: args.name.clone(),
                size_bytes: size,
                size_human: humansize::format_size(size, humansize::BINARY),
            };
            if formatter.is_json() {
                formatter.json(&output);
            } else {
                formatter.println(&format!(
                    "{} {}",
                    formatter.style_key("Name:"),
                    formatter.style_name(&output.name)
                ));
                formatter.println(&format!(
                    "{} {} ({size} bytes)",
                    formatter.style_key("Size:"),
                    formatter.style_size(&output.size_human)
                ));
            }
            ExitCode::Success
        }
        Ok(None) => {
            formatter.error(&format!("Object '{}' not found", args.name));
            ExitCode::NotFound
        }
        Err(e) => {
            formatter.failure("Failed to query object", &e);
            ExitCode::from_error(&e)
        }
    }
}
