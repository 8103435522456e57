//! get command - Download an object to a local file

use std::path::{Path, PathBuf};

use clap::Args;
use dg_core::{Backend as _, Config, is_retryable_error, retry_with_backoff};
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Download an object to a local file
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Destination URL (gdrive://<id>/<folder path>)
    pub url: String,

    /// Object name
    pub name: String,

    /// Local file or directory (defaults to the object name in the current directory)
    pub target: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct GetOutput {
    name: String,
    path: String,
    size_bytes: u64,
}

/// Execute the get command
pub async fn execute(args: GetArgs, output_config: OutputConfig, config: &Config) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let local = match local_target(&args.name, args.target.as_deref()) {
        Ok(path) => path,
        Err(msg) => {
            formatter.error(&msg);
            return ExitCode::UsageError;
        }
    };

    let backend = match super::connect(&args.url, config, &formatter).await {
        Ok(b) => b,
        Err(code) => return code,
    };

    if local.exists() {
        formatter.warning(&format!("Overwriting {}", local.display()));
    }

    let spinner = formatter.spinner(format!("Downloading {}", args.name));
    let name = args.name.as_str();
    let local_ref = local.as_path();
    let result = retry_with_backoff(
        &config.retry,
        || backend.get(name, local_ref),
        is_retryable_error,
    )
    .await;
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }

    if let Err(e) = result {
        formatter.failure(&format!("Failed to download '{}'", args.name), &e);
        return ExitCode::from_error(&e);
    }

    let size_bytes = std::fs::metadata(&local).map(|m| m.len()).unwrap_or(0);
    if formatter.is_json() {
        formatter.json(&GetOutput {
            name: args.name,
            path: local.display().to_string(),
            size_bytes,
        });
    } else {
        formatter.success(&format!(
            "{} -> {} ({})",
            formatter.style_name(&args.name),
            local.display(),
            formatter.style_size(&humansize::format_size(size_bytes, humansize::BINARY))
        ));
    }

    ExitCode::Success
}

/// Resolve where the object is written locally
fn local_target(name: &str, target: Option<&Path>) -> Result<PathBuf, String> {
    let file_name = Path::new(name)
        .file_name()
        .ok_or_else(|| format!("Object name '{name}' cannot be used as a local file name"))?;

    Ok(match target {
        Some(dir) if dir.is_dir() => dir.join(file_name),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(file_name),
    })
}
