//! put command - Upload a local file

use std::path::{Path, PathBuf};

use clap::Args;
use dg_core::{Backend as _, Config, is_retryable_error, retry_with_backoff};
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Upload a local file, replacing any object with the same name
#[derive(Args, Debug)]
pub struct PutArgs {
    /// Destination URL (gdrive://<id>/<folder path>)
    pub url: String,

    /// Local file to upload
    pub source: PathBuf,

    /// Object name (defaults to the source file name)
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutOutput {
    name: String,
    source: String,
    size_bytes: u64,
}

/// Execute the put command
pub async fn execute(args: PutArgs, output_config: OutputConfig, config: &Config) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let name = match object_name(&args.source, args.name.as_deref()) {
        Ok(name) => name,
        Err(msg) => {
            formatter.error(&msg);
            return ExitCode::UsageError;
        }
    };

    let size_bytes = match std::fs::metadata(&args.source) {
        Ok(meta) if meta.is_file() => meta.len(),
        Ok(_) => {
            formatter.error(&format!("'{}' is not a regular file", args.source.display()));
            return ExitCode::UsageError;
        }
        Err(e) => {
            formatter.error(&format!("Cannot read '{}': {e}", args.source.display()));
            return ExitCode::NotFound;
        }
    };

    let backend = match super::connect(&args.url, config, &formatter).await {
        Ok(b) => b,
        Err(code) => return code,
    };

    let spinner = formatter.spinner(format!(
        "Uploading {name} ({})",
        humansize::format_size(size_bytes, humansize::BINARY)
    ));
    let source = args.source.as_path();
    let name_ref = name.as_str();
    let result = retry_with_backoff(
        &config.retry,
        || backend.put(source, name_ref),
        is_retryable_error,
    )
    .await;
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }

    if let Err(e) = result {
        formatter.failure(&format!("Failed to upload '{name}'"), &e);
        return ExitCode::from_error(&e);
    }

    if formatter.is_json() {
        formatter.json(&PutOutput {
            name,
            source: args.source.display().to_string(),
            size_bytes,
        });
    } else {
        formatter.success(&format!(
            "{} -> {} ({})",
            args.source.display(),
            formatter.style_name(&name),
            formatter.style_size(&humansize::format_size(size_bytes, humansize::BINARY))
        ));
    }

    ExitCode::Success
}

fn object_name(source: &Path, explicit: Option<&str>) -> Result<String, String> {
    match explicit {
        Some("") => Err("Object name cannot be empty".to_string()),
        Some(name) => Ok(name.to_string()),
        None => source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| format!("Cannot derive an object name from '{}'", source.display())),
    }
}
