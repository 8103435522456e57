//! ls command - List objects in a destination folder

use clap::Args;
use comfy_table::{Table, presets};
use dg_core::lister::list_all;
use dg_core::{Backend as _, Config, Query, RemoteObject, is_retryable_error, retry_with_backoff};
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// List objects in a destination folder
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Destination URL (gdrive://<id>/<folder path>)
    pub url: String,

    /// Show size, kind and id of each object
    #[arg(short, long)]
    pub long: bool,
}

#[derive(Debug, Serialize)]
struct LsEntry {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_folder: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_human: Option<String>,
}

impl From<RemoteObject> for LsEntry {
    fn from(object: RemoteObject) -> Self {
        let is_folder = object.is_folder();
        Self {
            size_human: object
                .size
                .map(|s| humansize::format_size(s, humansize::BINARY)),
            size_bytes: object.size,
            is_folder: Some(is_folder),
            id: Some(object.id),
            name: object.title,
        }
    }
}

/// Execute the ls command
pub async fn execute(args: LsArgs, output_config: OutputConfig, config: &Config) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let backend = match super::connect(&args.url, config, &formatter).await {
        Ok(b) => b,
        Err(code) => return code,
    };

    let entries: Vec<LsEntry> = if args.long {
        let backend = &backend;
        let result = retry_with_backoff(
            &config.retry,
            move || async move {
                let container = backend.destination().await?;
                list_all(backend.api(), &Query::children_of(container), config.page_size).await
            },
            is_retryable_error,
        )
        .await;
        match result {
            Ok(objects) => objects.into_iter().map(LsEntry::from).collect(),
            Err(e) => {
                formatter.failure("Failed to list objects", &e);
                return ExitCode::from_error(&e);
            }
        }
    } else {
        match retry_with_backoff(&config.retry, || backend.list(), is_retryable_error).await {
            Ok(names) => names
                .into_iter()
                .map(|name| LsEntry {
                    name,
                    id: None,
                    is_folder: None,
                    size_bytes: None,
                    size_human: None,
                })
                .collect(),
            Err(e) => {
                formatter.failure("Failed to list objects", &e);
                return ExitCode::from_error(&e);
            }
        }
    };

    if formatter.is_json() {
        formatter.json(&entries);
    } else if args.long {
        formatter.println(&render_table(&entries));
    } else {
        for entry in &entries {
            formatter.println(&formatter.style_name(&entry.name));
        }
    }

    ExitCode::Success
}

fn render_table(entries: &[LsEntry]) -> String {
    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.set_header(vec!["SIZE", "NAME", "ID"]);
    for entry in entries {
        let size = match (entry.is_folder, &entry.size_human) {
            (Some(true), _) => "DIR".to_string(),
            (_, Some(human)) => human.clone(),
            _ => "-".to_string(),
        };
        table.add_row(vec![
            size,
            entry.name.clone(),
            entry.id.clone().unwrap_or_default(),
        ]);
    }
    table.to_string()
}
