//! Single-object transfers: store, fetch, delete
//!
//! Overwrite is delete-then-create, so after a successful store exactly one
//! live object carries the name. If the upload fails after the delete, the
//! name is left absent.

use std::path::Path;

use crate::error::{Error, Result};
use crate::index::{find, find_all};
use crate::traits::{ContainerId, DriveApi, RemoteObject};

/// Delete every live object called `name`; returns how many were removed
pub async fn delete<A>(
    api: &A,
    container: &ContainerId,
    name: &str,
    page_size: u32,
) -> Result<usize>
where
    A: DriveApi + ?Sized,
{
    let matches = find_all(api, container, name, page_size).await?;
    let mut deleted = 0;

    for object in matches {
        match api.delete(&object.id).await {
            Ok(()) => {
                tracing::info!(name, id = %object.id, "Deleted object");
                deleted += 1;
            }
            // Removed by someone else between listing and delete
            Err(e) if e.is_not_found() => {
                tracing::debug!(name, id = %object.id, "Object already gone");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(deleted)
}

/// Upload `source` as `name`, replacing any existing objects of that name
pub async fn store<A>(
    api: &A,
    container: &ContainerId,
    source: &Path,
    name: &str,
    page_size: u32,
) -> Result<RemoteObject>
where
    A: DriveApi + ?Sized,
{
    // Refuse before touching the remote copy if the source is unreadable
    let metadata = tokio::fs::metadata(source).await?;
    if !metadata.is_file() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", source.display()),
        )));
    }

    delete(api, container, name, page_size).await?;

    tracing::info!(name, bytes = metadata.len(), "Uploading");
    let object = api.upload_file(container, name, source).await?;
    tracing::info!(name, id = %object.id, "Upload done");

    Ok(object)
}

/// Download `name` into `destination`, returning the byte count.
///
/// A download refused by the abuse scan is retried once with the
/// acknowledgement flag. Partial content is left in `destination` on error.
pub async fn fetch<A>(
    api: &A,
    container: &ContainerId,
    name: &str,
    destination: &Path,
    page_size: u32,
) -> Result<u64>
where
    A: DriveApi + ?Sized,
{
    let object = find(api, container, name, page_size)
        .await?
        .ok_or_else(|| Error::NotFound(format!("'{name}' in folder {container}")))?;

    tracing::info!(name, id = %object.id, "Downloading");

    let written = match download_to(api, &object.id, destination, false).await {
        Ok(written) => written,
        Err(Error::AbuseFlagged(msg)) => {
            tracing::warn!(name, reason = %msg, "Download flagged, retrying with acknowledgeAbuse");
            match download_to(api, &object.id, destination, true).await {
                Ok(written) => written,
                Err(Error::AbuseFlagged(msg)) => {
                    return Err(Error::Transient(format!(
                        "download '{name}' still refused after acknowledgement: {msg}"
                    )));
                }
                Err(e) => return Err(e),
            }
        }
        Err(e) => return Err(e),
    };

    tracing::info!(name, bytes = written, "Download done");
    Ok(written)
}

/// One download attempt; the destination is truncated and held open only
/// for the duration of the attempt
async fn download_to<A>(
    api: &A,
    id: &str,
    destination: &Path,
    acknowledge_abuse: bool,
) -> Result<u64>
where
    A: DriveApi + ?Sized,
{
    let mut file = tokio::fs::File::create(destination).await?;
    let written = api.download(id, acknowledge_abuse, &mut file).await?;
    file.sync_all().await?;
    Ok(written)
}
