//! Folder path resolution
//!
//! Walks a [`FolderPath`] from the root container, reusing an existing
//! folder per segment or creating one. When several live folders share a
//! name under one parent, the first in listing order wins.

use crate::error::Result;
use crate::lister::list_all;
use crate::path::FolderPath;
use crate::query::Query;
use crate::traits::{ContainerId, DriveApi};

/// Resolve `path` to a container id, creating missing folders
pub async fn resolve<A>(api: &A, path: &FolderPath, page_size: u32) -> Result<ContainerId>
where
    A: DriveApi + ?Sized,
{
    let mut parent = ContainerId::root();

    for segment in path.segments() {
        let query = Query::children_of(&parent).title(segment).folders_only();
        let existing = list_all(api, &query, page_size)
            .await?
            .into_iter()
            .find(|item| item.title == *segment && item.is_folder());

        parent = match existing {
            Some(folder) => folder.container_id(),
            None => {
                let folder = api.create_folder(&parent, segment).await?;
                tracing::info!(folder = %segment, id = %folder.id, parent = %parent, "Created folder");
                folder.container_id()
            }
        };
    }

    tracing::debug!(path = %path, id = %parent, "Resolved destination");
    Ok(parent)
}
