//! Exact-name object lookup within a container

use crate::error::Result;
use crate::lister::list_all;
use crate::query::Query;
use crate::traits::{ContainerId, DriveApi, RemoteObject};

/// Every live object in `container` whose title is exactly `name`,
/// in listing order
pub async fn find_all<A>(
    api: &A,
    container: &ContainerId,
    name: &str,
    page_size: u32,
) -> Result<Vec<RemoteObject>>
where
    A: DriveApi + ?Sized,
{
    let query = Query::children_of(container).title(name);
    let mut items = list_all(api, &query, page_size).await?;
    // The provider's title comparison is not guaranteed to be exact
    items.retain(|item| item.title == name && !item.trashed);
    Ok(items)
}

/// First live object in `container` titled `name`, if any
pub async fn find<A>(
    api: &A,
    container: &ContainerId,
    name: &str,
    page_size: u32,
) -> Result<Option<RemoteObject>>
where
    A: DriveApi + ?Sized,
{
    Ok(find_all(api, container, name, page_size)
        .await?
        .into_iter()
        .next())
}
