//! Paginated listing
//!
//! Follows continuation tokens until the provider stops returning one.
//! Listing is all-or-nothing: an error on any page discards what was
//! accumulated so far. Items are not de-duplicated across pages.

use crate::error::Result;
use crate::query::Query;
use crate::traits::{DriveApi, RemoteObject};

/// Collect every object matching `query`
pub async fn list_all<A>(api: &A, query: &Query, page_size: u32) -> Result<Vec<RemoteObject>>
where
    A: DriveApi + ?Sized,
{
    let mut items = Vec::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0u32;

    loop {
        let page = api
            .list_children(query, page_token.take(), page_size)
            .await?;
        pages += 1;

        tracing::trace!(page = pages, items = page.items.len(), "Listed page");
        items.extend(page.items);

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    tracing::debug!(query = %query, pages, total = items.len(), "Listing complete");
    Ok(items)
}
