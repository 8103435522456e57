//! Folder-scoped backend facade
//!
//! [`FolderBackend`] binds a [`DriveApi`] to one destination folder. The
//! folder is resolved on first use and memoized for the lifetime of the
//! backend; a failed resolution is returned to the caller and attempted
//! again by the next operation.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::config::Config;
use crate::error::Result;
use crate::lister::list_all;
use crate::path::FolderPath;
use crate::query::Query;
use crate::traits::{Backend, ContainerId, DriveApi};
use crate::{index, resolver, transfer};

pub struct FolderBackend<A> {
    api: A,
    path: FolderPath,
    page_size: u32,
    destination: OnceCell<ContainerId>,
}

impl<A: DriveApi> FolderBackend<A> {
    pub fn new(api: A, path: FolderPath, config: &Config) -> Self {
        Self {
            api,
            path,
            page_size: config.page_size,
            destination: OnceCell::new(),
        }
    }

    /// Resolve (or return the memoized) destination container
    pub async fn destination(&self) -> Result<&ContainerId> {
        self.destination
            .get_or_try_init(|| resolver::resolve(&self.api, &self.path, self.page_size))
            .await
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn into_api(self) -> A {
        self.api
    }
}

#[async_trait]
impl<A: DriveApi> Backend for FolderBackend<A> {
    async fn list(&self) -> Result<Vec<String>> {
        let container = self.destination().await?;
        let items = list_all(&self.api, &Query::children_of(container), self.page_size).await?;
        let names: Vec<String> = items.into_iter().map(|item| item.title).collect();
        tracing::debug!(count = names.len(), "list()");
        Ok(names)
    }

    async fn query(&self, name: &str) -> Result<Option<u64>> {
        let container = self.destination().await?;
        let size = index::find(&self.api, container, name, self.page_size)
            .await?
            .and_then(|object| object.size);
        tracing::debug!(name, size = ?size, "query()");
        Ok(size)
    }

    async fn get(&self, name: &str, destination: &Path) -> Result<()> {
        let container = self.destination().await?;
        transfer::fetch(&self.api, container, name, destination, self.page_size).await?;
        Ok(())
    }

    async fn put(&self, source: &Path, name: &str) -> Result<()> {
        let container = self.destination().await?;
        transfer::store(&self.api, container, source, name, self.page_size).await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let container = self.destination().await?;
        let removed = transfer::delete(&self.api, container, name, self.page_size).await?;
        tracing::debug!(name, removed, "delete()");
        Ok(())
    }
}
