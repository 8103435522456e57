//! Core traits for drivegate
//!
//! [`DriveApi`] is the seam between the provider-independent logic in this
//! crate and a concrete remote store binding. [`Backend`] is the surface
//! a backup tool drives.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::query::{FOLDER_MIME_TYPE, Query};

/// Opaque identifier of a folder-like container
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Provider alias of the pre-existing root container
    pub const ROOT: &'static str = "root";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn root() -> Self {
        Self(Self::ROOT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Summary of a remote object (file or folder)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub id: String,
    pub title: String,
    pub mime_type: String,
    /// Content length; absent for folders and unfinished uploads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    #[serde(default)]
    pub trashed: bool,
}

impl RemoteObject {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    pub fn container_id(&self) -> ContainerId {
        ContainerId::new(self.id.clone())
    }
}

/// One page of a children listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub items: Vec<RemoteObject>,
    /// Cursor for the next page; `None` when the listing is exhausted
    pub next_page_token: Option<String>,
}

/// Round trips consumed from the remote object store.
///
/// Implementations perform exactly one request (or one resumable upload
/// session) per call and translate failures with
/// [`Error::from_provider`](crate::Error::from_provider).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// List one page of objects matching `query`
    async fn list_children(
        &self,
        query: &Query,
        page_token: Option<String>,
        page_size: u32,
    ) -> Result<ListPage>;

    /// Create a folder with a single parent
    async fn create_folder(&self, parent: &ContainerId, title: &str) -> Result<RemoteObject>;

    /// Upload `source` as a new object under `parent`
    async fn upload_file(
        &self,
        parent: &ContainerId,
        title: &str,
        source: &Path,
    ) -> Result<RemoteObject>;

    /// Stream the content of object `id` into `sink`, returning bytes written
    async fn download(
        &self,
        id: &str,
        acknowledge_abuse: bool,
        sink: &mut tokio::fs::File,
    ) -> Result<u64>;

    /// Permanently delete object `id`
    async fn delete(&self, id: &str) -> Result<()>;
}

/// The five operations a backup tool drives against its destination
#[async_trait]
pub trait Backend: Send + Sync {
    /// Names of all live objects in the destination, in provider order
    async fn list(&self) -> Result<Vec<String>>;

    /// Size of `name` in bytes, or `None` if it is absent
    async fn query(&self, name: &str) -> Result<Option<u64>>;

    /// Download `name` into `destination`
    async fn get(&self, name: &str, destination: &Path) -> Result<()>;

    /// Upload `source` as `name`, replacing any existing object(s)
    async fn put(&self, source: &Path, name: &str) -> Result<()>;

    /// Remove every live object called `name`; absent names are a no-op
    async fn delete(&self, name: &str) -> Result<()>;
}
