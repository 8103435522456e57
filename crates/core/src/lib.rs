//! dg-core: Core library for the drivegate backup backend
//!
//! This crate provides the provider-independent parts of drivegate:
//! - Error taxonomy and provider error translation
//! - Destination URL and folder path parsing
//! - Typed search filters
//! - Paginated listing, folder resolution, object lookup and transfers
//! - The `FolderBackend` facade exposing list/query/get/put/delete
//!
//! The remote store is reached only through the [`DriveApi`] trait, so the
//! whole backend can be exercised against an in-memory implementation.

pub mod backend;
pub mod config;
pub mod error;
pub mod index;
pub mod lister;
pub mod path;
pub mod query;
pub mod resolver;
pub mod retry;
pub mod traits;
pub mod transfer;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

pub use backend::FolderBackend;
pub use config::{Config, ConfigManager, RetryConfig};
pub use error::{Error, ErrorKind, ProviderError, Result};
pub use path::{Destination, FolderPath};
pub use query::{Clause, FOLDER_MIME_TYPE, Query, escape_literal};
pub use retry::{is_retryable_error, retry_with_backoff};
pub use traits::{Backend, ContainerId, DriveApi, ListPage, RemoteObject};
