//! dg-gdrive: Google Drive adapter for drivegate
//!
//! Implements the `DriveApi` trait from dg-core against the Drive v2 REST
//! API and provides the credential flows needed to obtain a session.

pub mod auth;
pub mod client;
pub mod wire;

#[cfg(test)]
mod stub;

pub use auth::{AuthMethod, Authenticator, Credentials, Session, StoredToken};
pub use client::{DRIVE_API_BASE, DRIVE_UPLOAD_BASE, DriveClient, http_client};

use dg_core::{Config, Destination, FolderBackend, Result};

/// Open a backend for a `gdrive://` destination.
///
/// Credentials are taken from the environment; see [`auth`] for the
/// variables each flow reads. The access token is renewed as it nears
/// expiry, so the backend can outlive it. Folder resolution is deferred
/// until the first operation.
pub async fn connect(url: &str, config: &Config) -> Result<FolderBackend<DriveClient>> {
    config.validate()?;
    let destination = Destination::parse(url)?;
    let method = AuthMethod::from_env(&destination)?;

    let http = http_client()?;
    let authenticator = Authenticator::new(http.clone());
    let session = authenticator.authorize(&method).await?;
    tracing::debug!(
        destination = %destination.authority(),
        path = %destination.path,
        expires_at = ?session.expires_at(),
        "Connected"
    );

    let credentials = Credentials::refreshable(authenticator, method, session);
    let client = DriveClient::new(http, credentials, config);
    Ok(FolderBackend::new(client, destination.path, config))
}
