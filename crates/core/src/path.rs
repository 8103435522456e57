//! Destination URL and folder path parsing
//!
//! A destination is written as `gdrive://<authority>/<folder path>`. For a
//! service account the authority is the account email
//! (`backup@project.iam.gserviceaccount.com`), for an installed app it is
//! the OAuth client id.

use std::fmt;

use url::Url;

use crate::error::{Error, Result};

/// URL scheme accepted for destinations
pub const SCHEME: &str = "gdrive";

/// Ordered, non-empty folder names below the root container
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FolderPath {
    segments: Vec<String>,
}

impl FolderPath {
    /// Split on `/`, dropping empty segments (`a//b/` is `["a", "b"]`)
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True when the destination is the root container itself
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for FolderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

/// A parsed `gdrive://` destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// User part of the authority, if any
    pub user: Option<String>,
    /// Host part of the authority
    pub host: String,
    pub path: FolderPath,
}

impl Destination {
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input)
            .map_err(|e| Error::InvalidPath(format!("'{input}' is not a valid URL: {e}")))?;

        if url.scheme() != SCHEME {
            return Err(Error::InvalidPath(format!(
                "unsupported scheme '{}', expected '{SCHEME}://'",
                url.scheme()
            )));
        }

        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => {
                return Err(Error::InvalidPath(format!(
                    "'{input}' has no authority (expected {SCHEME}://<id>/<path>)"
                )));
            }
        };

        let user = match url.username() {
            "" => None,
            u => Some(decode(u)?),
        };

        let mut segments = Vec::new();
        for raw in url.path().split('/').filter(|s| !s.is_empty()) {
            segments.push(decode(raw)?);
        }

        Ok(Self {
            user,
            host,
            path: FolderPath { segments },
        })
    }

    /// Full authority (`user@host` or `host`)
    pub fn authority(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }
}

fn decode(raw: &str) -> Result<String> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|e| Error::InvalidPath(format!("'{raw}' is not valid UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_path_discards_empty_segments() {
        let path = FolderPath::parse("/backups//host-a/");
        assert_eq!(path.segments(), &["backups", "host-a"]);
        assert_eq!(path.to_string(), "/backups/host-a");
    }

    #[test]
    fn test_folder_path_root() {
        assert!(FolderPath::parse("").is_root());
        assert!(FolderPath::parse("///").is_root());
    }

    #[test]
    fn test_parse_installed_app_destination() {
        let dest = Destination::parse("gdrive://1234.apps.googleusercontent.com/backup/laptop")
            .unwrap();
        assert_eq!(dest.user, None);
        assert_eq!(dest.host, "1234.apps.googleusercontent.com");
        assert_eq!(dest.path.segments(), &["backup", "laptop"]);
        assert_eq!(dest.authority(), "1234.apps.googleusercontent.com");
    }

    #[test]
    fn test_parse_service_account_destination() {
        let dest =
            Destination::parse("gdrive://backup@proj.iam.gserviceaccount.com/archive").unwrap();
        assert_eq!(dest.user.as_deref(), Some("backup"));
        assert_eq!(dest.host, "proj.iam.gserviceaccount.com");
        assert_eq!(dest.authority(), "backup@proj.iam.gserviceaccount.com");
    }

    #[test]
    fn test_parse_decodes_segments() {
        let dest = Destination::parse("gdrive://client/my%20backups/2024").unwrap();
        assert_eq!(dest.path.segments(), &["my backups", "2024"]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Destination::parse("s3://bucket/key"),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            Destination::parse("not a url"),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            Destination::parse("gdrive:///path-only"),
            Err(Error::InvalidPath(_))
        ));
    }
}
