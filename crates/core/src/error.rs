//! Error types for drivegate
//!
//! Every failure surfaced by the backend falls into one of five kinds
//! (see [`ErrorKind`]). Provider responses are translated through
//! [`Error::from_provider`] so that callers never see raw HTTP shapes.

use std::fmt;

use thiserror::Error;

/// Result type alias using the drivegate Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Provider reason string attached to a 403 when the abuse scan flagged content
pub const ABUSE_REASON: &str = "abuse";

/// Main error type for drivegate operations
#[derive(Error, Debug)]
pub enum Error {
    /// Credential or environment inputs are absent or contradictory
    #[error("Configuration error: {0}")]
    Config(String),

    /// The destination URL or folder path is unusable
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Credential exchange failed or a human must authorize the app
    #[error("Authorization error: {0}")]
    Auth(String),

    /// A named object does not exist where existence was required
    #[error("Not found: {0}")]
    NotFound(String),

    /// Content was flagged by the provider's abuse scan
    #[error("Content flagged by abuse scan: {0}")]
    AbuseFlagged(String),

    /// Transport or provider failure not otherwise classified
    #[error("Transient error: {0}")]
    Transient(String),

    /// Local filesystem failure. A missing local file is `NotFound`; any
    /// other local failure is a `ConfigurationError`, since retrying the
    /// remote store cannot fix it.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The uniform error taxonomy callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigurationError,
    AuthorizationError,
    NotFound,
    Transient,
    QuotaOrAbuseFlag,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ConfigurationError => "configuration",
            ErrorKind::AuthorizationError => "authorization",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Transient => "transient",
            ErrorKind::QuotaOrAbuseFlag => "abuse-flag",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Classify this error into the uniform taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) | Error::InvalidPath(_) => ErrorKind::ConfigurationError,
            Error::Auth(_) => ErrorKind::AuthorizationError,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AbuseFlagged(_) => ErrorKind::QuotaOrAbuseFlag,
            Error::Transient(_) => ErrorKind::Transient,
            Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            Error::Io(_) => ErrorKind::ConfigurationError,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Translate a provider error response into the taxonomy.
    ///
    /// `context` names the operation that failed, e.g. `"list files"`.
    pub fn from_provider(context: &str, err: ProviderError) -> Self {
        let msg = format!("{context} failed: {err}");
        match err.status {
            401 => Error::Auth(msg),
            404 => Error::NotFound(msg),
            403 if err.reason.as_deref() == Some(ABUSE_REASON) => Error::AbuseFlagged(msg),
            _ => Error::Transient(msg),
        }
    }

    /// Wrap a transport-level failure (connect, timeout, cancelled body)
    pub fn transport(context: &str, err: impl fmt::Display) -> Self {
        Error::Transient(format!("{context} failed: {err}"))
    }
}

/// Error shape returned by the remote store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// HTTP status code
    pub status: u16,
    /// First machine-readable reason, if the provider sent one
    pub reason: Option<String>,
    /// Human-readable message
    pub message: String,
}

impl ProviderError {
    pub fn new(status: u16, reason: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.map(str::to_string),
            message: message.into(),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "HTTP {} ({}): {}", self.status, reason, self.message),
            None => write!(f, "HTTP {}: {}", self.status, self.message),
        }
    }
}
