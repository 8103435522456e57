//! Process exit codes
//!
//! Scripts branch on these, so existing values must never change.

use dg_core::{Error, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    /// Bad arguments, destination URL or configuration
    UsageError = 2,
    /// Transport or provider failure that may succeed on a later run
    NetworkError = 3,
    AuthError = 4,
    NotFound = 5,
    /// Content flagged by the provider's abuse scan
    ContentFlagged = 6,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_error(error: &Error) -> Self {
        Self::from(error.kind())
    }
}

impl From<ErrorKind> for ExitCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::ConfigurationError => ExitCode::UsageError,
            ErrorKind::AuthorizationError => ExitCode::AuthError,
            ErrorKind::NotFound => ExitCode::NotFound,
            ErrorKind::Transient => ExitCode::NetworkError,
            ErrorKind::QuotaOrAbuseFlag => ExitCode::ContentFlagged,
        }
    }
}
