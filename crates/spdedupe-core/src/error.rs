//! Error types for remote calls and service operations.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failure, used for per-item reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Caller supplied invalid input.
    InvalidInput,
    /// The requested resource does not exist.
    NotFound,
    /// The remote rejected our credentials.
    Unauthorized,
    /// Network failure or remote 5xx/429.
    Transport,
    /// The remote returned a structured error.
    RemoteApi,
    /// Local I/O failure.
    Io,
    /// The operation was cancelled.
    Cancelled,
    /// Anything else.
    Unexpected,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput => write!(f, "Invalid input"),
            Self::NotFound => write!(f, "Not found"),
            Self::Unauthorized => write!(f, "Unauthorized"),
            Self::Transport => write!(f, "Transport"),
            Self::RemoteApi => write!(f, "Remote API"),
            Self::Io => write!(f, "IO"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Unexpected => write!(f, "Unexpected"),
        }
    }
}

/// Errors returned by a remote store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Credential rejected or access denied.
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// The addressed item, drive or site does not exist.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Network failure, throttling or a remote 5xx.
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        status: Option<u16>,
        retry_after: Option<Duration>,
    },

    /// Structured error returned by the remote API.
    #[error("{message}")]
    RemoteApi {
        status: u16,
        code: String,
        message: String,
    },

    /// Local I/O error.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// The call was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// Unclassified failure, e.g. an undecodable response body.
    #[error("{message}")]
    Unexpected { message: String },
}

impl RemoteError {
    /// Create a transport error without status information.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    /// Create an unexpected error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::RemoteApi { .. } => ErrorKind::RemoteApi,
            Self::Io { .. } => ErrorKind::Io,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Unexpected { .. } => ErrorKind::Unexpected,
        }
    }

    /// Whether a retry might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Server-requested delay before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transport { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Human-readable issue text for a per-item report.
    pub fn issue_text(&self) -> String {
        match self {
            Self::RemoteApi { message, .. } => format!("Graph API error: {message}"),
            Self::Io { source } => format!("IO error: {source}"),
            Self::Unauthorized { message } => format!("Unauthorized access: {message}"),
            other => other.to_string(),
        }
    }
}

/// Errors surfaced by scan, replacement and verification operations.
#[derive(Debug, Error)]
pub enum DedupeError {
    /// Empty URL, empty scan id, empty selection list, ...
    #[error("{message}")]
    InvalidInput { message: String },

    /// Unknown scan id or shortcut manifest.
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// The operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// A remote call failed in a way the operation could not recover from.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl DedupeError {
    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Remote(err) => err.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_classification() {
        let err = RemoteError::Unauthorized {
            message: "token expired".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(!err.is_transient());
        assert_eq!(err.issue_text(), "Unauthorized access: token expired");

        let err = RemoteError::transport("connection reset");
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.is_transient());
    }

    #[test]
    fn test_remote_api_message_is_verbatim() {
        let err = RemoteError::RemoteApi {
            status: 409,
            code: "nameAlreadyExists".into(),
            message: "The name is already in use".into(),
        };
        assert_eq!(err.to_string(), "The name is already in use");
        assert_eq!(err.issue_text(), "Graph API error: The name is already in use");
    }

    #[test]
    fn test_io_error_conversion() {
        let err: RemoteError =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed").into();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.issue_text().starts_with("IO error: "));
    }

    #[test]
    fn test_dedupe_error_kind_delegates() {
        let err: DedupeError = RemoteError::Cancelled.into();
        assert_eq!(err.kind(), ErrorKind::Cancelled);

        let err = DedupeError::not_found("Scan report", "abc");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Scan report not found: abc");
    }
}
