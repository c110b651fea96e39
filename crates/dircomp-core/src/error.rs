/// Error types for the comparison engine.
///
/// Provider failures are classified into an [`ErrorKind`] so the scheduler
/// can record them on the affected node and keep scanning. Only
/// configuration and export failures travel back to callers as `Result`s.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Classification of a per-node failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The path does not exist. Treated as one-sided absence during listing.
    NotFound,
    /// The provider refused access.
    PermissionDenied,
    /// Any other read or listing failure.
    Io,
    /// A followed symlink leads back to one of its own ancestors.
    CyclicLink,
    /// The whole backend is gone (e.g. lost connection to a remote store).
    ProviderUnavailable,
}

impl ErrorKind {
    /// Short label used in status lines and reports.
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::Io => "I/O error",
            ErrorKind::CyclicLink => "cyclic link",
            ErrorKind::ProviderUnavailable => "provider unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A failure reported by a [`FileSystemProvider`](crate::provider::FileSystemProvider).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} at '{}': {message}", .path.display())]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub path: PathBuf,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ErrorKind, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Wrap an `io::Error` raised while accessing `path`.
    pub fn from_io(path: impl Into<PathBuf>, err: &io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::Io,
        };
        Self::new(kind, path, err.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

/// Errors raised while loading or validating a [`CompareConfig`](crate::config::CompareConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption { option: String, reason: String },

    #[error("failed to read configuration: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors raised while writing a comparison report.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write report: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode CSV report: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to encode JSON report: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified() {
        let nf = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert_eq!(ProviderError::from_io("/a", &nf).kind, ErrorKind::NotFound);

        let pd = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(
            ProviderError::from_io("/a", &pd).kind,
            ErrorKind::PermissionDenied
        );

        let other = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        assert_eq!(ProviderError::from_io("/a", &other).kind, ErrorKind::Io);
    }

    #[test]
    fn provider_error_display_mentions_path_and_kind() {
        let err = ProviderError::new(ErrorKind::PermissionDenied, "/secret", "access denied");
        let msg = err.to_string();
        assert!(msg.contains("/secret"));
        assert!(msg.contains("permission denied"));
        assert!(msg.contains("access denied"));
    }

    #[test]
    fn invalid_option_display() {
        let err = ConfigError::InvalidOption {
            option: "worker_count".to_owned(),
            reason: "must be at least 1".to_owned(),
        };
        assert!(err.to_string().contains("worker_count"));
    }
}
