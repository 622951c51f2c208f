//! Error types for Amicus.
//!
//! Library crates use [`AmicusError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::sync::Arc;

/// Top-level error type for all Amicus operations.
///
/// Cloneable so a failed session can hand out its error more than once.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AmicusError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network failure while opening or consuming the response stream.
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport gave up waiting for the backend.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The generative backend answered with an error.
    #[error("backend error (status {status}): {message}")]
    Backend { status: u16, message: String },

    /// The session was aborted by the caller.
    #[error("request cancelled")]
    Cancelled,

    /// A query was submitted while another one is still streaming.
    #[error("another query is already in progress")]
    Busy,

    /// An operation was invoked in a session state that does not allow it.
    #[error("invalid session state: {message}")]
    InvalidState { message: String },

    /// Input validation error (empty question, malformed transcript, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The attachment's type is not one we can extract text from.
    #[error("unsupported file type for '{name}': upload a PDF or DOCX")]
    UnsupportedAttachment { name: String },

    /// The attachment exceeds the configured size limit.
    #[error("'{name}' is too large ({size} bytes, max {limit} bytes)")]
    AttachmentTooLarge { name: String, size: u64, limit: u64 },

    /// The attachment content could not be read as its declared type.
    #[error("could not extract text from '{name}': {reason}")]
    AttachmentExtractionFailed { name: String, reason: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: Arc<std::io::Error>,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AmicusError>;

impl AmicusError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an invalid-state error from any displayable message.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    /// Create an extraction failure for the named attachment.
    pub fn extraction(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AttachmentExtractionFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Whether this error ended a streaming session (as opposed to a
    /// configuration or attachment problem raised before streaming began).
    pub fn is_stream_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::Backend { .. } | Self::Cancelled
        )
    }

    /// Whether this error was raised while ingesting an attachment.
    pub fn is_attachment_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedAttachment { .. }
                | Self::AttachmentTooLarge { .. }
                | Self::AttachmentExtractionFailed { .. }
        )
    }

    /// Detail text embedded in user-facing failure messages.
    ///
    /// Transport and backend failures surface their underlying message
    /// verbatim; everything else falls back to the `Display` form.
    pub fn detail(&self) -> String {
        match self {
            Self::Transport(msg) | Self::Timeout(msg) => msg.clone(),
            Self::Backend { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = AmicusError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = AmicusError::AttachmentTooLarge {
            name: "informe.pdf".into(),
            size: 20,
            limit: 10,
        };
        assert!(err.to_string().contains("informe.pdf"));
        assert!(err.to_string().contains("max 10 bytes"));
    }

    #[test]
    fn stream_failures_are_grouped() {
        assert!(AmicusError::Transport("reset".into()).is_stream_failure());
        assert!(AmicusError::Timeout("30s".into()).is_stream_failure());
        assert!(AmicusError::Cancelled.is_stream_failure());
        assert!(!AmicusError::Busy.is_stream_failure());
        assert!(!AmicusError::extraction("a.pdf", "bad xref").is_stream_failure());
        assert!(AmicusError::extraction("a.pdf", "bad xref").is_attachment_error());
        assert!(!AmicusError::io("a.pdf", std::io::Error::other("denied")).is_attachment_error());
    }

    #[test]
    fn detail_is_verbatim_for_backend_errors() {
        let err = AmicusError::Backend {
            status: 429,
            message: "quota exceeded".into(),
        };
        assert_eq!(err.detail(), "quota exceeded");
        assert_eq!(AmicusError::Cancelled.detail(), "request cancelled");
    }
}
