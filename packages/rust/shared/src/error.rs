//! Error types for reelfill.
//!
//! Library crates use [`ReelfillError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all reelfill operations.
#[derive(Debug, thiserror::Error)]
pub enum ReelfillError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport, timeout, or HTTP status failure talking to the remote API.
    #[error("network error: {0}")]
    Network(String),

    /// A persisted document or remote payload could not be decoded.
    #[error("decode error in {what}: {message}")]
    Decode { what: String, message: String },

    /// A value could not be serialized for persistence.
    #[error("encode error in {what}: {message}")]
    Encode { what: String, message: String },

    /// Two checkpoint records share a local id.
    #[error("duplicate local id {local_id} in checkpoint")]
    DuplicateId { local_id: String },

    /// The number of bytes on disk differs from the number of bytes encoded.
    #[error("short write at {path:?}: expected {expected} bytes, wrote {written}")]
    ShortWrite {
        path: PathBuf,
        expected: u64,
        written: u64,
    },

    /// Tabular input could not be parsed.
    #[error("input error: {message}")]
    Input { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// One or more items failed remote enrichment.
    #[error("{count} item(s) failed enrichment:\n{report}")]
    RemoteFailures { count: usize, report: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ReelfillError>;

impl ReelfillError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an input error from any displayable message.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input {
            message: msg.into(),
        }
    }

    /// Create a decode error for the named document or payload.
    pub fn decode(what: impl Into<String>, msg: impl std::fmt::Display) -> Self {
        Self::Decode {
            what: what.into(),
            message: msg.to_string(),
        }
    }

    /// Create an encode error for the named document.
    pub fn encode(what: impl Into<String>, msg: impl std::fmt::Display) -> Self {
        Self::Encode {
            what: what.into(),
            message: msg.to_string(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ReelfillError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = ReelfillError::DuplicateId {
            local_id: "42".into(),
        };
        assert_eq!(err.to_string(), "duplicate local id 42 in checkpoint");

        let err = ReelfillError::ShortWrite {
            path: PathBuf::from("/tmp/cp.json"),
            expected: 10,
            written: 4,
        };
        assert!(err.to_string().contains("expected 10 bytes, wrote 4"));
    }

    #[test]
    fn remote_failures_lists_report() {
        let err = ReelfillError::RemoteFailures {
            count: 1,
            report: "3 (tt3): network error: timeout".into(),
        };
        let text = err.to_string();
        assert!(text.starts_with("1 item(s) failed enrichment"));
        assert!(text.contains("3 (tt3)"));
    }
}
