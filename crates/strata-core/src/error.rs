//! Error types for Strata.
//!
//! One taxonomy is shared by every Strata crate. Fatal classes (registration,
//! storage, index engine, writer timeout) are propagated to the immediate
//! caller; soft outcomes such as an unknown model name in a search are not
//! errors at all and never reach this type.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Result type alias for Strata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Strata.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed entity descriptor, raised at registration time.
    #[error("Registration error for '{entity}': {message}")]
    Registration {
        /// Entity type (or index name) being registered.
        entity: String,
        /// What was wrong with the descriptor.
        message: String,
    },

    /// Storage failure (index directory creation, metadata files).
    #[error("I/O error{}: {source}", at_path(.path))]
    Io {
        /// Path involved, if known.
        path: Option<PathBuf>,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failure reported by the full-text index engine.
    #[error("Index error: {message}")]
    Index {
        /// Engine message, surfaced unchanged.
        message: String,
    },

    /// Reopened index has a different schema than the one derived now.
    #[error("Schema mismatch for index '{index}': expected {expected}, found {found}")]
    SchemaMismatch {
        /// Index name.
        index: String,
        /// Fingerprint of the derived schema.
        expected: String,
        /// Fingerprint of the on-disk schema.
        found: String,
    },

    /// Writer lock not obtained within the bounded wait.
    #[error("Timed out after {timeout:?} waiting for the writer of index '{index}'")]
    WriterTimeout {
        /// Index name.
        index: String,
        /// The wait that elapsed.
        timeout: Duration,
    },

    /// Entity value cannot be converted to its field's search type.
    #[error("Invalid value '{value}' for field '{field}': expected {expected}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Canonical text of the offending value.
        value: String,
        /// Expected type.
        expected: &'static str,
    },

    /// Registry lookup by name failed.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What was looked up (e.g. "index").
        kind: &'static str,
        /// The name that did not resolve.
        name: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// What configuration is problematic.
        message: String,
    },

    /// Internal operation failure.
    #[error("Operation failed: {message}")]
    Operation {
        /// What went wrong.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns whether the caller may reasonably retry the operation.
    ///
    /// Writer timeouts resolve once the competing writer commits; I/O errors
    /// may be transient. Everything else is permanent for the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::WriterTimeout { .. } | Error::Io { .. })
    }

    /// Creates a registration error.
    pub fn registration<E, M>(entity: E, message: M) -> Self
    where
        E: Into<String>,
        M: Into<String>,
    {
        Error::Registration {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Creates an I/O error annotated with the path involved.
    pub fn io_with_path(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Error::Io {
            path: Some(path.as_ref().to_path_buf()),
            source,
        }
    }

    /// Creates an index engine error.
    pub fn index<S: Into<String>>(message: S) -> Self {
        Error::Index {
            message: message.into(),
        }
    }

    /// Creates a writer timeout error.
    pub fn writer_timeout<S: Into<String>>(index: S, timeout: Duration) -> Self {
        Error::WriterTimeout {
            index: index.into(),
            timeout,
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value<F, V>(field: F, value: V, expected: &'static str) -> Self
    where
        F: Into<String>,
        V: Into<String>,
    {
        Error::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected,
        }
    }

    /// Creates a not-found error.
    pub fn not_found<S: Into<String>>(name: S, kind: &'static str) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Creates an operation error.
    pub fn operation<S: Into<String>>(message: S) -> Self {
        Error::Operation {
            message: message.into(),
        }
    }
}

fn at_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" at {}", p.display()))
        .unwrap_or_default()
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io { path: None, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::registration("User", "field without a name");
        assert_eq!(
            err.to_string(),
            "Registration error for 'User': field without a name"
        );
    }

    #[test]
    fn test_io_error_display_with_path() {
        let err = Error::io_with_path(
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            "/tmp/indexes/User",
        );
        assert_eq!(err.to_string(), "I/O error at /tmp/indexes/User: denied");
    }

    #[test]
    fn test_io_error_display_without_path() {
        let err: Error = std::io::Error::other("disk gone").into();
        assert_eq!(err.to_string(), "I/O error: disk gone");
    }

    #[test]
    fn test_writer_timeout_display() {
        let err = Error::writer_timeout("User", Duration::from_secs(2));
        assert_eq!(
            err.to_string(),
            "Timed out after 2s waiting for the writer of index 'User'"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::writer_timeout("User", Duration::from_millis(10)).is_retryable());
        assert!(Error::from(std::io::Error::other("x")).is_retryable());
        assert!(!Error::registration("User", "bad").is_retryable());
        assert!(!Error::index("corrupt segment").is_retryable());
        assert!(!Error::config("bad").is_retryable());
    }

    #[test]
    fn test_invalid_value() {
        let err = Error::invalid_value("age", "abc", "integer");
        let Error::InvalidValue {
            field,
            value,
            expected,
        } = err
        else {
            unreachable!("Expected InvalidValue error variant");
        };
        assert_eq!(field, "age");
        assert_eq!(value, "abc");
        assert_eq!(expected, "integer");
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::not_found("Ghost", "index");
        assert_eq!(err.to_string(), "index not found: Ghost");
    }

    #[test]
    fn test_serde_error_conversion() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
        let err: Error = serde_err.into();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_implements_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
