use std::path::PathBuf;

/// Result type alias for remcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for remcache operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Remote object-store failures other than a clean miss
    #[error("backend error for key '{key}': {message}")]
    Backend { key: String, message: String },

    /// Local staging-file failures
    #[error("staging {operation} failed for '{path}': {source}")]
    Staging {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// A remote entry exists but a metadata field cannot be decoded
    #[error("corrupt metadata field '{field}' for key '{key}': {message}")]
    Metadata {
        key: String,
        field: String,
        message: String,
    },

    /// Wire-protocol violations. The caller is trusted, so these are fatal.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Missing or invalid startup configuration
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Protocol {
            message: error.to_string(),
        }
    }
}

// Helper methods for creating errors with context
impl Error {
    /// Create a backend error for a remote key
    #[must_use]
    pub fn backend(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Backend {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a staging-file error with context
    #[must_use]
    pub fn staging(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::Staging {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Create a metadata corruption error
    #[must_use]
    pub fn metadata(
        key: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Metadata {
            key: key.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a protocol error
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Whether this error must abort the whole process rather than a single
    /// request
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Protocol { .. } | Error::Configuration { .. })
    }
}
