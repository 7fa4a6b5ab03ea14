//! Error types for the Redis build cache
//!
//! Every failure the host can observe maps onto one of four kinds:
//! communication, materialisation, read, and close. Configuration and IO
//! errors only arise while building a service or inside the CLI.

use thiserror::Error;

/// Boxed source error carried by the wrapping variants
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for the cache
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Store Errors
    // =========================================================================
    /// Transport, authentication, timeout, or pool failure
    #[error("Failed to communicate with Redis: {source}")]
    Communication {
        #[source]
        source: BoxError,
    },

    /// A cached value could not be decoded or handed to the host
    #[error("Unable to materialise cached entry '{key}': {source}")]
    Materialize {
        key: String,
        #[source]
        source: BoxError,
    },

    /// The host-supplied writer failed while producing the value to store
    #[error("Unable to read value to store: {0}")]
    ReadValue(#[source] std::io::Error),

    /// Shutting down the connection pool failed
    #[error("Unable to close connection pool: {source}")]
    Close {
        #[source]
        source: BoxError,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::communication(err)
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Error::communication(err)
    }
}

/// Action the host should take when a cache call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Stop using the remote cache for the rest of the build session
    DisableCache,
    /// Rebuild the artifact and treat the key as uncacheable
    TreatAsUncacheable,
    /// Skip this store; nothing was written
    SkipStore,
    /// Settings must be corrected before a service can be created
    FixConfiguration,
}

impl Error {
    /// Wrap any error as a communication failure
    pub fn communication(source: impl Into<BoxError>) -> Self {
        Error::Communication {
            source: source.into(),
        }
    }

    /// Wrap a decode or sink failure for the given key
    pub fn materialize(key: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Materialize {
            key: key.into(),
            source: source.into(),
        }
    }

    /// Wrap a pool shutdown failure
    pub fn close(source: impl Into<BoxError>) -> Self {
        Error::Close {
            source: source.into(),
        }
    }

    /// Stable name of the failure kind reported to the host
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Communication { .. } => "communication-failure",
            Error::Materialize { .. } => "decode-failure",
            Error::ReadValue(_) => "read-failure",
            Error::Close { .. } => "close-failure",
            Error::Configuration(_) | Error::YamlParse(_) => "configuration-failure",
            Error::Io(_) => "io-failure",
        }
    }

    /// Determine what the host should do about this error
    pub fn action(&self) -> ErrorAction {
        match self {
            Error::Communication { .. } | Error::Close { .. } | Error::Io(_) => {
                ErrorAction::DisableCache
            }
            Error::Materialize { .. } => ErrorAction::TreatAsUncacheable,
            Error::ReadValue(_) => ErrorAction::SkipStore,
            Error::Configuration(_) | Error::YamlParse(_) => ErrorAction::FixConfiguration,
        }
    }

    /// Check if this error came from talking to the store
    pub fn is_communication(&self) -> bool {
        matches!(self, Error::Communication { .. })
    }
}

/// Result type alias for the cache
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io;

    #[test]
    fn test_redis_errors_become_communication_failures() {
        let redis_err = redis::RedisError::from(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        let err: Error = redis_err.into();

        assert_matches!(err, Error::Communication { .. });
        assert!(err.is_communication());
        assert_eq!(err.kind(), "communication-failure");
        assert!(err.to_string().starts_with("Failed to communicate with Redis"));
    }

    #[test]
    fn test_error_actions() {
        let err = Error::communication("pool closed");
        assert_eq!(err.action(), ErrorAction::DisableCache);

        let err = Error::materialize("abc", "invalid byte");
        assert_eq!(err.action(), ErrorAction::TreatAsUncacheable);
        assert_eq!(err.kind(), "decode-failure");
        assert!(err.to_string().contains("'abc'"));

        let err = Error::ReadValue(io::Error::new(io::ErrorKind::Other, "writer failed"));
        assert_eq!(err.action(), ErrorAction::SkipStore);
        assert_eq!(err.kind(), "read-failure");

        let err = Error::Configuration("ttl must be positive".into());
        assert_eq!(err.action(), ErrorAction::FixConfiguration);
    }

    #[test]
    fn test_close_error_keeps_source() {
        let err = Error::close(io::Error::new(io::ErrorKind::Other, "shutdown failed"));
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("shutdown failed"));
        assert_eq!(err.kind(), "close-failure");
    }
}
