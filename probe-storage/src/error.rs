//! Object Store Error Types
//!
//! The `Display` output of every variant is used verbatim as the `error`
//! label on the prober's error counter, so messages must stay stable and
//! free of per-request noise such as request ids.

use thiserror::Error;

/// Object store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The provider rejected the request
    #[error("{message}")]
    Service {
        /// Provider error code (e.g. `AccessDenied`)
        code: Option<String>,
        /// Human-readable message, falls back to the code
        message: String,
    },

    /// Request never completed (DNS, connect, TLS, timeout, body stream)
    #[error("{0}")]
    Transport(String),

    /// Local file could not be read or written
    #[error("Local I/O error: {0}")]
    Io(String),

    /// Client could not be built
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    /// Build a service error from provider metadata
    pub fn service(code: Option<&str>, message: Option<&str>) -> Self {
        let message = message
            .or(code)
            .unwrap_or("unknown service error")
            .to_string();
        Self::Service {
            code: code.map(str::to_string),
            message,
        }
    }

    /// Build a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Object store result type
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_prefers_message() {
        let err = StoreError::service(Some("AccessDenied"), Some("Access Denied"));
        assert_eq!(err.to_string(), "Access Denied");
    }

    #[test]
    fn test_service_error_falls_back_to_code() {
        let err = StoreError::service(Some("SlowDown"), None);
        assert_eq!(err.to_string(), "SlowDown");

        let err = StoreError::service(None, None);
        assert_eq!(err.to_string(), "unknown service error");
    }

    #[test]
    fn test_transport_error_is_bare_message() {
        let err = StoreError::transport("connection reset");
        assert_eq!(err.to_string(), "connection reset");
    }
}
