//! Error types for datapi
//!
//! Every failure a command can end in is one variant of [`Error`]. The
//! variants fall into four families:
//!
//! - **Configuration**: no usable transport, malformed endpoint URL
//! - **Transport**: the HTTP exchange could not be completed, possibly after
//!   several attempts
//! - **Application**: the Data API answered with one or more structured error
//!   descriptors ([`Error::DataApi`])
//! - **Mapping**: the response does not hold what the caller asked for
//!   ([`Error::State`])
//!
//! Only transport failures are retried, and only inside the retry transport.
//! An application error is never transient, so it carries the complete
//! [`ExecutionInfo`] of the failing call instead.
//!
//! # Examples
//!
//! ```rust
//! use datapi_core::{Error, TransportError};
//!
//! let error = Error::Transport(TransportError::timeout("no response after 30s"));
//! assert!(error.is_retryable());
//!
//! let error = Error::State("no documents returned".into());
//! assert!(!error.is_retryable());
//! ```

use crate::execution::ExecutionInfo;
use crate::types::ErrorDescriptor;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for datapi operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a datapi operation
///
/// Cloneable so the same error can be stored in an [`ExecutionInfo`] handed
/// to observers and returned to the caller.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Options are missing or inconsistent (e.g. no HTTP client options)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The endpoint could not be turned into a request URL
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Parser message
        reason: String,
    },

    /// A single HTTP exchange failed
    #[error("Transport error: {0}")]
    Transport(TransportError),

    /// Every attempt allowed by the retry policy failed
    #[error("Request failed after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// The failure observed on the last attempt
        last_error: TransportError,
    },

    /// Non-2xx response whose body carries no structured errors
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// The Data API reported one or more errors
    ///
    /// Holds the full execution context so the failing request can be
    /// reproduced from the error alone.
    #[error("{}", describe_api_errors(.0))]
    DataApi(Arc<ExecutionInfo>),

    /// Conversion between Rust values and JSON failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The response cannot be mapped to the requested shape
    #[error("Invalid state: {0}")]
    State(String),
}

/// Coarse classification of an [`Error`], used for metrics and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Configuration and URL errors
    Configuration,
    /// Transport errors, including exhausted retries
    Transport,
    /// Non-2xx HTTP status without error descriptors
    Http,
    /// Errors reported by the Data API
    Application,
    /// Codec failures
    Serialization,
    /// Mapping errors
    State,
}

impl ErrorKind {
    /// Stable lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Transport => "transport",
            ErrorKind::Http => "http",
            ErrorKind::Application => "application",
            ErrorKind::Serialization => "serialization",
            ErrorKind::State => "state",
        }
    }
}

impl Error {
    /// Shorthand for a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// Shorthand for a serialization error
    pub fn serialization(err: impl fmt::Display) -> Self {
        Error::Serialization(err.to_string())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) | Error::InvalidUrl { .. } => ErrorKind::Configuration,
            Error::Transport(_) | Error::RetriesExhausted { .. } => ErrorKind::Transport,
            Error::Http { .. } => ErrorKind::Http,
            Error::DataApi(_) => ErrorKind::Application,
            Error::Serialization(_) => ErrorKind::Serialization,
            Error::State(_) => ErrorKind::State,
        }
    }

    /// Whether another attempt of the same request may succeed
    ///
    /// Exhausted retries are terminal even though they stem from transport
    /// failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Execution context attached to an application error
    pub fn execution_info(&self) -> Option<&ExecutionInfo> {
        match self {
            Error::DataApi(info) => Some(info),
            _ => None,
        }
    }

    /// Error descriptors reported by the Data API, empty for other variants
    pub fn api_errors(&self) -> &[ErrorDescriptor] {
        self.execution_info()
            .and_then(|info| info.response())
            .map(|response| response.errors())
            .unwrap_or_default()
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

fn describe_api_errors(info: &ExecutionInfo) -> String {
    let errors = info.response().map(|r| r.errors()).unwrap_or_default();
    let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!(
        "Data API returned {} error(s) for command '{}': {}",
        errors.len(),
        info.command_name(),
        details.join("; ")
    )
}

/// What went wrong during a single HTTP exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// DNS resolution or TCP/TLS connection failure
    Connect,
    /// No response within the configured timeout
    Timeout,
    /// The server answered with a status worth retrying (5xx, 408, 429)
    Status(u16),
    /// Anything else reported by the HTTP stack
    Other,
}

/// Failure of one HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    /// Failure category
    pub kind: TransportErrorKind,
    /// Human readable detail
    pub message: String,
}

impl TransportError {
    /// Create a transport error of the given kind
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Connection failure
    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    /// Timeout
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    /// Retryable HTTP status
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Status(status), body)
    }

    /// Failure without a better category
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    /// Connect, timeout and status failures are transient; others are not
    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind, TransportErrorKind::Other)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TransportErrorKind::Connect => write!(f, "connection failed: {}", self.message),
            TransportErrorKind::Timeout => write!(f, "timed out: {}", self.message),
            TransportErrorKind::Status(status) => write!(f, "HTTP {}: {}", status, self.message),
            TransportErrorKind::Other => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for TransportError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Serializer;
    use crate::types::DataApiResponse;
    use serde_json::json;

    fn failing_info() -> ExecutionInfo {
        let response: DataApiResponse = Serializer::default()
            .unmarshall(
                r#"{"errors":[{"errorCode":"DOCUMENT_ALREADY_EXISTS","message":"Document already exists with the given _id"}]}"#,
            )
            .unwrap();
        ExecutionInfo::builder("insertOne", json!({"insertOne": {"document": {"_id": "1"}}}))
            .response(response)
            .build()
    }

    #[test]
    fn test_transport_error_retryable() {
        assert!(TransportError::connect("refused").is_retryable());
        assert!(TransportError::timeout("30s").is_retryable());
        assert!(TransportError::status(503, "unavailable").is_retryable());
        assert!(!TransportError::other("builder error").is_retryable());
    }

    #[test]
    fn test_exhausted_retries_are_terminal() {
        let error = Error::RetriesExhausted {
            attempts: 3,
            last_error: TransportError::connect("refused"),
        };
        assert!(!error.is_retryable());
        assert_eq!(error.kind(), ErrorKind::Transport);
        assert!(error.to_string().contains("3 attempt(s)"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::configuration("x").kind(), ErrorKind::Configuration);
        let invalid = Error::InvalidUrl {
            url: "::".into(),
            reason: "relative URL without a base".into(),
        };
        assert_eq!(invalid.kind(), ErrorKind::Configuration);
        assert_eq!(Error::State("x".into()).kind().as_str(), "state");
        let http = Error::Http {
            status: 401,
            body: "unauthorized".into(),
        };
        assert_eq!(http.kind(), ErrorKind::Http);
    }

    #[test]
    fn test_data_api_error_display() {
        let error = Error::DataApi(Arc::new(failing_info()));
        let display = error.to_string();

        assert!(display.contains("1 error(s)"));
        assert!(display.contains("insertOne"));
        assert!(display.contains("DOCUMENT_ALREADY_EXISTS"));
        assert_eq!(error.kind(), ErrorKind::Application);
    }

    #[test]
    fn test_api_errors_accessor() {
        let error = Error::DataApi(Arc::new(failing_info()));
        assert_eq!(error.api_errors().len(), 1);
        assert_eq!(
            error.api_errors()[0].error_code.as_deref(),
            Some("DOCUMENT_ALREADY_EXISTS")
        );

        assert!(Error::State("x".into()).api_errors().is_empty());
    }

    #[test]
    fn test_from_serde_error() {
        let serde_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error: Error = serde_error.into();
        match error {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }
}
