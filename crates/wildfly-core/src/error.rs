//! Error types for management operations.
//!
//! This module provides the error type for everything that is not an expected business
//! outcome: transport failures, failed management steps, timeouts while waiting for a server,
//! unexpected process exits and invalid arguments or configuration.
//!
//! Expected deployment failures (duplicate content, wrong topology, missing deployments) are
//! reported through `DeploymentResult` in `wildfly-deployment` and never through this type.

use thiserror::Error;

/// Main error type for management operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The management channel could not deliver the request
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The management endpoint answered with an unexpected HTTP status
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// The management endpoint could not be reached
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The management endpoint rejected the credentials
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A required management operation returned a failed outcome
    #[error("Operation {operation} failed: {description}")]
    OperationFailed {
        /// The operation that was executed, rendered as JSON
        operation: String,
        /// The failure description reported by the server
        description: String,
    },

    /// Timed out waiting for a server to reach the requested state
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The watched server process exited while waiting for it
    #[error("The process has unexpectedly exited with code {}", display_code(.code))]
    ProcessExited {
        /// Exit code of the process, if the platform reported one
        code: Option<i32>,
    },

    /// The request is not valid for the current state of the server
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// An argument was missing, empty or could not be resolved
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A deployment result was asserted to be successful but was not
    #[error("Deployment failed: {0}")]
    Deployment(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Failed to parse a management response
    #[error("Failed to parse management response: {0}")]
    ParseError(String),

    /// Invalid endpoint
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Local I/O failure
    #[error("I/O error: {0}")]
    Io(String),
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
}

/// Specialized result type for management operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT",
            Self::HttpError(_) => "HTTP_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::AuthenticationFailed(_) => "AUTHENTICATION_FAILED",
            Self::OperationFailed { .. } => "OPERATION_FAILED",
            Self::Timeout(_) => "TIMEOUT",
            Self::ProcessExited { .. } => "PROCESS_EXITED",
            Self::IllegalState(_) => "ILLEGAL_STATE",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Deployment(_) => "DEPLOYMENT_FAILED",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::ParseError(_) => "PARSE_ERROR",
            Self::InvalidEndpoint(_) => "INVALID_ENDPOINT",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// Creates an [`Error::OperationFailed`] from the executed operation and its result node.
    #[must_use]
    pub fn operation_failed(operation: &serde_json::Value, result: &serde_json::Value) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            description: crate::operation::failure_description(result),
        }
    }

    /// Returns true if the error originates from the management channel rather than the server.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::HttpError(_)
                | Self::ServiceUnavailable(_)
                | Self::AuthenticationFailed(_)
        )
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_) | Self::ProcessExited { .. } | Self::AuthenticationFailed(_)
        )
    }
}

// Conversions from external error types
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("request timed out: {err}"))
        } else if err.is_connect() {
            Self::ServiceUnavailable(err.to_string())
        } else if err.is_decode() {
            Self::ParseError(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidEndpoint(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::Transport("x".into()).error_code(), "TRANSPORT");
        assert_eq!(Error::Timeout("x".into()).error_code(), "TIMEOUT");
        assert_eq!(
            Error::ProcessExited { code: Some(1) }.error_code(),
            "PROCESS_EXITED"
        );
        assert_eq!(
            Error::OperationFailed {
                operation: "{}".into(),
                description: "boom".into()
            }
            .error_code(),
            "OPERATION_FAILED"
        );
        assert_eq!(Error::IllegalState("x".into()).error_code(), "ILLEGAL_STATE");
        assert_eq!(
            Error::InvalidArgument("x".into()).error_code(),
            "INVALID_ARGUMENT"
        );
        assert_eq!(Error::Deployment("x".into()).error_code(), "DEPLOYMENT_FAILED");
        assert_eq!(Error::Io("x".into()).error_code(), "IO_ERROR");
    }

    #[test]
    fn test_error_display() {
        let err = Error::ProcessExited { code: Some(3) };
        assert_eq!(
            err.to_string(),
            "The process has unexpectedly exited with code 3"
        );

        let err = Error::ProcessExited { code: None };
        assert_eq!(
            err.to_string(),
            "The process has unexpectedly exited with code unknown"
        );

        let err = Error::OperationFailed {
            operation: "stop-servers".into(),
            description: "WFLYCTL0216".into(),
        };
        assert_eq!(err.to_string(), "Operation stop-servers failed: WFLYCTL0216");
    }

    #[test]
    fn test_operation_failed_reads_description() {
        let op = json!({"operation": "shutdown", "address": []});
        let result = json!({"outcome": "failed", "failure-description": "not allowed"});
        match Error::operation_failed(&op, &result) {
            Error::OperationFailed {
                operation,
                description,
            } => {
                assert!(operation.contains("shutdown"));
                assert_eq!(description, "not allowed");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_timeout_and_exit_are_distinct() {
        let timeout = Error::Timeout("slow".into());
        let exited = Error::ProcessExited { code: Some(1) };
        assert_ne!(timeout.error_code(), exited.error_code());
        assert!(!timeout.is_transport());
        assert!(!exited.is_transport());
    }

    #[test]
    fn test_is_transport() {
        assert!(Error::Transport("x".into()).is_transport());
        assert!(Error::ServiceUnavailable("x".into()).is_transport());
        assert!(!Error::IllegalState("x".into()).is_transport());
    }

    #[test]
    fn test_should_log() {
        assert!(Error::ConfigError("x".into()).should_log());
        assert!(Error::ProcessExited { code: None }.should_log());
        assert!(!Error::Timeout("x".into()).should_log());
        assert!(!Error::InvalidArgument("x".into()).should_log());
    }

    #[test]
    fn test_from_url_parse_error() {
        let err = url::Url::parse("not a url").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::InvalidEndpoint(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let err = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::ParseError(_)));
    }

    #[test]
    fn test_from_io_error() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let converted: Error = err.into();
        assert_eq!(converted, Error::Io("missing".into()));
    }

    #[test]
    fn test_error_clone() {
        let err = Error::IllegalState("test".to_string());
        assert_eq!(err.clone(), err);
    }
}
