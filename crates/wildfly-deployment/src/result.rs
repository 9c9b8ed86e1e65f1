//! Outcome of a deployment operation.

use serde_json::Value;
use std::fmt;
use wildfly_core::operation;
use wildfly_core::Error;

use crate::Result;

/// The outcome of one composite deployment operation.
///
/// Expected failures (wrong topology, duplicate or missing deployments, operations rejected by
/// the server) are reported here rather than as an [`Error`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentResult {
    successful: bool,
    failure_message: Option<String>,
    result: Value,
}

impl DeploymentResult {
    /// The successful result of an operation that had nothing to do.
    #[must_use]
    pub const fn successful_noop() -> Self {
        Self {
            successful: true,
            failure_message: None,
            result: Value::Null,
        }
    }

    /// Wrap the result node returned by the server.
    #[must_use]
    pub fn from_result_node(result: Value) -> Self {
        let successful = operation::is_success(&result);
        let failure_message = (!successful).then(|| operation::failure_description(&result));
        Self {
            successful,
            failure_message,
            result,
        }
    }

    /// A failed result that never reached the server.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            successful: false,
            failure_message: Some(message.into()),
            result: Value::Null,
        }
    }

    /// Whether the operation succeeded.
    #[must_use]
    pub const fn successful(&self) -> bool {
        self.successful
    }

    /// The failure message; `None` on success.
    #[must_use]
    pub fn failure_message(&self) -> Option<&str> {
        self.failure_message.as_deref()
    }

    /// The raw result node; `Null` for results that never reached the server.
    #[must_use]
    pub const fn result(&self) -> &Value {
        &self.result
    }

    /// Turn a failed result into an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Deployment`] with the failure message if the operation failed.
    pub fn assert_success(&self) -> Result<()> {
        if self.successful {
            Ok(())
        } else {
            Err(Error::Deployment(
                self.failure_message.clone().unwrap_or_default(),
            ))
        }
    }
}

impl From<Value> for DeploymentResult {
    fn from(result: Value) -> Self {
        Self::from_result_node(result)
    }
}

impl fmt::Display for DeploymentResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure_message {
            None if self.successful => f.write_str("successful"),
            Some(message) => write!(f, "failed: {message}"),
            None => f.write_str("failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn noop_is_successful() {
        let result = DeploymentResult::successful_noop();
        assert!(result.successful());
        assert!(result.failure_message().is_none());
        assert!(result.result().is_null());
        assert!(result.assert_success().is_ok());
        assert_eq!(result.to_string(), "successful");
    }

    #[test]
    fn failed_result_node_carries_description() {
        let node = json!({
            "outcome": "failed",
            "failure-description": "WFLYCTL0212: Duplicate resource [(\"deployment\" => \"app.war\")]",
            "rolled-back": true
        });
        let result = DeploymentResult::from(node.clone());
        assert!(!result.successful());
        assert!(result.failure_message().unwrap().contains("WFLYCTL0212"));
        assert_eq!(result.result(), &node);

        match result.assert_success().unwrap_err() {
            Error::Deployment(message) => assert!(message.contains("Duplicate resource")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn successful_result_node() {
        let node = json!({"outcome": "success", "result": {"step-1": {"outcome": "success"}}});
        let result = DeploymentResult::from_result_node(node);
        assert!(result.successful());
        assert!(result.failure_message().is_none());
    }

    #[test]
    fn failed_without_server() {
        let result = DeploymentResult::failed("No server groups were defined");
        assert!(!result.successful());
        assert_eq!(result.to_string(), "failed: No server groups were defined");
    }
}
