//! Container and server state types.
//!
//! This module provides the description of the running container (product, version and
//! launch type), the controller process states reported by `server-state` and `host-state`,
//! the running mode of a host and the status of managed servers in a domain.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::client::ManagementClient;
use crate::error::{Error, Result};
use crate::operation::{self, Address, Operation};

/// Controller process state while the controller boots.
pub const CONTROLLER_PROCESS_STATE_STARTING: &str = "starting";
/// Controller process state while the controller shuts down.
pub const CONTROLLER_PROCESS_STATE_STOPPING: &str = "stopping";
/// Controller process state once boot completed.
pub const CONTROLLER_PROCESS_STATE_RUNNING: &str = "running";
/// Controller process state when a reload is pending.
pub const CONTROLLER_PROCESS_STATE_RELOAD_REQUIRED: &str = "reload-required";
/// Controller process state when a restart is pending.
pub const CONTROLLER_PROCESS_STATE_RESTART_REQUIRED: &str = "restart-required";

/// Returns true if the process state is neither starting nor stopping.
#[must_use]
pub fn is_settled_state(state: &str) -> bool {
    state != CONTROLLER_PROCESS_STATE_STARTING && state != CONTROLLER_PROCESS_STATE_STOPPING
}

/// How the container was launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LaunchType {
    /// A single standalone server
    Standalone,
    /// A host controller of a managed domain
    Domain,
    /// An embedded server
    Embedded,
    /// A server hosted by an application server container
    Appclient,
}

impl LaunchType {
    /// Returns the launch type as reported by the management model.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Standalone => "STANDALONE",
            Self::Domain => "DOMAIN",
            Self::Embedded => "EMBEDDED",
            Self::Appclient => "APPCLIENT",
        }
    }
}

impl FromStr for LaunchType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "STANDALONE" => Ok(Self::Standalone),
            "DOMAIN" => Ok(Self::Domain),
            "EMBEDDED" => Ok(Self::Embedded),
            "APPCLIENT" => Ok(Self::Appclient),
            _ => Err(Error::ParseError(format!("Unknown launch type: {s}"))),
        }
    }
}

impl fmt::Display for LaunchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Running mode of a server or host controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunningMode {
    /// Normal operation
    Normal,
    /// Only the management interfaces are available
    AdminOnly,
}

impl FromStr for RunningMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NORMAL" => Ok(Self::Normal),
            "ADMIN_ONLY" => Ok(Self::AdminOnly),
            _ => Err(Error::ParseError(format!("Unknown running mode: {s}"))),
        }
    }
}

/// Status of a managed server as reported by its host controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    /// The server is running
    Started,
    /// The server is booting
    Starting,
    /// The server is not running
    Stopped,
    /// The server is shutting down
    Stopping,
    /// The server is configured not to start
    Disabled,
    /// The server failed to start
    Failed,
    /// The host does not know the server
    DoesNotExist,
    /// The status could not be determined
    Unknown,
}

impl ServerStatus {
    /// Returns true if the server counts as settled when waiting for a domain to start.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Started | Self::Disabled)
    }

    /// Returns true if the server process is still up.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Started | Self::Starting | Self::Stopping)
    }
}

impl FromStr for ServerStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "STARTED" => Ok(Self::Started),
            "STARTING" => Ok(Self::Starting),
            "STOPPED" => Ok(Self::Stopped),
            "STOPPING" => Ok(Self::Stopping),
            "DISABLED" => Ok(Self::Disabled),
            "FAILED" => Ok(Self::Failed),
            "DOES_NOT_EXIST" => Ok(Self::DoesNotExist),
            "UNKNOWN" => Ok(Self::Unknown),
            _ => Err(Error::ParseError(format!("Unknown server status: {s}"))),
        }
    }
}

/// Identity of a managed server within a domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerIdentity {
    /// Host the server runs on
    pub host: String,
    /// Server configuration name
    pub server: String,
}

/// Describes the container behind a management connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescription {
    product_name: String,
    product_version: Option<String>,
    release_version: Option<String>,
    launch_type: Option<String>,
    domain: bool,
}

impl ContainerDescription {
    /// Build a description from the result of a root `read-resource`.
    #[must_use]
    pub fn from_model(model: &Value) -> Self {
        let launch_type = defined_string(model, "launch-type");
        let domain = launch_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(LaunchType::Domain.name()));
        Self {
            product_name: defined_string(model, "product-name")
                .unwrap_or_else(|| "WildFly".to_string()),
            product_version: defined_string(model, "product-version"),
            release_version: defined_string(model, "release-version"),
            launch_type,
            domain,
        }
    }

    /// Query the container for its description.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the root resource cannot be read, or the transport
    /// error if the request could not be delivered.
    pub async fn lookup(client: &dyn ManagementClient) -> Result<Self> {
        let op = Operation::read_resource(Address::root()).with_param("include-runtime", true);
        let body = op.to_json();
        let result = client.execute(op.into()).await?;
        if operation::is_success(&result) {
            return Ok(Self::from_model(operation::read_result(&result)));
        }
        Err(Error::operation_failed(&body, &result))
    }

    /// The product name, `WildFly` when the server does not report one.
    #[must_use]
    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    /// The product version.
    #[must_use]
    pub fn product_version(&self) -> Option<&str> {
        self.product_version.as_deref()
    }

    /// The core release version.
    #[must_use]
    pub fn release_version(&self) -> Option<&str> {
        self.release_version.as_deref()
    }

    /// The launch type as reported by the server.
    #[must_use]
    pub fn launch_type(&self) -> Option<&str> {
        self.launch_type.as_deref()
    }

    /// Returns true if the container is a managed domain.
    #[must_use]
    pub const fn is_domain(&self) -> bool {
        self.domain
    }
}

impl fmt::Display for ContainerDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.product_name)?;
        match (&self.product_version, &self.release_version) {
            (Some(product), Some(release)) => write!(f, " {product} (WildFly Core {release})")?,
            (Some(product), None) => write!(f, " {product}")?,
            (None, Some(release)) => write!(f, " {release}")?,
            (None, None) => {}
        }
        if let Some(launch_type) = &self.launch_type {
            write!(f, " - launch-type: {launch_type}")?;
        }
        Ok(())
    }
}

fn defined_string(model: &Value, key: &str) -> Option<String> {
    match model.get(key) {
        None | Some(Value::Null) => None,
        Some(value) => Some(operation::value_as_string(value)),
    }
}
