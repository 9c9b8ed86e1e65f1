//! Configuration structures for management connections and server lifecycle.
//!
//! [`ManagementConfig`] describes how to reach the HTTP management interface of a server
//! or domain controller. [`LifecycleConfig`] holds the timeouts and poll intervals used
//! while starting, stopping and reloading a server.

use crate::Error;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Default HTTP management port.
pub const DEFAULT_MANAGEMENT_PORT: u16 = 9990;

/// Protocol used to reach the management interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain HTTP
    #[default]
    Http,
    /// HTTP over TLS
    Https,
}

impl Protocol {
    /// Returns the URL scheme.
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "http" | "http-remoting" | "remote+http" => Ok(Self::Http),
            "https" | "https-remoting" | "remote+https" => Ok(Self::Https),
            other => Err(Error::ConfigError(format!(
                "Unsupported management protocol `{other}`"
            ))),
        }
    }
}

/// Connection settings for the management interface.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ManagementConfig {
    /// Protocol of the management interface
    #[serde(default)]
    pub protocol: Protocol,

    /// Host name or address of the management interface
    #[validate(length(min = 1))]
    #[serde(default = "default_host")]
    pub host: String,

    /// Management port
    #[validate(range(min = 1))]
    #[serde(default = "default_port")]
    pub port: u16,

    /// Optional user name for basic authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Optional password for basic authentication
    #[serde(default, skip_serializing, deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,

    /// Request timeout in seconds
    #[validate(range(min = 1, max = 3600))]
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

const fn default_port() -> u16 {
    DEFAULT_MANAGEMENT_PORT
}

const fn default_timeout_secs() -> u64 {
    60
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

impl ManagementConfig {
    /// Create a configuration for the given host and port.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, Error> {
        let config = Self {
            host: host.into(),
            port,
            ..Self::default()
        };

        config
            .validate()
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {e}")))?;

        Ok(config)
    }

    /// Set the protocol.
    #[must_use]
    pub const fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set basic authentication credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Set the request timeout in seconds.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_secs = seconds;
        self
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build the base URL of the management interface.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot form a valid URL.
    pub fn management_url(&self) -> Result<Url, Error> {
        let raw = format!("{}://{}:{}/", self.protocol, self.host, self.port);
        Url::parse(&raw)
            .map_err(|e| Error::ConfigError(format!("Invalid management URL `{raw}`: {e}")))
    }
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Timeouts and intervals used while waiting on a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct LifecycleConfig {
    /// Seconds to wait for the server to reach a running state
    #[validate(range(min = 1))]
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// Graceful shutdown timeout in seconds; `0` means no grace period, `-1` waits indefinitely
    #[validate(range(min = -1))]
    #[serde(default)]
    pub shutdown_timeout_secs: i64,

    /// Interval between state polls while waiting for the server to start
    #[validate(range(min = 10, max = 5000))]
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Interval between polls while waiting for the server to go away
    #[validate(range(min = 1, max = 5000))]
    #[serde(default = "default_shutdown_poll_interval_ms")]
    pub shutdown_poll_interval_ms: u64,
}

const fn default_startup_timeout_secs() -> u64 {
    60
}

const fn default_poll_interval_ms() -> u64 {
    100
}

const fn default_shutdown_poll_interval_ms() -> u64 {
    20
}

impl LifecycleConfig {
    /// Create a lifecycle configuration with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            startup_timeout_secs: default_startup_timeout_secs(),
            shutdown_timeout_secs: 0,
            poll_interval_ms: default_poll_interval_ms(),
            shutdown_poll_interval_ms: default_shutdown_poll_interval_ms(),
        }
    }

    /// Set the startup timeout in seconds.
    #[must_use]
    pub const fn with_startup_timeout(mut self, seconds: u64) -> Self {
        self.startup_timeout_secs = seconds;
        self
    }

    /// Set the graceful shutdown timeout in seconds.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, seconds: i64) -> Self {
        self.shutdown_timeout_secs = seconds;
        self
    }

    /// Set the state poll interval in milliseconds.
    #[must_use]
    pub const fn with_poll_interval(mut self, millis: u64) -> Self {
        self.poll_interval_ms = millis;
        self
    }

    /// Set the shutdown poll interval in milliseconds.
    #[must_use]
    pub const fn with_shutdown_poll_interval(mut self, millis: u64) -> Self {
        self.shutdown_poll_interval_ms = millis;
        self
    }

    /// Get the startup timeout as a Duration.
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Get the poll interval as a Duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get the shutdown poll interval as a Duration.
    #[must_use]
    pub const fn shutdown_poll_interval(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_interval_ms)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self::new()
    }
}
