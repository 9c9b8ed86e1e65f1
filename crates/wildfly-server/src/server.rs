//! A managed server instance.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use wildfly_core::config::LifecycleConfig;
use wildfly_core::{Error, ManagementClient};

use crate::helper;
use crate::process::{CommandSpec, OutputSink, ProcessHandle, ServerProcess, SharedOutput};
use crate::Result;

/// The kind of server being managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    /// A single standalone server
    Standalone,
    /// A host controller and its managed servers
    Domain,
}

impl ServerType {
    /// Base name of the launch script in the installation's `bin` directory.
    #[must_use]
    pub const fn script_name(&self) -> &'static str {
        match self {
            Self::Standalone => "standalone",
            Self::Domain => "domain",
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.script_name())
    }
}

impl FromStr for ServerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "standalone" => Ok(Self::Standalone),
            "domain" => Ok(Self::Domain),
            _ => Err(Error::ParseError(format!("Unknown server type: {s}"))),
        }
    }
}

/// A server launched from a local installation and controlled over its management channel.
///
/// The management channel is shared with the caller and never closed here.
pub struct Server {
    server_type: ServerType,
    home: PathBuf,
    command: CommandSpec,
    client: Arc<dyn ManagementClient>,
    config: LifecycleConfig,
    output: Option<SharedOutput>,
    process: Option<ServerProcess>,
}

impl Server {
    /// A server of `server_type` for the installation at `home`, launched with its default
    /// script.
    pub fn new(
        server_type: ServerType,
        home: impl Into<PathBuf>,
        client: Arc<dyn ManagementClient>,
    ) -> Self {
        let home = home.into();
        Self {
            server_type,
            command: CommandSpec::for_server(server_type, &home),
            home,
            client,
            config: LifecycleConfig::new(),
            output: None,
            process: None,
        }
    }

    /// Replace the launch command.
    #[must_use]
    pub fn with_command(mut self, command: CommandSpec) -> Self {
        self.command = command;
        self
    }

    /// Set the polling and shutdown configuration.
    #[must_use]
    pub fn with_config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    /// Copy the server's stdout and stderr into `sink` instead of inheriting them.
    ///
    /// The sink is kept for every start of this server, including retries after a failed start.
    #[must_use]
    pub fn with_output(mut self, sink: OutputSink) -> Self {
        self.output = Some(Arc::new(Mutex::new(sink)));
        self
    }

    /// The server type.
    #[must_use]
    pub const fn server_type(&self) -> ServerType {
        self.server_type
    }

    /// The installation directory.
    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// The running process, if the server was started.
    #[must_use]
    pub const fn process(&self) -> Option<&ServerProcess> {
        self.process.as_ref()
    }

    /// Launch the server and wait up to `timeout` for it to be running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for an invalid installation, [`Error::IllegalState`] if
    /// this instance already started a process, [`Error::ProcessExited`] if the process dies
    /// during startup, or [`Error::Timeout`]. On failure the process is gone.
    pub async fn start(&mut self, timeout: Duration) -> Result<()> {
        if !helper::is_valid_home_directory(&self.home) {
            return Err(Error::ConfigError(format!(
                "The server home directory {} is not a valid installation",
                self.home.display()
            )));
        }
        if self.process.is_some() {
            return Err(Error::IllegalState(
                "The server process has already been started".to_string(),
            ));
        }

        let process = ServerProcess::launch_shared(&self.command, self.output.clone())?;
        let config = self
            .config
            .clone()
            .with_startup_timeout(timeout.as_secs().max(1));
        let handle: &dyn ProcessHandle = &process;
        if let Err(err) =
            helper::wait_for_server(self.server_type, Some(handle), self.client.as_ref(), &config)
                .await
        {
            if let Err(destroy_err) = process.destroy_forcibly().await {
                debug!(error = %destroy_err, "failed to kill server process after failed start");
            }
            return Err(err);
        }
        info!(server_type = %self.server_type, home = %self.home.display(), "server started");
        self.process = Some(process);
        Ok(())
    }

    /// Shut the server down and destroy its process.
    ///
    /// The process is destroyed and its output drain stopped even if the shutdown operations
    /// fail.
    ///
    /// # Errors
    ///
    /// Returns the error of the shutdown sequence if it failed, otherwise the error of
    /// destroying the process.
    pub async fn stop(&mut self) -> Result<()> {
        let shutdown = match self.server_type {
            ServerType::Standalone => {
                helper::shutdown_standalone(self.client.as_ref(), &self.config).await
            }
            ServerType::Domain => helper::shutdown_domain(self.client.as_ref(), &self.config).await,
        };
        let Some(process) = self.process.take() else {
            return shutdown;
        };
        let destroyed = process.destroy().await;
        process.stop_output_drain();
        match &destroyed {
            Ok(()) => info!(server_type = %self.server_type, "server process destroyed"),
            Err(err) => warn!(error = %err, "failed to destroy server process"),
        }
        shutdown.and(destroyed)
    }

    /// Reload the server and wait for it to be running again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the reload is rejected, or the errors of the wait.
    pub async fn reload(&self) -> Result<()> {
        match self.server_type {
            ServerType::Standalone => {
                helper::reload_standalone(self.client.as_ref(), &self.config).await
            }
            ServerType::Domain => helper::reload_domain(self.client.as_ref(), &self.config).await,
        }
    }

    /// Poll the server state once.
    pub async fn is_running(&self) -> bool {
        helper::is_running(self.server_type, self.client.as_ref()).await
    }
}
