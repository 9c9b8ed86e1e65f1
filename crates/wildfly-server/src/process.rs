//! Server process handling.
//!
//! [`ServerProcess`] launches the server script of an installation and owns the child
//! process. When an output sink is supplied, stdout and stderr are drained into it by
//! background tasks so the child never blocks on a full pipe.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, trace};
use wildfly_core::Error;

use crate::server::ServerType;
use crate::Result;

/// Time a killed process gets to be reported as exited.
pub const DESTROY_TIMEOUT: Duration = Duration::from_secs(5);

const DRAIN_BUFFER_SIZE: usize = 8 * 1024;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Where drained server output is written.
pub type OutputSink = Box<dyn AsyncWrite + Send + Unpin>;

/// An output sink shared by the drain tasks of successive launches.
pub type SharedOutput = Arc<Mutex<OutputSink>>;

/// The operations needed to supervise an external server process.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// Returns true while the process has not exited.
    async fn is_alive(&self) -> bool;

    /// The exit code, once the process has exited and the platform reported one.
    async fn exit_code(&self) -> Option<i32>;

    /// Kill the process and wait for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the process could not be killed, or [`Error::Timeout`] if it
    /// is not reported as exited within [`DESTROY_TIMEOUT`].
    async fn destroy(&self) -> Result<()>;

    /// Kill the process without waiting for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the process could not be killed.
    async fn destroy_forcibly(&self) -> Result<()>;

    /// Wait for the process to exit and return its exit code.
    ///
    /// Waiting does not block the other operations; the process can be destroyed while a
    /// caller waits on it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if waiting failed.
    async fn wait(&self) -> Result<Option<i32>>;
}

/// The command used to launch a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl CommandSpec {
    /// A command running `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    /// The launch script of the installation at `home` for the given server type.
    ///
    /// `JBOSS_HOME` is set to `home` and the working directory is the installation.
    #[must_use]
    pub fn for_server(server_type: ServerType, home: &Path) -> Self {
        let extension = if cfg!(windows) { "bat" } else { "sh" };
        let script = home
            .join("bin")
            .join(format!("{}.{extension}", server_type.script_name()));
        Self::new(script)
            .with_env("JBOSS_HOME", home.to_string_lossy())
            .with_working_dir(home)
    }

    /// Append an argument.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the process.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// The program to run.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Extra environment variables.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).envs(&self.env).kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

/// A launched server process.
///
/// The process is killed if the value is dropped while it is still running.
pub struct ServerProcess {
    child: Mutex<Child>,
    pid: Option<u32>,
    drains: Vec<JoinHandle<()>>,
}

impl ServerProcess {
    /// Spawn the command.
    ///
    /// Without a sink the process inherits stdout and stderr. With a sink both streams are
    /// copied into it until they close.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the process could not be spawned.
    pub fn launch(spec: &CommandSpec, stdout: Option<OutputSink>) -> Result<Self> {
        Self::launch_shared(spec, stdout.map(|sink| Arc::new(Mutex::new(sink))))
    }

    /// Spawn the command, draining its output into a sink that outlives the process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the process could not be spawned.
    pub fn launch_shared(spec: &CommandSpec, output: Option<SharedOutput>) -> Result<Self> {
        let mut command = spec.to_command();
        if output.is_some() {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }
        debug!(program = %spec.program.display(), args = ?spec.args, "launching server process");
        let mut child = command.spawn().map_err(|err| {
            Error::Io(format!(
                "Could not launch the server process {}: {err}",
                spec.program.display()
            ))
        })?;

        let mut drains = Vec::new();
        if let Some(sink) = output {
            if let Some(out) = child.stdout.take() {
                drains.push(drain(out, Arc::clone(&sink)));
            }
            if let Some(err) = child.stderr.take() {
                drains.push(drain(err, sink));
            }
        }

        let pid = child.id();
        info!(pid = ?pid, "server process launched");
        Ok(Self {
            child: Mutex::new(child),
            pid,
            drains,
        })
    }

    /// The OS process id, if the process was still running when it was launched.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Stop copying output into the sink.
    pub fn stop_output_drain(&self) {
        for drain in &self.drains {
            drain.abort();
        }
    }

    async fn try_exit_status(&self) -> Result<Option<ExitStatus>> {
        self.child
            .lock()
            .await
            .try_wait()
            .map_err(|err| Error::Io(format!("Failed to query the server process: {err}")))
    }

    async fn wait_for_exit(&self) -> Result<Option<i32>> {
        loop {
            if let Some(status) = self.try_exit_status().await? {
                return Ok(status.code());
            }
            sleep(EXIT_POLL_INTERVAL).await;
        }
    }
}

fn drain<R>(mut reader: R, sink: Arc<Mutex<OutputSink>>) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut buffer = vec![0u8; DRAIN_BUFFER_SIZE];
        loop {
            let read = match reader.read(&mut buffer).await {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) => {
                    trace!(error = %err, "server output stream closed");
                    break;
                }
            };
            let mut sink = sink.lock().await;
            if let Err(err) = sink.write_all(&buffer[..read]).await {
                trace!(error = %err, "failed to write server output");
                break;
            }
            let _ = sink.flush().await;
        }
    })
}

#[async_trait]
impl ProcessHandle for ServerProcess {
    async fn is_alive(&self) -> bool {
        matches!(self.child.lock().await.try_wait(), Ok(None))
    }

    async fn exit_code(&self) -> Option<i32> {
        let mut child = self.child.lock().await;
        child.try_wait().ok().flatten().and_then(|status| status.code())
    }

    async fn destroy(&self) -> Result<()> {
        self.destroy_forcibly().await?;
        match tokio::time::timeout(DESTROY_TIMEOUT, self.wait_for_exit()).await {
            Ok(exited) => exited.map(|_| ()),
            Err(_) => {
                debug!(pid = ?self.pid, "server process still reported alive after kill");
                Err(Error::Timeout(format!(
                    "The server process did not exit within {} seconds after being killed.",
                    DESTROY_TIMEOUT.as_secs()
                )))
            }
        }
    }

    async fn destroy_forcibly(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        if matches!(child.try_wait(), Ok(Some(_))) {
            return Ok(());
        }
        child
            .start_kill()
            .map_err(|err| Error::Io(format!("Failed to kill the server process: {err}")))
    }

    async fn wait(&self) -> Result<Option<i32>> {
        self.wait_for_exit().await
    }
}
