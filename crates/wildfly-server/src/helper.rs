//! Server state polling, shutdown and reload.
//!
//! Every function takes the management channel explicitly; none of them owns or closes it.
//! The wait functions poll a cheap state read on a fixed interval until the server is running,
//! the watched process dies, or the startup timeout elapses. Read failures while polling are
//! expected while a server boots or tears down and only count as "not running yet".

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, trace, warn};
use wildfly_core::config::LifecycleConfig;
use wildfly_core::operation::{self, Address, CompositeBuilder, Operation, HOST, SERVER_CONFIG};
use wildfly_core::types::{is_settled_state, RunningMode, ServerIdentity, ServerStatus};
use wildfly_core::{ContainerDescription, Error, ManagementClient};

use crate::process::ProcessHandle;
use crate::server::ServerType;
use crate::Result;

/// File whose presence marks a server installation directory.
pub const MODULES_JAR: &str = "jboss-modules.jar";

/// `shutdown` operation name.
pub const SHUTDOWN: &str = "shutdown";
/// `stop-servers` operation name.
pub const STOP_SERVERS: &str = "stop-servers";
/// `reload` operation name.
pub const RELOAD: &str = "reload";
/// `reload-servers` operation name.
pub const RELOAD_SERVERS: &str = "reload-servers";

/// Returns true if `path` is a directory containing `jboss-modules.jar`.
#[must_use]
pub fn is_valid_home_directory(path: &Path) -> bool {
    path.is_dir() && path.join(MODULES_JAR).exists()
}

/// Query the description of the container behind the channel.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the root resource cannot be read, or the transport
/// error.
pub async fn container_description(client: &dyn ManagementClient) -> Result<ContainerDescription> {
    ContainerDescription::lookup(client).await
}

/// Returns true if the channel is connected to a domain controller.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the launch type cannot be read, or the transport
/// error.
pub async fn is_domain(client: &dyn ManagementClient) -> Result<bool> {
    let op = Operation::read_attribute(Address::root(), "launch-type");
    let body = op.to_json();
    let result = client.execute(op.into()).await?;
    if !operation::is_success(&result) {
        return Err(Error::operation_failed(&body, &result));
    }
    Ok(operation::value_as_string(operation::read_result(&result)).eq_ignore_ascii_case("DOMAIN"))
}

/// Resolve the address of the host controller the channel is connected to.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if `local-host-name` cannot be read, or the transport
/// error.
pub async fn determine_host_address(client: &dyn ManagementClient) -> Result<Address> {
    let op = Operation::read_attribute(Address::root(), "local-host-name");
    let body = op.to_json();
    let result = client.execute(op.into()).await?;
    if operation::is_success(&result) {
        let host = operation::value_as_string(operation::read_result(&result));
        return Ok(Address::root().append(HOST, host));
    }
    Err(Error::operation_failed(&body, &result))
}

/// Returns true if the standalone server is neither starting nor stopping.
///
/// Any failure to read the state counts as not running.
pub async fn is_standalone_running(client: &dyn ManagementClient) -> bool {
    let op = Operation::read_attribute(Address::root(), "server-state");
    match client.execute(op.into()).await {
        Ok(result) if operation::is_success(&result) => {
            is_settled_state(&operation::value_as_string(operation::read_result(&result)))
        }
        Ok(result) => {
            trace!(reason = %operation::failure_description(&result), "server-state read failed");
            false
        }
        Err(err) => {
            trace!(error = %err, "could not determine if standalone server is running");
            false
        }
    }
}

/// Returns true if the domain is running.
///
/// A host in admin-only mode is running once the host itself has settled. Otherwise every
/// managed server must be started or disabled. Any failure counts as not running.
pub async fn is_domain_running(client: &dyn ManagementClient) -> bool {
    match domain_running(client).await {
        Ok(running) => running,
        Err(err) => {
            trace!(error = %err, "could not determine if domain is running");
            false
        }
    }
}

async fn domain_running(client: &dyn ManagementClient) -> Result<bool> {
    let host = determine_host_address(client).await?;
    let mut builder = CompositeBuilder::new();
    builder
        .add_step(Operation::read_attribute(host.clone(), "running-mode"))
        .add_step(Operation::read_attribute(host, "host-state"));
    let result = client.execute(builder.build()).await?;
    if operation::is_success(&result) {
        let steps = operation::read_result(&result);
        let mode = operation::value_as_string(operation::read_result(operation::step_result(steps, 1)));
        let host_state = operation::step_result(steps, 2);
        if mode.parse::<RunningMode>().ok() == Some(RunningMode::AdminOnly)
            && operation::is_success(host_state)
        {
            return Ok(is_settled_state(&operation::value_as_string(
                operation::read_result(host_state),
            )));
        }
    }

    let statuses = server_statuses(client).await?;
    Ok(statuses.values().all(ServerStatus::is_settled))
}

/// Read the status of every managed server of every host in one request.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the statuses cannot be read, or the transport error.
pub async fn server_statuses(
    client: &dyn ManagementClient,
) -> Result<BTreeMap<ServerIdentity, ServerStatus>> {
    let op = Operation::read_attribute(Address::from_pairs(&[HOST, "*", SERVER_CONFIG]), "status");
    let body = op.to_json();
    let result = client.execute(op.into()).await?;
    if !operation::is_success(&result) {
        return Err(Error::operation_failed(&body, &result));
    }

    let mut statuses = BTreeMap::new();
    for entry in operation::read_result(&result)
        .as_array()
        .into_iter()
        .flatten()
    {
        let address = operation::operation_address(entry);
        let (Some(host), Some(server)) = (address.value_of(HOST), address.value_of(SERVER_CONFIG))
        else {
            continue;
        };
        let status = if operation::is_success(entry) {
            operation::value_as_string(operation::read_result(entry))
                .parse()
                .unwrap_or(ServerStatus::Unknown)
        } else {
            ServerStatus::Unknown
        };
        statuses.insert(
            ServerIdentity {
                host: host.to_string(),
                server: server.to_string(),
            },
            status,
        );
    }
    Ok(statuses)
}

/// Wait for a standalone server to reach a running state.
///
/// # Errors
///
/// Returns [`Error::ProcessExited`] if `process` dies while waiting, or [`Error::Timeout`]
/// once the startup timeout elapses; the process is destroyed before the timeout is returned.
pub async fn wait_for_standalone(
    process: Option<&dyn ProcessHandle>,
    client: &dyn ManagementClient,
    config: &LifecycleConfig,
) -> Result<()> {
    wait_for_server(ServerType::Standalone, process, client, config).await
}

/// Wait for a domain to reach a running state.
///
/// # Errors
///
/// Returns [`Error::ProcessExited`] if `process` dies while waiting, or [`Error::Timeout`]
/// once the startup timeout elapses; the process is destroyed before the timeout is returned.
pub async fn wait_for_domain(
    process: Option<&dyn ProcessHandle>,
    client: &dyn ManagementClient,
    config: &LifecycleConfig,
) -> Result<()> {
    wait_for_server(ServerType::Domain, process, client, config).await
}

/// Returns true if the server of the given type is running.
pub async fn is_running(server_type: ServerType, client: &dyn ManagementClient) -> bool {
    match server_type {
        ServerType::Standalone => is_standalone_running(client).await,
        ServerType::Domain => is_domain_running(client).await,
    }
}

/// Wait for a server of the given type to reach a running state.
///
/// # Errors
///
/// See [`wait_for_standalone`].
pub async fn wait_for_server(
    server_type: ServerType,
    process: Option<&dyn ProcessHandle>,
    client: &dyn ManagementClient,
    config: &LifecycleConfig,
) -> Result<()> {
    let timeout = config.startup_timeout();
    let deadline = Instant::now() + timeout;
    let mut polls = 0u32;
    while Instant::now() < deadline {
        polls += 1;
        if is_running(server_type, client).await {
            info!(server_type = %server_type, polls, "server is running");
            return Ok(());
        }
        if let Some(process) = process {
            if !process.is_alive().await {
                return Err(Error::ProcessExited {
                    code: process.exit_code().await,
                });
            }
        }
        sleep(config.poll_interval()).await;
    }

    if let Some(process) = process {
        warn!(timeout_secs = timeout.as_secs(), "server did not start in time, destroying process");
        if let Err(err) = process.destroy().await {
            debug!(error = %err, "failed to destroy server process");
        }
    }
    Err(Error::Timeout(format!(
        "The server did not start within {} seconds.",
        timeout.as_secs()
    )))
}

/// Shut down a standalone server and wait until it no longer reports a running state.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the server rejects the shutdown, or the transport
/// error.
pub async fn shutdown_standalone(
    client: &dyn ManagementClient,
    config: &LifecycleConfig,
) -> Result<()> {
    let op = Operation::root(SHUTDOWN).with_param("timeout", config.shutdown_timeout_secs);
    let body = op.to_json();
    let result = client.execute(op.into()).await?;
    if !operation::is_success(&result) {
        return Err(Error::operation_failed(&body, &result));
    }
    info!("standalone server acknowledged shutdown");
    while is_standalone_running(client).await {
        sleep(config.shutdown_poll_interval()).await;
    }
    Ok(())
}

/// Stop every managed server, then shut down the host controller and wait until no active
/// server is reported any more.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if stopping the servers, resolving the host or shutting
/// it down fails, or the transport error.
pub async fn shutdown_domain(client: &dyn ManagementClient, config: &LifecycleConfig) -> Result<()> {
    let stop_servers = Operation::root(STOP_SERVERS)
        .with_param("blocking", true)
        .with_param("timeout", config.shutdown_timeout_secs);
    let body = stop_servers.to_json();
    let result = client.execute(stop_servers.into()).await?;
    if !operation::is_success(&result) {
        return Err(required_step_failed("Failed to stop servers.", &body, &result));
    }
    debug!("managed servers stopped");

    let host = determine_host_address(client).await?;
    let shutdown = Operation::new(SHUTDOWN, host);
    let body = shutdown.to_json();
    let result = client.execute(shutdown.into()).await?;
    if !operation::is_success(&result) {
        return Err(required_step_failed("Failed to shutdown host.", &body, &result));
    }
    info!("host controller acknowledged shutdown");

    while has_active_servers(client).await {
        sleep(config.shutdown_poll_interval()).await;
    }
    Ok(())
}

async fn has_active_servers(client: &dyn ManagementClient) -> bool {
    match server_statuses(client).await {
        Ok(statuses) => statuses.values().any(ServerStatus::is_active),
        Err(err) => {
            trace!(error = %err, "domain no longer answers status reads");
            false
        }
    }
}

fn required_step_failed(message: &str, operation: &Value, result: &Value) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        description: format!("{message} {}", operation::failure_description(result)),
    }
}

/// Reload a standalone server and wait for it to be running again.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the reload is rejected, or the errors of
/// [`wait_for_standalone`].
pub async fn reload_standalone(client: &dyn ManagementClient, config: &LifecycleConfig) -> Result<()> {
    reload(ServerType::Standalone, client, config).await
}

/// Reload every managed server of a domain and wait for the domain to be running again.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the reload is rejected, or the errors of
/// [`wait_for_domain`].
pub async fn reload_domain(client: &dyn ManagementClient, config: &LifecycleConfig) -> Result<()> {
    reload(ServerType::Domain, client, config).await
}

async fn reload(
    server_type: ServerType,
    client: &dyn ManagementClient,
    config: &LifecycleConfig,
) -> Result<()> {
    let name = match server_type {
        ServerType::Standalone => RELOAD,
        ServerType::Domain => RELOAD_SERVERS,
    };
    let op = Operation::root(name);
    let body = op.to_json();
    let result = client.execute(op.into()).await?;
    if !operation::is_success(&result) {
        return Err(Error::operation_failed(&body, &result));
    }
    info!(server_type = %server_type, "reload issued");
    wait_for_server(server_type, None, client, config).await
}
