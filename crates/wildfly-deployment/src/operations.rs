//! Translation of deployment intents into composite management operations.
//!
//! Every function here is pure: it builds steps and attachments without talking to a server.
//! Batches are emitted in iteration order with no reordering or de-duplication; a batch that
//! names the same deployment twice produces both sets of steps and the server rejects it.
//!
//! An empty server-group set always produces standalone addressing. Deciding whether that is
//! right for the container is up to the caller.

use wildfly_core::operation::{
    Address, CompositeBuilder, Operation, OperationRequest, DEPLOY, FULL_REPLACE_DEPLOYMENT,
    REDEPLOY, UNDEPLOY,
};
use wildfly_core::Error;

use crate::models::{Deployment, Describe, UndeployDescription};
use crate::Result;

/// `enabled` parameter.
pub const ENABLED: &str = "enabled";
/// `runtime-name` parameter.
pub const RUNTIME_NAME: &str = "runtime-name";
/// `name` parameter.
pub const NAME: &str = "name";

/// Build the composite adding (uploading) each deployment.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if `deployments` is empty.
pub fn create_add_deployment_operation(deployments: &[Deployment]) -> Result<OperationRequest> {
    require_not_empty(deployments, "deployments")?;
    let mut builder = CompositeBuilder::new();
    for deployment in deployments {
        add_deployment_steps(&mut builder, deployment);
    }
    Ok(builder.build())
}

/// Build the composite deploying content already in the repository.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if `deployments` is empty.
pub fn create_deploy_operation<D: Describe>(deployments: &[D]) -> Result<OperationRequest> {
    require_not_empty(deployments, "deployments")?;
    let mut builder = CompositeBuilder::new();
    for deployment in deployments {
        add_per_group_steps(&mut builder, deployment, DEPLOY);
    }
    Ok(builder.build())
}

/// Build the composite replacing the content of existing deployments.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if `deployments` is empty.
pub fn create_replace_operation(deployments: &[Deployment]) -> Result<OperationRequest> {
    require_not_empty(deployments, "deployments")?;
    let mut builder = CompositeBuilder::new();
    for deployment in deployments {
        add_replace_steps(&mut builder, deployment, None);
    }
    Ok(builder.build())
}

/// Build the composite redeploying existing deployments without new content.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if `deployments` is empty.
pub fn create_redeploy_operation<D: Describe>(deployments: &[D]) -> Result<OperationRequest> {
    require_not_empty(deployments, "deployments")?;
    let mut builder = CompositeBuilder::new();
    for deployment in deployments {
        add_per_group_steps(&mut builder, deployment, REDEPLOY);
    }
    Ok(builder.build())
}

/// Build the composite undeploying and optionally removing deployments.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if `undeployments` is empty.
pub fn create_undeploy_operation(
    undeployments: &[UndeployDescription],
) -> Result<OperationRequest> {
    require_not_empty(undeployments, "undeployments")?;
    let mut builder = CompositeBuilder::new();
    for undeployment in undeployments {
        add_undeploy_steps(&mut builder, undeployment);
    }
    Ok(builder.build())
}

/// Add the repository `add` step and one `add` step per server group.
pub fn add_deployment_steps(builder: &mut CompositeBuilder, deployment: &Deployment) {
    let name = deployment.name();
    let mut add = Operation::add(Address::deployment(name));
    if let Some(runtime_name) = deployment.runtime_name() {
        add.set_param(RUNTIME_NAME, runtime_name);
    }
    add.set_param(ENABLED, deployment.is_enabled());
    deployment.content().add_to_operation(builder, &mut add);
    builder.add_step(add);

    for group in deployment.server_groups().iter() {
        let mut op = Operation::add(Address::server_group_deployment(group, name))
            .with_param(ENABLED, deployment.is_enabled());
        if let Some(runtime_name) = deployment.runtime_name() {
            op.set_param(RUNTIME_NAME, runtime_name);
        }
        builder.add_step(op);
    }
}

/// Add a `full-replace-deployment` step.
///
/// With `current`, requested server groups the deployment is not yet on get a disabled
/// `add` step first; `full-replace-deployment` only updates existing group associations.
pub fn add_replace_steps(
    builder: &mut CompositeBuilder,
    deployment: &Deployment,
    current: Option<&dyn Describe>,
) {
    let name = deployment.name();
    let runtime_name = deployment.runtime_name();

    if let Some(current) = current {
        let missing = deployment
            .server_groups()
            .difference(current.server_groups());
        for group in missing.iter() {
            let mut add = Operation::add(Address::server_group_deployment(group, name))
                .with_param(ENABLED, false);
            if let Some(runtime_name) = runtime_name {
                add.set_param(RUNTIME_NAME, runtime_name);
            }
            builder.add_step(add);
        }
    }

    let mut replace = Operation::root(FULL_REPLACE_DEPLOYMENT).with_param(NAME, name);
    if let Some(runtime_name) = runtime_name {
        replace.set_param(RUNTIME_NAME, runtime_name);
    }
    deployment.content().add_to_operation(builder, &mut replace);
    replace.set_param(ENABLED, deployment.is_enabled());
    builder.add_step(replace);
}

/// Add `undeploy` steps, followed by `remove` steps when content removal was requested.
pub fn add_undeploy_steps(builder: &mut CompositeBuilder, undeployment: &UndeployDescription) {
    let name = undeployment.name();
    let remove = undeployment.remove_content();
    let groups = undeployment.server_groups();

    if groups.is_empty() {
        let address = Address::deployment(name);
        builder.add_step(Operation::new(UNDEPLOY, address.clone()));
        if remove {
            builder.add_step(Operation::remove(address));
        }
        return;
    }

    for group in groups.iter() {
        let address = Address::server_group_deployment(group, name);
        builder.add_step(Operation::new(UNDEPLOY, address.clone()));
        if remove {
            builder.add_step(Operation::remove(address));
        }
    }
    if remove {
        builder.add_step(Operation::remove(Address::deployment(name)));
    }
}

fn add_per_group_steps(builder: &mut CompositeBuilder, deployment: &impl Describe, op: &str) {
    let name = deployment.name();
    let groups = deployment.server_groups();
    if groups.is_empty() {
        builder.add_step(Operation::new(op, Address::deployment(name)));
    } else {
        for group in groups.iter() {
            builder.add_step(Operation::new(
                op,
                Address::server_group_deployment(group, name),
            ));
        }
    }
}

pub(crate) fn require_not_empty<T>(items: &[T], parameter: &str) -> Result<()> {
    if items.is_empty() {
        Err(Error::InvalidArgument(format!(
            "The {parameter} parameter must not be empty"
        )))
    } else {
        Ok(())
    }
}
