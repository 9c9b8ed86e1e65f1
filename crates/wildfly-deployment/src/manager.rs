//! The deployment manager.
//!
//! [`DeploymentManager`] validates deployments against the topology of the container, picks
//! the operations to run and wraps the server's answer in a [`DeploymentResult`].
//!
//! Every mutating call is submitted as a single composite operation, so a failure leaves
//! nothing half applied. Business failures come back as unsuccessful results; only transport
//! problems and invalid arguments are returned as errors.

use serde_json::Value;
use std::slice;
use std::sync::{Arc, OnceLock};
use tracing::debug;
use wildfly_core::operation::{
    self, Address, CompositeBuilder, Operation, OperationRequest, DEPLOYMENT, SERVER_GROUP,
};
use wildfly_core::{ContainerDescription, Error, ManagementClient};

use crate::models::{Deployment, DeploymentDescription, Describe, UndeployDescription};
use crate::operations::{
    add_deployment_steps, add_replace_steps, create_add_deployment_operation,
    create_deploy_operation, create_redeploy_operation, create_replace_operation,
    create_undeploy_operation, require_not_empty, ENABLED,
};
use crate::result::DeploymentResult;
use crate::Result;

/// Deploys, replaces and undeploys content on a standalone server or managed domain.
///
/// The manager does not own the connection; it only holds a shared handle to it. The container
/// description is looked up on first use and cached for the lifetime of the manager.
pub struct DeploymentManager {
    client: Arc<dyn ManagementClient>,
    container: OnceLock<ContainerDescription>,
}

impl DeploymentManager {
    /// Create a manager over the given management channel.
    #[must_use]
    pub fn new(client: Arc<dyn ManagementClient>) -> Self {
        Self {
            client,
            container: OnceLock::new(),
        }
    }

    /// The description of the container behind the channel.
    ///
    /// The lookup may run more than once if callers race on first use; every caller ends up
    /// with the same cached value.
    ///
    /// # Errors
    ///
    /// Returns an error if the container could not be queried.
    pub async fn container_description(&self) -> Result<&ContainerDescription> {
        if let Some(description) = self.container.get() {
            return Ok(description);
        }
        let description = ContainerDescription::lookup(self.client.as_ref()).await?;
        debug!(container = %description, "resolved container description");
        Ok(self.container.get_or_init(|| description))
    }

    async fn is_domain(&self) -> Result<bool> {
        Ok(self.container_description().await?.is_domain())
    }

    /// Upload and deploy new content.
    ///
    /// Fails if the deployment already exists.
    ///
    /// # Errors
    ///
    /// Returns an error only if the channel fails.
    pub async fn deploy(&self, deployment: &Deployment) -> Result<DeploymentResult> {
        if let Some(failed) = self.validate(deployment).await? {
            return Ok(failed);
        }
        self.execute(create_add_deployment_operation(slice::from_ref(deployment))?)
            .await
    }

    /// Upload and deploy new content for every deployment in one operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty batch, or the channel error.
    pub async fn deploy_all(&self, deployments: &[Deployment]) -> Result<DeploymentResult> {
        if let Some(failed) = self.validate_all(deployments).await? {
            return Ok(failed);
        }
        self.execute(create_add_deployment_operation(deployments)?)
            .await
    }

    /// Deploy the content, replacing it if a deployment with the same name exists.
    ///
    /// On a domain, server groups the existing deployment is not yet on are added.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel fails or the existing deployment cannot be read.
    pub async fn force_deploy(&self, deployment: &Deployment) -> Result<DeploymentResult> {
        if let Some(failed) = self.validate(deployment).await? {
            return Ok(failed);
        }
        if !self.has_deployment(deployment.name()).await? {
            return self.deploy(deployment).await;
        }
        if self.is_domain().await? {
            let current = self.server_group_deployment(deployment.name()).await?;
            let mut builder = CompositeBuilder::new();
            add_replace_steps(&mut builder, deployment, Some(&current));
            return self.execute(builder.build()).await;
        }
        self.redeploy(deployment).await
    }

    /// Force deploy every deployment in one operation.
    ///
    /// New deployments are added first, then existing ones are replaced. Existing deployments
    /// are determined from a single listing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty batch, or the channel error.
    pub async fn force_deploy_all(&self, deployments: &[Deployment]) -> Result<DeploymentResult> {
        if let Some(failed) = self.validate_all(deployments).await? {
            return Ok(failed);
        }
        let current = self.deployments().await?;
        let mut to_deploy = Vec::new();
        let mut to_replace = Vec::new();
        for deployment in deployments {
            match find_deployment(&current, deployment.name()) {
                Some(found) => to_replace.push((deployment, found)),
                None => to_deploy.push(deployment),
            }
        }

        let domain = self.is_domain().await?;
        let mut builder = CompositeBuilder::new();
        for deployment in to_deploy {
            add_deployment_steps(&mut builder, deployment);
        }
        for (deployment, found) in to_replace {
            add_replace_steps(&mut builder, deployment, domain.then_some(found as &dyn Describe));
        }
        self.execute(builder.build()).await
    }

    /// Deploy content already in the repository, without uploading it again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty name, or the channel error.
    pub async fn deploy_to_runtime<D: Describe>(&self, deployment: &D) -> Result<DeploymentResult> {
        require_name(deployment.name())?;
        self.execute(create_deploy_operation(slice::from_ref(deployment))?)
            .await
    }

    /// Deploy content already in the repository for every deployment in one operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty batch, or the channel error.
    pub async fn deploy_to_runtime_all<D: Describe>(
        &self,
        deployments: &[D],
    ) -> Result<DeploymentResult> {
        self.execute(create_deploy_operation(deployments)?).await
    }

    /// Replace the content of an existing deployment.
    ///
    /// # Errors
    ///
    /// Returns an error only if the channel fails.
    pub async fn redeploy(&self, deployment: &Deployment) -> Result<DeploymentResult> {
        if let Some(failed) = self.validate(deployment).await? {
            return Ok(failed);
        }
        self.execute(create_replace_operation(slice::from_ref(deployment))?)
            .await
    }

    /// Replace the content of every deployment in one operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty batch, or the channel error.
    pub async fn redeploy_all(&self, deployments: &[Deployment]) -> Result<DeploymentResult> {
        if let Some(failed) = self.validate_all(deployments).await? {
            return Ok(failed);
        }
        self.execute(create_replace_operation(deployments)?).await
    }

    /// Redeploy the deployment in the runtime without new content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty name, or the channel error.
    pub async fn redeploy_to_runtime<D: Describe>(
        &self,
        deployment: &D,
    ) -> Result<DeploymentResult> {
        require_name(deployment.name())?;
        self.execute(create_redeploy_operation(slice::from_ref(deployment))?)
            .await
    }

    /// Redeploy every deployment in the runtime in one operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty batch, or the channel error.
    pub async fn redeploy_to_runtime_all<D: Describe>(
        &self,
        deployments: &[D],
    ) -> Result<DeploymentResult> {
        self.execute(create_redeploy_operation(deployments)?).await
    }

    /// Undeploy a deployment.
    ///
    /// Unless `fail_on_missing` is set, a deployment that does not exist is a successful no-op
    /// and server groups the deployment is not on are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel fails or deployments cannot be listed.
    pub async fn undeploy(&self, undeployment: &UndeployDescription) -> Result<DeploymentResult> {
        if let Some(failed) = self.validate(undeployment).await? {
            return Ok(failed);
        }
        if undeployment.fail_on_missing() {
            return self
                .execute(create_undeploy_operation(slice::from_ref(undeployment))?)
                .await;
        }
        let current = self.deployments().await?;
        match find_deployment(&current, undeployment.name()) {
            None => Ok(DeploymentResult::successful_noop()),
            Some(found) => {
                let narrowed = undeployment.narrowed_to(found);
                self.execute(create_undeploy_operation(slice::from_ref(&narrowed))?)
                    .await
            }
        }
    }

    /// Undeploy every deployment in one operation.
    ///
    /// Once a member requests `fail_on_missing`, it and every later member are undeployed
    /// whether or not they exist, and earlier missing members are added back so the server
    /// reports them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty batch, or the channel error.
    pub async fn undeploy_all(
        &self,
        undeployments: &[UndeployDescription],
    ) -> Result<DeploymentResult> {
        if let Some(failed) = self.validate_all(undeployments).await? {
            return Ok(failed);
        }
        let current = self.deployments().await?;
        let mut to_remove = Vec::with_capacity(undeployments.len());
        let mut skipped = Vec::new();
        let mut fail_on_missing = false;
        for undeployment in undeployments {
            fail_on_missing |= undeployment.fail_on_missing();
            if fail_on_missing {
                to_remove.push(undeployment.clone());
            } else {
                match find_deployment(&current, undeployment.name()) {
                    Some(found) => to_remove.push(undeployment.narrowed_to(found)),
                    None => skipped.push(undeployment.clone()),
                }
            }
        }

        if to_remove.is_empty() {
            if fail_on_missing {
                return Ok(DeploymentResult::failed(format!(
                    "No deployments were found matching any of the following deployments: {}",
                    display_list(undeployments)
                )));
            }
            return Ok(DeploymentResult::successful_noop());
        }
        if fail_on_missing {
            to_remove.extend(skipped);
        }
        self.execute(create_undeploy_operation(&to_remove)?).await
    }

    /// List the deployments in the repository.
    ///
    /// On a domain each description carries the server groups the deployment is on. The
    /// listing always takes a single request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the server rejects the listing, or the channel error.
    pub async fn deployments(&self) -> Result<Vec<DeploymentDescription>> {
        let read_names = Operation::read_children_names(Address::root(), DEPLOYMENT);
        if !self.is_domain().await? {
            let result = self.client.execute(read_names.into()).await?;
            return Ok(listing_result(&result)?
                .into_iter()
                .map(DeploymentDescription::new)
                .collect());
        }

        let mut builder = CompositeBuilder::new();
        builder.add_step(read_names);
        builder.add_step(Operation::read_resource(Address::from_pairs(&[
            SERVER_GROUP,
            "*",
            DEPLOYMENT,
            "*",
        ])));
        let result = self.client.execute(builder.build()).await?;
        if !operation::is_success(&result) {
            return Err(listing_failure(&result));
        }

        let steps = operation::read_result(&result);
        let mut deployments: Vec<DeploymentDescription> =
            operation::as_string_list(operation::read_result(operation::step_result(steps, 1)))
                .into_iter()
                .map(DeploymentDescription::new)
                .collect();
        for entry in entries(operation::read_result(operation::step_result(steps, 2))) {
            let address = operation::operation_address(entry);
            let (Some(group), Some(name)) =
                (address.value_of(SERVER_GROUP), address.value_of(DEPLOYMENT))
            else {
                continue;
            };
            match deployments.iter_mut().find(|d| d.name() == name) {
                Some(deployment) => {
                    deployment.server_groups_mut().insert(group);
                }
                None => deployments.push(DeploymentDescription::new(name).with_server_group(group)),
            }
        }
        Ok(deployments)
    }

    /// List the deployments on a server group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] on a standalone server, [`Error::InvalidArgument`] for an
    /// empty group name, or the errors of [`Self::deployments`].
    pub async fn deployments_in_group(
        &self,
        server_group: &str,
    ) -> Result<Vec<DeploymentDescription>> {
        require_parameter(server_group, "server_group")?;
        let container = self.container_description().await?;
        if !container.is_domain() {
            return Err(Error::IllegalState(format!(
                "Server is not a managed domain. Running container: {container}"
            )));
        }
        Ok(self
            .deployments()
            .await?
            .into_iter()
            .filter(|d| d.server_groups().contains(server_group))
            .collect())
    }

    /// List the names of the deployments in the repository.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the server rejects the listing, or the channel error.
    pub async fn deployment_names(&self) -> Result<Vec<String>> {
        let op = Operation::read_children_names(Address::root(), DEPLOYMENT);
        let result = self.client.execute(op.into()).await?;
        listing_result(&result)
    }

    /// Returns true if the repository contains the deployment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the check could not be executed or was rejected.
    pub async fn has_deployment(&self, name: &str) -> Result<bool> {
        require_name(name)?;
        self.has_deployment_at(Address::root(), name).await
    }

    /// Returns true if the deployment is on the server group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the check could not be executed or was rejected.
    pub async fn has_deployment_in_group(&self, name: &str, server_group: &str) -> Result<bool> {
        require_name(name)?;
        require_parameter(server_group, "server_group")?;
        self.has_deployment_at(Address::from_pairs(&[SERVER_GROUP, server_group]), name)
            .await
    }

    /// Returns true if the deployment is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the attribute could not be read.
    pub async fn is_enabled(&self, name: &str) -> Result<bool> {
        require_name(name)?;
        self.is_enabled_at(Address::deployment(name)).await
    }

    /// Returns true if the deployment is enabled on the server group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the attribute could not be read.
    pub async fn is_enabled_in_group(&self, name: &str, server_group: &str) -> Result<bool> {
        require_name(name)?;
        require_parameter(server_group, "server_group")?;
        self.is_enabled_at(Address::server_group_deployment(server_group, name))
            .await
    }

    async fn has_deployment_at(&self, address: Address, name: &str) -> Result<bool> {
        let op = Operation::read_children_names(address, DEPLOYMENT);
        let result = self.execute_checked(op).await?;
        Ok(operation::as_string_list(&result).iter().any(|n| n == name))
    }

    async fn is_enabled_at(&self, address: Address) -> Result<bool> {
        let op = Operation::read_attribute(address, ENABLED);
        let result = self.execute_checked(op).await?;
        Ok(match result {
            Value::Bool(enabled) => enabled,
            Value::String(text) => text.eq_ignore_ascii_case("true"),
            _ => false,
        })
    }

    /// Execute a yes/no query; every failure is reported as an illegal state.
    async fn execute_checked(&self, op: Operation) -> Result<Value> {
        let rendered = op.to_json();
        let result = self.client.execute(op.into()).await.map_err(|err| {
            Error::IllegalState(format!("Could not execute operation '{rendered}': {err}"))
        })?;
        if operation::is_success(&result) {
            Ok(operation::read_result(&result).clone())
        } else {
            Err(Error::IllegalState(operation::failure_description(&result)))
        }
    }

    async fn server_group_deployment(&self, name: &str) -> Result<DeploymentDescription> {
        let address = Address::from_pairs(&[SERVER_GROUP, "*", DEPLOYMENT, name]);
        let result = self
            .client
            .execute(Operation::read_resource(address).into())
            .await?;
        if !operation::is_success(&result) {
            return Err(listing_failure(&result));
        }
        let groups = entries(operation::read_result(&result))
            .filter_map(|entry| {
                operation::operation_address(entry)
                    .value_of(SERVER_GROUP)
                    .map(str::to_string)
            })
            .collect::<Vec<_>>();
        Ok(DeploymentDescription::new(name).with_server_groups(groups))
    }

    async fn execute(&self, request: OperationRequest) -> Result<DeploymentResult> {
        debug!(
            steps = request.steps().len(),
            attachments = request.attachments().len(),
            "executing deployment operation"
        );
        let result = self.client.execute(request).await?;
        let result = DeploymentResult::from_result_node(result);
        if !result.successful() {
            debug!(reason = result.failure_message(), "deployment operation failed");
        }
        Ok(result)
    }

    async fn validate<D: Describe>(&self, deployment: &D) -> Result<Option<DeploymentResult>> {
        require_name(deployment.name())?;
        let domain = self.is_domain().await?;
        let groups = deployment.server_groups();
        if domain && groups.is_empty() {
            return Ok(Some(DeploymentResult::failed(format!(
                "No server groups were defined for the deployment operation. Deployment: {deployment}"
            ))));
        }
        if !domain && !groups.is_empty() {
            return Ok(Some(DeploymentResult::failed(format!(
                "Server is not a managed domain, but server groups were defined. Deployment: {deployment}"
            ))));
        }
        Ok(None)
    }

    async fn validate_all<D: Describe>(&self, deployments: &[D]) -> Result<Option<DeploymentResult>> {
        require_not_empty(deployments, "deployments")?;
        let domain = self.is_domain().await?;
        let mut missing_groups = Vec::new();
        let mut standalone_with_groups = Vec::new();
        for deployment in deployments {
            require_name(deployment.name())?;
            let groups = deployment.server_groups();
            if domain && groups.is_empty() {
                missing_groups.push(deployment);
            } else if !domain && !groups.is_empty() {
                standalone_with_groups.push(deployment);
            }
        }
        if missing_groups.is_empty() && standalone_with_groups.is_empty() {
            return Ok(None);
        }

        let mut message = String::new();
        if !missing_groups.is_empty() {
            message.push_str("No server groups were defined on the following deployments: ");
            message.push_str(&display_list(&missing_groups));
        }
        if !standalone_with_groups.is_empty() {
            message.push_str(
                "Server is not a managed domain but the following deployments had server groups defined: ",
            );
            message.push_str(&display_list(&standalone_with_groups));
        }
        Ok(Some(DeploymentResult::failed(message)))
    }
}

fn find_deployment<'a>(
    deployments: &'a [DeploymentDescription],
    name: &str,
) -> Option<&'a DeploymentDescription> {
    deployments.iter().find(|d| d.name() == name)
}

fn entries(value: &Value) -> impl Iterator<Item = &Value> {
    value.as_array().into_iter().flatten()
}

fn listing_result(result: &Value) -> Result<Vec<String>> {
    if operation::is_success(result) {
        Ok(operation::as_string_list(operation::read_result(result)))
    } else {
        Err(listing_failure(result))
    }
}

fn listing_failure(result: &Value) -> Error {
    Error::IllegalState(format!(
        "Failed to get listing of deployments. Reason: {}",
        operation::failure_description(result)
    ))
}

fn display_list<T: std::fmt::Display>(items: &[T]) -> String {
    let rendered: Vec<String> = items.iter().map(ToString::to_string).collect();
    format!("[{}]", rendered.join(", "))
}

fn require_name(name: &str) -> Result<()> {
    require_parameter(name, "name")
}

fn require_parameter(value: &str, parameter: &str) -> Result<()> {
    if value.is_empty() {
        Err(Error::InvalidArgument(format!(
            "The {parameter} parameter must not be empty"
        )))
    } else {
        Ok(())
    }
}
