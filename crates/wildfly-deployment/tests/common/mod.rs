//! In-memory management model used by the integration tests.
//!
//! `SimulatedServer` answers the operations the deployment manager issues against a content
//! repository and, in domain mode, a fixed set of server groups. Composites are applied to a
//! copy of the model and committed only when every step succeeds.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use wildfly_core::operation::{self, Address, OperationRequest, DEPLOYMENT, SERVER_GROUP};
use wildfly_core::{Attachment, Error, ManagementClient};
use wildfly_deployment::DeploymentManager;

#[derive(Debug, Clone)]
struct Content {
    hash: u64,
    enabled: bool,
    activated: u64,
}

#[derive(Debug, Clone, Default)]
struct Model {
    repository: BTreeMap<String, Content>,
    groups: BTreeMap<String, BTreeMap<String, bool>>,
    activations: u64,
}

impl Model {
    fn activate(&mut self, name: &str) {
        self.activations += 1;
        if let Some(content) = self.repository.get_mut(name) {
            content.activated = self.activations;
        }
    }
}

#[derive(Debug, Default)]
struct State {
    model: Model,
    requests: Vec<Value>,
    fail_transport: bool,
}

/// A scripted management endpoint holding a deployment model in memory.
#[derive(Clone)]
pub struct SimulatedServer {
    domain: bool,
    state: Arc<Mutex<State>>,
}

impl SimulatedServer {
    /// A standalone server with an empty repository.
    pub fn standalone() -> Self {
        Self {
            domain: false,
            state: Arc::default(),
        }
    }

    /// A domain with the given server groups and an empty repository.
    pub fn domain(groups: &[&str]) -> Self {
        let server = Self {
            domain: true,
            state: Arc::default(),
        };
        {
            let mut state = server.state.lock().unwrap();
            for group in groups {
                state.model.groups.insert((*group).to_string(), BTreeMap::new());
            }
        }
        server
    }

    /// A manager talking to this server.
    pub fn manager(&self) -> DeploymentManager {
        DeploymentManager::new(Arc::new(self.clone()))
    }

    /// Hash of the content stored under `name`.
    pub fn content_hash(&self, name: &str) -> Option<u64> {
        let state = self.state.lock().unwrap();
        state.model.repository.get(name).map(|c| c.hash)
    }

    /// Sequence number of the last activation of `name`.
    pub fn activation(&self, name: &str) -> Option<u64> {
        let state = self.state.lock().unwrap();
        state.model.repository.get(name).map(|c| c.activated)
    }

    /// Every request body received so far.
    pub fn requests(&self) -> Vec<Value> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    /// Make every following request fail at the transport level.
    pub fn fail_transport(&self, fail: bool) {
        self.state.lock().unwrap().fail_transport = fail;
    }

    fn container(&self) -> Value {
        json!({
            "product-name": "WildFly Full",
            "product-version": "31.0.0.Final",
            "release-version": "23.0.1.Final",
            "launch-type": if self.domain { "DOMAIN" } else { "STANDALONE" },
        })
    }

    fn apply(&self, model: &mut Model, step: &Value, attachments: &[Attachment]) -> StepResult {
        let name = step["operation"].as_str().unwrap_or_default();
        let address = Address::from_json(&step["address"]);
        let group = address.value_of(SERVER_GROUP).map(str::to_string);
        let deployment = address.value_of(DEPLOYMENT).map(str::to_string);

        match name {
            "read-resource" if address.is_root() => Ok(self.container()),
            "read-resource" => Ok(read_group_deployments(model, deployment.as_deref())),
            "read-children-names" => match group {
                None => Ok(json!(model.repository.keys().collect::<Vec<_>>())),
                Some(group) => model
                    .groups
                    .get(&group)
                    .map(|members| json!(members.keys().collect::<Vec<_>>()))
                    .ok_or_else(|| not_found(&address)),
            },
            "read-attribute" => {
                let name = deployment.ok_or_else(|| not_found(&address))?;
                match group {
                    None => model
                        .repository
                        .get(&name)
                        .map(|c| json!(c.enabled))
                        .ok_or_else(|| not_found(&address)),
                    Some(group) => model
                        .groups
                        .get(&group)
                        .and_then(|members| members.get(&name))
                        .map(|enabled| json!(enabled))
                        .ok_or_else(|| not_found(&address)),
                }
            }
            "add" => {
                let name = deployment.ok_or_else(|| not_found(&address))?;
                let enabled = step["enabled"].as_bool().unwrap_or(false);
                match group {
                    None => {
                        if model.repository.contains_key(&name) {
                            return Err(format!(
                                "WFLYCTL0212: Duplicate resource [(\"deployment\" => \"{name}\")]"
                            ));
                        }
                        let hash = content_hash(&step["content"], attachments)?;
                        model.repository.insert(
                            name.clone(),
                            Content {
                                hash,
                                enabled,
                                activated: 0,
                            },
                        );
                        if enabled && !self.domain {
                            model.activate(&name);
                        }
                    }
                    Some(group) => {
                        if !model.repository.contains_key(&name) {
                            return Err(format!(
                                "WFLYDC0048: No deployment named {name} found"
                            ));
                        }
                        let members = model
                            .groups
                            .get_mut(&group)
                            .ok_or_else(|| not_found(&address))?;
                        if members.insert(name.clone(), enabled).is_some() {
                            return Err(format!("WFLYCTL0212: Duplicate resource {address}"));
                        }
                        if enabled {
                            model.activate(&name);
                        }
                    }
                }
                Ok(Value::Null)
            }
            "full-replace-deployment" => {
                let name = step["name"].as_str().unwrap_or_default().to_string();
                let enabled = step["enabled"].as_bool().unwrap_or(false);
                let hash = content_hash(&step["content"], attachments)?;
                let content = model.repository.get_mut(&name).ok_or_else(|| {
                    format!("WFLYSRV0195: No deployment with name {name} found")
                })?;
                content.hash = hash;
                content.enabled = enabled;
                let mut activate = enabled && !self.domain;
                for members in model.groups.values_mut() {
                    if let Some(flag) = members.get_mut(&name) {
                        *flag = enabled;
                        activate |= enabled;
                    }
                }
                if activate {
                    model.activate(&name);
                }
                Ok(Value::Null)
            }
            "deploy" | "redeploy" | "undeploy" => {
                let target = deployment.ok_or_else(|| not_found(&address))?;
                let flag = match &group {
                    None => model.repository.get_mut(&target).map(|c| &mut c.enabled),
                    Some(group) => model
                        .groups
                        .get_mut(group)
                        .and_then(|members| members.get_mut(&target)),
                }
                .ok_or_else(|| not_found(&address))?;
                *flag = name != "undeploy";
                if name != "undeploy" {
                    model.activate(&target);
                }
                Ok(Value::Null)
            }
            "remove" => {
                let name = deployment.ok_or_else(|| not_found(&address))?;
                match group {
                    None => {
                        if model.groups.values().any(|m| m.contains_key(&name)) {
                            return Err(format!(
                                "WFLYDC0040: Cannot remove deployment {name} from the domain as it is still used by server groups"
                            ));
                        }
                        model
                            .repository
                            .remove(&name)
                            .map(|_| Value::Null)
                            .ok_or_else(|| not_found(&address))
                    }
                    Some(group) => model
                        .groups
                        .get_mut(&group)
                        .and_then(|members| members.remove(&name))
                        .map(|_| Value::Null)
                        .ok_or_else(|| not_found(&address)),
                }
            }
            other => Err(format!("WFLYCTL0031: No operation named '{other}' exists")),
        }
    }
}

type StepResult = std::result::Result<Value, String>;

fn not_found(address: &Address) -> String {
    format!("WFLYCTL0216: Management resource '{address}' not found")
}

fn read_group_deployments(model: &Model, deployment: Option<&str>) -> Value {
    let mut entries = Vec::new();
    for (group, members) in &model.groups {
        for (name, enabled) in members {
            if deployment.map_or(true, |d| d == "*" || d == name) {
                entries.push(json!({
                    "address": [{"server-group": group}, {"deployment": name}],
                    "outcome": "success",
                    "result": {"name": name, "enabled": enabled},
                }));
            }
        }
    }
    Value::Array(entries)
}

fn content_hash(content: &Value, attachments: &[Attachment]) -> std::result::Result<u64, String> {
    let item = content
        .get(0)
        .ok_or_else(|| "WFLYCTL0155: content may not be null".to_string())?;
    let mut hasher = DefaultHasher::new();
    if let Some(index) = item["input-stream-index"].as_u64() {
        match attachments.get(index as usize) {
            Some(Attachment::Bytes(bytes)) => bytes.as_ref().hash(&mut hasher),
            Some(Attachment::File(path)) => std::fs::read(path)
                .map_err(|err| err.to_string())?
                .hash(&mut hasher),
            None => return Err(format!("WFLYCTL0133: Missing input stream {index}")),
        }
    } else {
        item.to_string().hash(&mut hasher);
    }
    Ok(hasher.finish())
}

#[async_trait]
impl ManagementClient for SimulatedServer {
    async fn execute(&self, request: OperationRequest) -> wildfly_core::Result<Value> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.body().clone());
        if state.fail_transport {
            return Err(Error::Transport("connection refused".to_string()));
        }

        let body = request.body();
        if request.operation_name() != operation::COMPOSITE {
            let mut model = state.model.clone();
            return Ok(match self.apply(&mut model, body, request.attachments()) {
                Ok(result) => {
                    state.model = model;
                    json!({"outcome": "success", "result": result})
                }
                Err(description) => json!({"outcome": "failed", "failure-description": description}),
            });
        }

        let mut model = state.model.clone();
        let mut results = Map::new();
        for (index, step) in request.steps().iter().enumerate() {
            let key = format!("step-{}", index + 1);
            match self.apply(&mut model, step, request.attachments()) {
                Ok(result) => {
                    results.insert(key, json!({"outcome": "success", "result": result}));
                }
                Err(description) => {
                    return Ok(json!({
                        "outcome": "failed",
                        "failure-description": {
                            "WFLYCTL0062: Composite operation failed and was rolled back. Steps that failed:": {
                                format!("Operation {key}"): description
                            }
                        },
                        "rolled-back": true,
                    }));
                }
            }
        }
        state.model = model;
        Ok(json!({"outcome": "success", "result": Value::Object(results)}))
    }
}
