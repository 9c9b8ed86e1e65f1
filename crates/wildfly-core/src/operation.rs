//! Management addresses, operations and composite builders.
//!
//! A management request is a JSON document naming an operation, the address of the resource
//! it targets and any operation parameters. Binary content travels out of band as attachments
//! referenced from the request by a zero-based `input-stream-index`.
//!
//! The helpers at the bottom of the module read result nodes returned by the server.

use bytes::Bytes;
use serde_json::{json, Map, Value};
use std::fmt;
use std::path::PathBuf;

/// Key used for the operation name.
pub const OP: &str = "operation";
/// Key used for the operation address.
pub const OP_ADDR: &str = "address";
/// Key of the outcome in a result node.
pub const OUTCOME: &str = "outcome";
/// Outcome reported for a successful operation.
pub const SUCCESS: &str = "success";
/// Key of the result payload in a result node.
pub const RESULT: &str = "result";
/// Key of the failure description in a result node.
pub const FAILURE_DESCRIPTION: &str = "failure-description";
/// Key of the steps in a composite operation.
pub const STEPS: &str = "steps";
/// Key of the attachment index inside a content item.
pub const INPUT_STREAM_INDEX: &str = "input-stream-index";

/// Address type for the content repository.
pub const DEPLOYMENT: &str = "deployment";
/// Address type for server groups in a managed domain.
pub const SERVER_GROUP: &str = "server-group";
/// Address type for hosts in a managed domain.
pub const HOST: &str = "host";
/// Address type for server configurations on a host.
pub const SERVER_CONFIG: &str = "server-config";

/// `add` operation name.
pub const ADD: &str = "add";
/// `remove` operation name.
pub const REMOVE: &str = "remove";
/// `composite` operation name.
pub const COMPOSITE: &str = "composite";
/// `deploy` operation name.
pub const DEPLOY: &str = "deploy";
/// `undeploy` operation name.
pub const UNDEPLOY: &str = "undeploy";
/// `redeploy` operation name.
pub const REDEPLOY: &str = "redeploy";
/// `full-replace-deployment` operation name.
pub const FULL_REPLACE_DEPLOYMENT: &str = "full-replace-deployment";
/// `read-attribute` operation name.
pub const READ_ATTRIBUTE: &str = "read-attribute";
/// `read-resource` operation name.
pub const READ_RESOURCE: &str = "read-resource";
/// `read-children-names` operation name.
pub const READ_CHILDREN_NAMES: &str = "read-children-names";

/// An ordered list of `(type, value)` pairs identifying a management resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Address {
    pairs: Vec<(String, String)>,
}

impl Address {
    /// The root resource.
    #[must_use]
    pub const fn root() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Create an address from a flat list of keys and values.
    ///
    /// A trailing key without a value is wildcarded with `*`.
    #[must_use]
    pub fn from_pairs(pairs: &[&str]) -> Self {
        let mut address = Self::root();
        for chunk in pairs.chunks(2) {
            let value = chunk.get(1).copied().unwrap_or("*");
            address = address.append(chunk[0], value);
        }
        address
    }

    /// Return a new address with the pair appended.
    #[must_use]
    pub fn append(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    /// The address of a deployment in the content repository.
    #[must_use]
    pub fn deployment(name: &str) -> Self {
        Self::from_pairs(&[DEPLOYMENT, name])
    }

    /// The address of a deployment on a server group.
    #[must_use]
    pub fn server_group_deployment(server_group: &str, name: &str) -> Self {
        Self::from_pairs(&[SERVER_GROUP, server_group, DEPLOYMENT, name])
    }

    /// Returns true for the root resource.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The pairs making up the address.
    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Returns the value of the first pair with the given type.
    #[must_use]
    pub fn value_of(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Render the address as the JSON list used on the wire.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.pairs
                .iter()
                .map(|(k, v)| {
                    let mut entry = Map::new();
                    entry.insert(k.clone(), Value::String(v.clone()));
                    Value::Object(entry)
                })
                .collect(),
        )
    }

    /// Parse an address from its JSON form.
    ///
    /// Both the list-of-objects form and the list-of-single-property form are accepted.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        let mut address = Self::root();
        if let Some(entries) = value.as_array() {
            for entry in entries {
                if let Some(object) = entry.as_object() {
                    for (key, value) in object {
                        address = address.append(key.clone(), value_as_string(value));
                    }
                }
            }
        }
        address
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pairs.is_empty() {
            return write!(f, "/");
        }
        for (key, value) in &self.pairs {
            write!(f, "/{key}={value}")?;
        }
        Ok(())
    }
}

/// A single management operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    name: String,
    address: Address,
    params: Map<String, Value>,
}

impl Operation {
    /// Create an operation against the given address.
    #[must_use]
    pub fn new(name: impl Into<String>, address: Address) -> Self {
        Self {
            name: name.into(),
            address,
            params: Map::new(),
        }
    }

    /// Create an operation against the root resource.
    #[must_use]
    pub fn root(name: impl Into<String>) -> Self {
        Self::new(name, Address::root())
    }

    /// Create an `add` operation.
    #[must_use]
    pub fn add(address: Address) -> Self {
        Self::new(ADD, address)
    }

    /// Create a `remove` operation.
    #[must_use]
    pub fn remove(address: Address) -> Self {
        Self::new(REMOVE, address)
    }

    /// Create a `read-attribute` operation.
    #[must_use]
    pub fn read_attribute(address: Address, attribute: &str) -> Self {
        Self::new(READ_ATTRIBUTE, address).with_param("name", attribute)
    }

    /// Create a `read-resource` operation.
    #[must_use]
    pub fn read_resource(address: Address) -> Self {
        Self::new(READ_RESOURCE, address)
    }

    /// Create a `read-children-names` operation for the given child type.
    #[must_use]
    pub fn read_children_names(address: Address, child_type: &str) -> Self {
        Self::new(READ_CHILDREN_NAMES, address).with_param("child-type", child_type)
    }

    /// Set a parameter, replacing any previous value.
    #[must_use]
    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set_param(key, value);
        self
    }

    /// Set a parameter, replacing any previous value.
    pub fn set_param(&mut self, key: &str, value: impl Into<Value>) {
        self.params.insert(key.to_string(), value.into());
    }

    /// The operation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The target address.
    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Returns a parameter value.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Render the operation as the JSON document sent to the server.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        body.insert(OP.to_string(), Value::String(self.name.clone()));
        body.insert(OP_ADDR.to_string(), self.address.to_json());
        for (key, value) in &self.params {
            body.insert(key.clone(), value.clone());
        }
        Value::Object(body)
    }
}

impl From<Operation> for OperationRequest {
    fn from(operation: Operation) -> Self {
        Self {
            body: operation.to_json(),
            attachments: Vec::new(),
        }
    }
}

/// Content sent out of band with an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    /// A file streamed from disk when the request is sent.
    File(PathBuf),
    /// In-memory content.
    Bytes(Bytes),
}

/// A fully built request: the operation document plus its attachments.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest {
    body: Value,
    attachments: Vec<Attachment>,
}

impl OperationRequest {
    /// The JSON document of the request.
    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Attachments in `input-stream-index` order.
    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// The name of the top-level operation.
    #[must_use]
    pub fn operation_name(&self) -> &str {
        self.body.get(OP).and_then(Value::as_str).unwrap_or_default()
    }

    /// The steps of a composite request; empty for plain operations.
    #[must_use]
    pub fn steps(&self) -> &[Value] {
        self.body
            .get(STEPS)
            .and_then(Value::as_array)
            .map_or(&[], Vec::as_slice)
    }
}

/// Builder for composite operations.
///
/// All steps are executed as one transaction: either every step commits or the server rolls
/// the whole operation back.
#[derive(Debug, Clone, Default)]
pub struct CompositeBuilder {
    steps: Vec<Value>,
    attachments: Vec<Attachment>,
}

impl CompositeBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    pub fn add_step(&mut self, operation: Operation) -> &mut Self {
        self.steps.push(operation.to_json());
        self
    }

    /// Register an attachment and return its index.
    pub fn add_attachment(&mut self, attachment: Attachment) -> usize {
        self.attachments.push(attachment);
        self.attachments.len() - 1
    }

    /// Number of attachments registered so far.
    #[must_use]
    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    /// Number of steps added so far.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if no step has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Build the composite request.
    #[must_use]
    pub fn build(self) -> OperationRequest {
        OperationRequest {
            body: json!({
                OP: COMPOSITE,
                OP_ADDR: [],
                STEPS: self.steps,
            }),
            attachments: self.attachments,
        }
    }
}

/// Returns true if the result node reports a successful outcome.
#[must_use]
pub fn is_success(result: &Value) -> bool {
    result.get(OUTCOME).and_then(Value::as_str) == Some(SUCCESS)
}

/// Returns the `result` payload of a result node, or `Null` when absent.
#[must_use]
pub fn read_result(result: &Value) -> &Value {
    result.get(RESULT).unwrap_or(&Value::Null)
}

/// Returns the failure description of a result node as text.
#[must_use]
pub fn failure_description(result: &Value) -> String {
    match result.get(FAILURE_DESCRIPTION) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => "No failure description provided".to_string(),
    }
}

/// Returns the result node of step `index` (one-based) of a composite result payload.
#[must_use]
pub fn step_result(results: &Value, index: usize) -> &Value {
    results
        .get(format!("step-{index}"))
        .unwrap_or(&Value::Null)
}

/// Returns the address of an entry from a wildcard read.
#[must_use]
pub fn operation_address(entry: &Value) -> Address {
    entry
        .get(OP_ADDR)
        .map(Address::from_json)
        .unwrap_or_default()
}

/// Reads a list of strings, ignoring anything that is not a list.
#[must_use]
pub fn as_string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().map(value_as_string).collect())
        .unwrap_or_default()
}

/// Renders a scalar node as a string, the way the management model coerces values.
#[must_use]
pub fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
