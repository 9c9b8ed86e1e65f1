//! Deployment descriptions.
//!
//! A [`Deployment`] carries content to upload. [`DeploymentDescription`] names content that
//! is already in the repository and [`UndeployDescription`] adds the flags controlling an
//! undeploy. All three expose their name and target server groups through [`Describe`];
//! an empty server-group set targets a standalone server.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::path::PathBuf;
use url::Url;
use wildfly_core::Error;

use crate::content::DeploymentContent;
use crate::Result;

/// Common view over anything naming a deployment and its target server groups.
pub trait Describe: fmt::Display {
    /// The deployment name.
    fn name(&self) -> &str;

    /// The target server groups; empty for a standalone server.
    fn server_groups(&self) -> &ServerGroups;
}

/// An insertion-ordered set of server-group names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerGroups(Vec<String>);

impl ServerGroups {
    /// Create an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a group unless already present.
    pub fn insert(&mut self, group: impl Into<String>) -> bool {
        let group = group.into();
        if self.contains(&group) {
            false
        } else {
            self.0.push(group);
            true
        }
    }

    /// Returns true if the group is present.
    #[must_use]
    pub fn contains(&self, group: &str) -> bool {
        self.0.iter().any(|g| g == group)
    }

    /// Returns true if there are no groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate the groups in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Groups of `self` that are not in `other`, keeping the order of `self`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|g| !other.contains(g))
                .cloned()
                .collect(),
        )
    }

    /// Groups of `self` that are also in `other`, keeping the order of `self`.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        Self(self.0.iter().filter(|g| other.contains(g)).cloned().collect())
    }

    /// Remove every group.
    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl<S: Into<String>> FromIterator<S> for ServerGroups {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut groups = Self::new();
        groups.extend(iter);
        groups
    }
}

impl<S: Into<String>> Extend<S> for ServerGroups {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for group in iter {
            self.insert(group);
        }
    }
}

impl fmt::Display for ServerGroups {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Content to upload together with its name, runtime name, enabled flag and server groups.
///
/// Equality, ordering and hashing use the name only.
#[derive(Debug, Clone)]
pub struct Deployment {
    content: DeploymentContent,
    name: String,
    runtime_name: Option<String>,
    enabled: bool,
    server_groups: ServerGroups,
}

impl Deployment {
    fn new(content: DeploymentContent, name: Option<String>) -> Result<Self> {
        let name = match name.or_else(|| content.resolved_name()) {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "The name parameter is required and could not be resolved from the content: {content}"
                )))
            }
        };
        Ok(Self {
            content,
            name,
            runtime_name: None,
            enabled: true,
            server_groups: ServerGroups::new(),
        })
    }

    /// A deployment of a file or exploded directory, named after the last path component.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the path has no file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(DeploymentContent::Path(path.into()), None)
    }

    /// A deployment of content copied eagerly from `reader`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty name or [`Error::Io`] if reading fails.
    pub fn from_reader<R: Read>(reader: R, name: impl Into<String>) -> Result<Self> {
        let name = required_name(name.into())?;
        Self::new(DeploymentContent::from_reader(reader)?, Some(name))
    }

    /// A deployment of in-memory content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty name.
    pub fn from_bytes(bytes: impl Into<Bytes>, name: impl Into<String>) -> Result<Self> {
        let name = required_name(name.into())?;
        Self::new(DeploymentContent::Bytes(bytes.into()), Some(name))
    }

    /// A deployment the server fetches from `url`, named after the last path segment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the URL has no usable path segment.
    pub fn from_url(url: Url) -> Result<Self> {
        Self::new(DeploymentContent::Url(url), None)
    }

    /// Set the runtime name.
    #[must_use]
    pub fn with_runtime_name(mut self, runtime_name: impl Into<String>) -> Self {
        self.runtime_name = Some(runtime_name.into());
        self
    }

    /// Set whether the deployment is activated after upload.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Add a target server group.
    #[must_use]
    pub fn with_server_group(mut self, group: impl Into<String>) -> Self {
        self.server_groups.insert(group);
        self
    }

    /// Add target server groups.
    #[must_use]
    pub fn with_server_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.server_groups.extend(groups);
        self
    }

    /// Replace the target server groups.
    pub fn set_server_groups<I, S>(&mut self, groups: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.server_groups.clear();
        self.server_groups.extend(groups);
    }

    /// Set or clear the explicit name.
    ///
    /// Clearing falls back to the name resolved from the content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the name is empty, or if it is cleared and the
    /// content cannot provide one.
    pub fn set_name(&mut self, name: Option<String>) -> Result<()> {
        self.name = match name {
            Some(name) => required_name(name)?,
            None => self.content.resolved_name().ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "The name parameter is required and could not be resolved from the content: {}",
                    self.content
                ))
            })?,
        };
        Ok(())
    }

    /// The runtime name, if overridden.
    #[must_use]
    pub fn runtime_name(&self) -> Option<&str> {
        self.runtime_name.as_deref()
    }

    /// Set or clear the runtime name.
    pub fn set_runtime_name(&mut self, runtime_name: Option<String>) {
        self.runtime_name = runtime_name;
    }

    /// Whether the deployment is activated after upload.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The content source.
    #[must_use]
    pub const fn content(&self) -> &DeploymentContent {
        &self.content
    }
}

fn required_name(name: String) -> Result<String> {
    if name.is_empty() {
        Err(Error::InvalidArgument(
            "The name parameter must not be empty".to_string(),
        ))
    } else {
        Ok(name)
    }
}

impl Describe for Deployment {
    fn name(&self) -> &str {
        &self.name
    }

    fn server_groups(&self) -> &ServerGroups {
        &self.server_groups
    }
}

impl PartialEq for Deployment {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Deployment {}

impl Hash for Deployment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for Deployment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deployment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deployment(name={}", self.name)?;
        if let Some(runtime_name) = &self.runtime_name {
            write!(f, ", runtime_name={runtime_name}")?;
        }
        if !self.server_groups.is_empty() {
            write!(f, ", server_groups={}", self.server_groups)?;
        }
        write!(f, ", content={})", self.content)
    }
}

/// Content already present in the repository, with the server groups it is on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentDescription {
    name: String,
    #[serde(default)]
    server_groups: ServerGroups,
}

impl DeploymentDescription {
    /// Describe the deployment `name` with no server groups.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server_groups: ServerGroups::new(),
        }
    }

    /// Add a server group.
    #[must_use]
    pub fn with_server_group(mut self, group: impl Into<String>) -> Self {
        self.server_groups.insert(group);
        self
    }

    /// Add server groups.
    #[must_use]
    pub fn with_server_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.server_groups.extend(groups);
        self
    }

    pub(crate) fn server_groups_mut(&mut self) -> &mut ServerGroups {
        &mut self.server_groups
    }
}

impl Describe for DeploymentDescription {
    fn name(&self) -> &str {
        &self.name
    }

    fn server_groups(&self) -> &ServerGroups {
        &self.server_groups
    }
}

impl PartialEq for DeploymentDescription {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for DeploymentDescription {}

impl Hash for DeploymentDescription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for DeploymentDescription {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DeploymentDescription {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for DeploymentDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeploymentDescription(name={}", self.name)?;
        if !self.server_groups.is_empty() {
            write!(f, ", server_groups={}", self.server_groups)?;
        }
        f.write_str(")")
    }
}

/// A deployment to undeploy.
///
/// By default a missing deployment is ignored and the content is removed from the
/// repository after it is undeployed.
#[derive(Debug, Clone)]
pub struct UndeployDescription {
    name: String,
    server_groups: ServerGroups,
    fail_on_missing: bool,
    remove_content: bool,
}

impl UndeployDescription {
    /// Undeploy `name` with the default flags.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server_groups: ServerGroups::new(),
            fail_on_missing: false,
            remove_content: true,
        }
    }

    /// Undeploy the deployment described by `description` from its server groups.
    #[must_use]
    pub fn from_description(description: &impl Describe) -> Self {
        Self::new(description.name()).with_server_groups(description.server_groups().iter())
    }

    /// Add a server group.
    #[must_use]
    pub fn with_server_group(mut self, group: impl Into<String>) -> Self {
        self.server_groups.insert(group);
        self
    }

    /// Add server groups.
    #[must_use]
    pub fn with_server_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.server_groups.extend(groups);
        self
    }

    /// Fail the operation if the deployment does not exist.
    #[must_use]
    pub const fn with_fail_on_missing(mut self, fail_on_missing: bool) -> Self {
        self.fail_on_missing = fail_on_missing;
        self
    }

    /// Remove the content from the repository after undeploying.
    #[must_use]
    pub const fn with_remove_content(mut self, remove_content: bool) -> Self {
        self.remove_content = remove_content;
        self
    }

    /// Whether a missing deployment fails the operation.
    #[must_use]
    pub const fn fail_on_missing(&self) -> bool {
        self.fail_on_missing
    }

    /// Whether content is removed after undeploying.
    #[must_use]
    pub const fn remove_content(&self) -> bool {
        self.remove_content
    }

    /// A copy targeting only the requested groups the deployment is actually on.
    ///
    /// Returns `self` unchanged when every requested group matches.
    #[must_use]
    pub(crate) fn narrowed_to(&self, found: &impl Describe) -> Self {
        let unmatched = self.server_groups.difference(found.server_groups());
        if unmatched.is_empty() {
            return self.clone();
        }
        Self {
            server_groups: self.server_groups.intersection(found.server_groups()),
            ..self.clone()
        }
    }
}

impl Describe for UndeployDescription {
    fn name(&self) -> &str {
        &self.name
    }

    fn server_groups(&self) -> &ServerGroups {
        &self.server_groups
    }
}

impl PartialEq for UndeployDescription {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for UndeployDescription {}

impl Hash for UndeployDescription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for UndeployDescription {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UndeployDescription {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for UndeployDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UndeployDescription(name={}, fail_on_missing={}",
            self.name, self.fail_on_missing
        )?;
        if !self.server_groups.is_empty() {
            write!(f, ", server_groups={}", self.server_groups)?;
        }
        f.write_str(")")
    }
}
