//! Selection of deployments to undeploy by name pattern.

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use wildfly_core::Error;

use crate::manager::DeploymentManager;
use crate::models::{Describe, UndeployDescription};
use crate::Result;

/// What to do when a pattern matches more than one deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MatchPatternStrategy {
    /// Only the first matching deployment is selected.
    First,
    /// Every matching deployment is selected.
    All,
    /// Selecting more than one deployment is an error.
    #[default]
    Fail,
}

impl MatchPatternStrategy {
    /// The lower-case name of the strategy.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::First => "first",
            Self::All => "all",
            Self::Fail => "fail",
        }
    }
}

impl FromStr for MatchPatternStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(Self::First),
            "all" => Ok(Self::All),
            "fail" => Ok(Self::Fail),
            _ => Err(Error::ParseError(format!(
                "Invalid match pattern strategy: {s}"
            ))),
        }
    }
}

impl fmt::Display for MatchPatternStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Select the deployments whose names fully match `pattern`.
///
/// With no `server_groups` each match is undeployed from every group it is on. Otherwise
/// only the requested groups the deployment is actually on are kept, and a deployment on
/// none of them is skipped. The selection is sorted by name.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for an invalid pattern, [`Error::Deployment`] when the
/// strategy is [`MatchPatternStrategy::Fail`] and more than one deployment matched, or the
/// errors of [`DeploymentManager::deployments`].
pub async fn select_undeployments(
    manager: &DeploymentManager,
    pattern: &str,
    server_groups: &[String],
    strategy: MatchPatternStrategy,
    fail_on_missing: bool,
) -> Result<Vec<UndeployDescription>> {
    let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|err| {
        Error::InvalidArgument(format!("Invalid match pattern '{pattern}': {err}"))
    })?;

    let mut selected = Vec::new();
    for deployment in manager.deployments().await? {
        if !regex.is_match(deployment.name()) {
            continue;
        }
        let candidate = if server_groups.is_empty() {
            UndeployDescription::from_description(&deployment)
        } else {
            let groups: Vec<&str> = server_groups
                .iter()
                .map(String::as_str)
                .filter(|g| deployment.server_groups().contains(g))
                .collect();
            if groups.is_empty() {
                debug!(
                    deployment = deployment.name(),
                    "skipping match not on any requested server group"
                );
                continue;
            }
            UndeployDescription::new(deployment.name()).with_server_groups(groups)
        };
        selected.push(candidate.with_fail_on_missing(fail_on_missing));
        if strategy == MatchPatternStrategy::First {
            break;
        }
    }

    if strategy == MatchPatternStrategy::Fail && selected.len() > 1 {
        return Err(Error::Deployment(format!(
            "Deployment failed, found {} deployed artifacts for pattern '{pattern}' ({})",
            selected.len(),
            selected
                .iter()
                .map(Describe::name)
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }
    selected.sort();
    Ok(selected)
}
