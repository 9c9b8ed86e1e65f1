//! Deployment orchestration for WildFly servers.
//!
//! Provides the deployment model, the builders translating deployment intents into composite
//! management operations and the [`DeploymentManager`] that runs them against a standalone
//! server or managed domain.

#![deny(missing_docs)]

pub mod content;
pub mod manager;
pub mod matcher;
pub mod models;
pub mod operations;
pub mod result;

pub use content::DeploymentContent;
pub use manager::DeploymentManager;
pub use matcher::{select_undeployments, MatchPatternStrategy};
pub use models::{Deployment, DeploymentDescription, Describe, ServerGroups, UndeployDescription};
pub use result::DeploymentResult;

/// Convenient result alias that reuses the shared WildFly error type.
pub type Result<T> = wildfly_core::Result<T>;
