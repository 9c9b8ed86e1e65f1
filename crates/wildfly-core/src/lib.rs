//! # wildfly-core
//!
//! Core types and utilities for managing WildFly servers.
//!
//! This crate provides the error type, configuration, the management operation model and
//! the channel used to execute operations against a standalone server or domain controller.
//!
//! ## Modules
//!
//! - [`error`] - Error types shared by all crates in the workspace
//! - [`operation`] - Management addresses, operations, composites and result-node helpers
//! - [`client`] - The [`ManagementClient`] channel and its HTTP implementation
//! - [`config`] - Connection and lifecycle configuration
//! - [`types`] - Container description, process states and server statuses

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod operation;
pub mod types;

// Re-export commonly used types
pub use client::{HttpManagementClient, HttpManagementClientBuilder, ManagementClient};
pub use error::{Error, Result};
pub use operation::{Address, Attachment, CompositeBuilder, Operation, OperationRequest};
pub use types::ContainerDescription;
