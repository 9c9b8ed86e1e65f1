//! Lifecycle management for WildFly servers.
//!
//! Provides the state poller used to wait for a standalone server or managed domain to come
//! up, the shutdown and reload sequences, and a [`Server`] type that launches an installation
//! as a child process and controls it over a management channel.

#![deny(missing_docs)]

pub mod helper;
pub mod process;
pub mod server;

pub use process::{CommandSpec, OutputSink, ProcessHandle, ServerProcess, SharedOutput};
pub use server::{Server, ServerType};

/// Convenient result alias that reuses the shared WildFly error type.
pub type Result<T> = wildfly_core::Result<T>;
