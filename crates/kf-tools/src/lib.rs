//! # kf-tools
//!
//! External process execution for the keyforge pipeline.
//!
//! This crate provides:
//!
//! - **Command execution** ([`ToolCommand`]) -- async builder with optional
//!   timeout for running external processes.
//! - **Container invocations** ([`ContainerInvocation`]) -- image, user,
//!   bind mounts and arguments of one stage tool run.
//! - **Runner seam** ([`ToolRunner`]) -- the trait stage workers call;
//!   [`DockerRunner`] is the production implementation.
//! - **Tool discovery** ([`ToolRegistry`]) -- locate the docker binary.

pub mod command;
pub mod container;
pub mod tools;

pub use command::{ToolCommand, ToolOutput};
pub use container::{ContainerInvocation, DockerRunner, Mount, ToolRunner};
pub use tools::{ToolInfo, ToolRegistry};
