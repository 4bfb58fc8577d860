//! Shared vocabulary for the ensemble multi-agent framework.
//!
//! This crate defines the value types every other component speaks —
//! tasks, task results, conversation contexts, and agent descriptors —
//! together with the boundary contracts ([`Agent`], [`ToolTransport`])
//! that the orchestrator and router depend on without knowing any
//! concrete agent or transport implementation.

pub mod agent;
pub mod context;
pub mod error;
pub mod task;
pub mod traits;

pub use agent::{AgentInfo, AgentRegistration, AgentStatus};
pub use context::Context;
pub use error::{Error, Result};
pub use task::{Task, TaskResult, TaskStatus};
pub use traits::{Agent, ToolDescriptor, ToolTransport};

/// Generates a short unique identifier (first 8 hex characters of a v4 UUID).
///
/// Used for system-assigned task ids and workflow ids; callers that need
/// meaningful ids assign their own.
#[must_use]
pub fn short_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_owned()
}
