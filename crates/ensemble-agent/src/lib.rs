//! Orchestration layer of the ensemble framework.
//!
//! The [`Orchestrator`] owns the agent registry, the task table and
//! queue, a [`TaskRouter`](ensemble_routing::TaskRouter), and a
//! [`ContextManager`](ensemble_context::ContextManager). Tasks are
//! submitted non-blocking and executed asynchronously: each scheduling
//! tick claims every dependency-satisfied queued task up to the global
//! concurrency ceiling, fans them out to their routed agents, and waits
//! for the batch before re-scanning. Three background loops (task
//! processor, heartbeat monitor, health check) drive this continuously
//! between `start` and `stop`; tests drive `tick` directly instead.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod workflow;

pub use config::{FrameworkConfig, OrchestratorConfig};
pub use error::{OrchestratorError, Result};
pub use orchestrator::{Orchestrator, SystemStatus};
pub use workflow::{ExecutionMode, WorkflowRecord, WorkflowStatus, WorkflowStep};
