//! Shared-state coordination for the ensemble framework.
//!
//! The context manager owns per-conversation shared state: session data,
//! shared memory visible to every agent in the conversation, per-agent
//! private state, and the set of active tasks. Contexts are TTL-bounded;
//! a throttled cleanup sweep archives records that have gone unmutated
//! past the TTL. Persistence, when enabled, synchronously re-serializes
//! the full context on every mutation — a deliberate
//! simplicity-over-efficiency tradeoff at this scale.

pub mod config;
pub mod manager;
pub mod store;

pub use config::ContextConfig;
pub use manager::{ContextManager, ContextStats, ContextUpdate};
pub use store::ContextStore;
