//! Conversation-scoped shared state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::task::Task;

/// Per-agent private state within one conversation.
pub type AgentState = HashMap<String, JsonValue>;

/// Shared memory for one logical conversation, visible to every agent
/// touching it. A context is the unit of TTL-based expiry: `updated_at`
/// is refreshed on every mutating operation and compared against the
/// configured TTL by the cleanup sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    /// Primary key.
    pub conversation_id: String,
    /// Owner of the conversation.
    pub user_id: String,
    /// General session key-value data.
    pub session_data: HashMap<String, JsonValue>,
    /// Key-value memory visible to all agents in the conversation.
    pub shared_memory: HashMap<String, JsonValue>,
    /// Tasks currently associated with the conversation.
    pub active_tasks: Vec<Task>,
    /// Per-agent private state blobs, keyed by agent name.
    pub agent_states: HashMap<String, AgentState>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time; drives TTL expiry.
    pub updated_at: DateTime<Utc>,
}

impl Context {
    /// Creates an empty context for a conversation.
    #[must_use]
    pub fn new(conversation_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            session_data: HashMap::new(),
            shared_memory: HashMap::new(),
            active_tasks: Vec::new(),
            agent_states: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Seeds the session data at construction.
    #[must_use]
    pub fn with_session_data(mut self, session_data: HashMap<String, JsonValue>) -> Self {
        self.session_data = session_data;
        self
    }

    /// Refreshes `updated_at`. Every mutating operation on the context
    /// manager calls this.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Whether a task with the given id is already associated.
    #[must_use]
    pub fn has_task(&self, task_id: &str) -> bool {
        self.active_tasks.iter().any(|task| task.id == task_id)
    }
}
