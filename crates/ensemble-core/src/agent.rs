//! Agent descriptor types: static registration and runtime view.

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Health of a registered agent as observed by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Responding and eligible for new assignments.
    Healthy,
    /// Heartbeat is stale; excluded from routing until it recovers.
    Unhealthy,
    /// Registered but not yet set up, or stopped.
    Offline,
}

impl Display for AgentStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Offline => "offline",
        };
        write!(formatter, "{name}")
    }
}

/// Static declaration of one agent's capabilities. Immutable after
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistration {
    /// Unique agent name.
    pub name: String,
    /// Capability tags this agent declares (e.g. `file_operations`).
    pub capabilities: Vec<String>,
    /// Task type strings the agent claims to execute.
    pub supported_task_types: Vec<String>,
    /// Agent priority class, 1-10; matched against task priority by the
    /// router.
    pub priority: u8,
    /// Hard cap on concurrently assigned tasks.
    pub max_concurrent_tasks: usize,
    /// Free-form agent configuration.
    pub config: HashMap<String, JsonValue>,
}

impl AgentRegistration {
    /// Creates a registration with default priority 5 and capacity 1.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: Vec::new(),
            supported_task_types: Vec::new(),
            priority: 5,
            max_concurrent_tasks: 1,
            config: HashMap::new(),
        }
    }

    /// Sets the declared capability tags.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Sets the supported task types.
    #[must_use]
    pub fn with_supported_task_types(mut self, task_types: Vec<String>) -> Self {
        self.supported_task_types = task_types;
        self
    }

    /// Sets the priority class (1-10).
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the hard concurrency cap.
    #[must_use]
    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    /// Adds a configuration entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Whether this agent claims to execute the given task type.
    #[must_use]
    pub fn supports_task_type(&self, task_type: &str) -> bool {
        self.supported_task_types
            .iter()
            .any(|supported| supported == task_type)
    }
}

/// Runtime view of a registered agent, mutated continuously by the
/// orchestrator as tasks are assigned and completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    /// The immutable registration this info wraps.
    pub registration: AgentRegistration,
    /// Current health.
    pub status: AgentStatus,
    /// Ids of in-flight tasks assigned to this agent.
    pub current_tasks: Vec<String>,
    /// Last time the agent reported liveness.
    pub last_heartbeat: DateTime<Utc>,
    /// Number of failed executions attributed to this agent.
    pub error_count: u64,
    /// Number of tasks this agent completed successfully.
    pub total_tasks_completed: u64,
}

impl AgentInfo {
    /// Creates the runtime view for a fresh registration. Agents start
    /// `Offline` until their setup step succeeds.
    #[must_use]
    pub fn new(registration: AgentRegistration) -> Self {
        Self {
            registration,
            status: AgentStatus::Offline,
            current_tasks: Vec::new(),
            last_heartbeat: Utc::now(),
            error_count: 0,
            total_tasks_completed: 0,
        }
    }

    /// Current load as a fraction of the hard cap, in `[0, 1]`. A zero cap
    /// reads as fully loaded.
    #[must_use]
    pub fn load_ratio(&self) -> f64 {
        if self.registration.max_concurrent_tasks == 0 {
            return 1.0;
        }
        self.current_tasks.len() as f64 / self.registration.max_concurrent_tasks as f64
    }

    /// Whether the agent has at least one nominal free slot.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.current_tasks.len() < self.registration.max_concurrent_tasks
    }
}
