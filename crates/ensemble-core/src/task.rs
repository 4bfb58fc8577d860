//! Task and task-result value types.

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::short_id;

/// Execution status of a task.
///
/// Tasks move monotonically along `Pending -> Running -> {Completed, Failed}`;
/// `Cancelled` is reachable from `Pending` (and, in principle, `Running`,
/// though the orchestrator never preempts an in-flight task).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in the queue or on unsatisfied dependencies.
    Pending,
    /// Dispatched to an agent and currently executing.
    Running,
    /// The agent returned a successful result.
    Completed,
    /// Execution failed, no agent was available, or a fail-fast policy fired.
    Failed,
    /// Cancelled before execution started.
    Cancelled,
}

impl TaskStatus {
    /// Returns `true` for states a task can never leave.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl Display for TaskStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(formatter, "{name}")
    }
}

/// One unit of requested work, routed to and executed by a single agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier; caller-assigned or generated at construction.
    pub id: String,
    /// Capability tag identifying what kind of agent can execute this task.
    #[serde(rename = "type")]
    pub task_type: String,
    /// Human-readable description.
    pub description: String,
    /// Free-form arguments interpreted by the executing agent.
    pub parameters: HashMap<String, JsonValue>,
    /// Urgency on a 1-10 scale; higher is more urgent. Affects routing
    /// preference only, never dispatch order from the queue.
    pub priority: u8,
    /// Ids of tasks that must reach `Completed` before this one may run.
    pub dependencies: Vec<String>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// Optional completion deadline, informational.
    pub deadline: Option<DateTime<Utc>>,
    /// Pinned agent name; pinning always wins over scoring if the agent
    /// still qualifies.
    pub assigned_agent: Option<String>,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Success payload, set when the task completes.
    pub result: Option<JsonValue>,
    /// Failure description, set when the task fails.
    pub error: Option<String>,
    /// Set exactly once, on entering `Running`.
    pub execution_start: Option<DateTime<Utc>>,
    /// Set exactly once, on entering a terminal state after execution.
    pub execution_end: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a pending task of the given type with a generated id.
    #[must_use]
    pub fn new(task_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: short_id(),
            task_type: task_type.into(),
            description: description.into(),
            parameters: HashMap::new(),
            priority: 5,
            dependencies: Vec::new(),
            created_at: Utc::now(),
            deadline: None,
            assigned_agent: None,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            execution_start: None,
            execution_end: None,
        }
    }

    /// Replaces the generated id with a caller-assigned one.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the full parameter map.
    #[must_use]
    pub fn with_parameters(mut self, parameters: HashMap<String, JsonValue>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Adds a single parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Sets the priority (1-10, higher is more urgent).
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the dependency list.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Sets the completion deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Pins the task to a specific agent.
    #[must_use]
    pub fn with_assigned_agent(mut self, agent: impl Into<String>) -> Self {
        self.assigned_agent = Some(agent.into());
        self
    }

    /// Transitions to `Running` and stamps `execution_start`.
    pub fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.execution_start = Some(Utc::now());
    }

    /// Transitions to `Completed`, storing the success payload and stamping
    /// `execution_end`.
    pub fn mark_completed(&mut self, result: Option<JsonValue>) {
        self.status = TaskStatus::Completed;
        self.result = result;
        self.execution_end = Some(Utc::now());
    }

    /// Transitions to `Failed`, storing the error and stamping
    /// `execution_end`.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.execution_end = Some(Utc::now());
    }

    /// Transitions to `Cancelled`.
    pub fn mark_cancelled(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.execution_end = Some(Utc::now());
    }
}

/// Outcome of one execution attempt, produced exactly once by the agent
/// that ran the task and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// The task this result belongs to.
    pub task_id: String,
    /// Whether execution succeeded.
    pub success: bool,
    /// Opaque success payload; `None` on failure.
    pub data: Option<JsonValue>,
    /// Failure description; present iff `success` is false.
    pub error: Option<String>,
    /// Wall-clock execution time in seconds.
    pub execution_time: Option<f64>,
    /// Free-form metadata, e.g. which tools the agent used.
    pub metadata: HashMap<String, JsonValue>,
}

impl TaskResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(task_id: impl Into<String>, data: Option<JsonValue>) -> Self {
        Self {
            task_id: task_id.into(),
            success: true,
            data,
            error: None,
            execution_time: None,
            metadata: HashMap::new(),
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            data: None,
            error: Some(error.into()),
            execution_time: None,
            metadata: HashMap::new(),
        }
    }

    /// Sets the measured execution time in seconds.
    #[must_use]
    pub fn with_execution_time(mut self, seconds: f64) -> Self {
        self.execution_time = Some(seconds);
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_builder_defaults() {
        let task = Task::new("read_file", "Read the config file")
            .with_parameter("path", json!("config.toml"))
            .with_priority(7);

        assert_eq!(task.task_type, "read_file");
        assert_eq!(task.priority, 7);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.dependencies.is_empty());
        assert!(task.execution_start.is_none());
        assert_eq!(task.parameters["path"], json!("config.toml"));
    }

    #[test]
    fn test_task_lifecycle_stamps_timestamps() {
        let mut task = Task::new("write_file", "Write output");
        task.mark_running();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.execution_start.is_some());
        assert!(task.execution_end.is_none());

        task.mark_completed(Some(json!({"bytes": 42})));
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.execution_end.is_some());
        assert_eq!(task.result, Some(json!({"bytes": 42})));
    }

    #[test]
    fn test_task_failure_records_error() {
        let mut task = Task::new("search_files", "Find TODOs");
        task.mark_running();
        task.mark_failed("agent crashed");
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("agent crashed"));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_task_serde_uses_type_field() {
        let task = Task::new("read_file", "Read").with_id("t1");
        let encoded = serde_json::to_value(&task).unwrap();
        assert_eq!(encoded["type"], json!("read_file"));

        let decoded: Task = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.task_type, "read_file");
        assert_eq!(decoded.id, "t1");
    }

    #[test]
    fn test_result_constructors() {
        let ok = TaskResult::success("t1", Some(json!("done"))).with_execution_time(0.25);
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = TaskResult::failure("t2", "no such file");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("no such file"));
        assert!(failed.data.is_none());
    }
}
