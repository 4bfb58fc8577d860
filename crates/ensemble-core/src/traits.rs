//! Boundary contracts the core depends on but does not implement.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{AgentRegistration, Context, Result, Task, TaskResult};

/// Execution contract every registered agent must expose.
///
/// The orchestrator calls [`Agent::setup`] once at registration and
/// [`Agent::stop`] at unregistration or shutdown. [`Agent::execute_task`]
/// is called once per dispatch attempt with no orchestrator-side retry;
/// any error it returns is captured on the task, never propagated out of
/// the scheduling loop.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique agent name; must match `registration().name`.
    fn name(&self) -> &str;

    /// The agent's static capability declaration.
    fn registration(&self) -> &AgentRegistration;

    /// Whether this agent can execute the given task. The default checks
    /// declared task-type support; implementations may add parameter-level
    /// checks.
    fn can_handle_task(&self, task: &Task) -> bool {
        self.registration().supports_task_type(&task.task_type)
    }

    /// Connects to backing servers and prepares the agent for work.
    ///
    /// # Errors
    /// Returns an error if the agent cannot be made ready; registration is
    /// then abandoned with no partial state retained.
    async fn setup(&self) -> Result<()>;

    /// Executes one task, optionally within a conversation context.
    ///
    /// # Errors
    /// Returns an error on execution failure; the orchestrator records it
    /// as the task's error and increments the agent's error count.
    async fn execute_task(&self, task: &Task, context: Option<&Context>) -> Result<TaskResult>;

    /// Releases the agent's resources.
    ///
    /// # Errors
    /// Returns an error if shutdown fails; the orchestrator logs and
    /// continues.
    async fn stop(&self) -> Result<()>;
}

/// Description of one remotely invocable operation, as returned by
/// capability discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Operation name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema of the argument map.
    pub input_schema: JsonValue,
}

/// Request/response abstraction over the remote tool-call protocol.
///
/// Agents consume this to reach their backing servers; the core itself is
/// transport-agnostic. Results are structured values with typed failures,
/// never free text to be parsed.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Endpoint identifier this transport talks to.
    fn endpoint(&self) -> &str;

    /// Lists the operations the endpoint exposes.
    ///
    /// # Errors
    /// Returns an error if discovery fails.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    /// Invokes a named operation with a structured argument map.
    ///
    /// # Errors
    /// Returns an error if the operation is unknown, the arguments are
    /// rejected, or the round trip fails.
    async fn call_tool(
        &self,
        name: &str,
        arguments: HashMap<String, JsonValue>,
    ) -> Result<JsonValue>;
}
