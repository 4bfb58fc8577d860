//! Workflow expansion: ordered step descriptors become dependency-chained
//! tasks.

use std::collections::HashMap;

use ensemble_core::{Task, TaskStatus, short_id};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{OrchestratorError, Result};

/// How a workflow's steps relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Each step depends on the previous one.
    Sequential,
    /// Steps run independently, apart from any explicit `depends_on`
    /// references.
    Parallel,
}

/// One step descriptor consumed by workflow creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Task type routed to a capable agent.
    #[serde(rename = "type")]
    pub task_type: String,
    /// Human-readable description; defaults to the task type.
    #[serde(default)]
    pub description: Option<String>,
    /// Task parameters.
    #[serde(default)]
    pub parameters: HashMap<String, JsonValue>,
    /// Task priority (1-10); defaults to 5.
    #[serde(default)]
    pub priority: Option<u8>,
    /// Pins the step to a named agent.
    #[serde(default)]
    pub agent: Option<String>,
    /// Indexes of other steps this one depends on. Only honored in
    /// parallel mode; sequential mode chains steps implicitly.
    #[serde(default)]
    pub depends_on: Vec<usize>,
}

impl WorkflowStep {
    /// Creates a step for a task type.
    #[must_use]
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            description: None,
            parameters: HashMap::new(),
            priority: None,
            agent: None,
            depends_on: Vec::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: HashMap<String, JsonValue>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Pins the step to an agent.
    #[must_use]
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    /// Adds explicit step-index dependencies (parallel mode only).
    #[must_use]
    pub fn with_depends_on(mut self, depends_on: Vec<usize>) -> Self {
        self.depends_on = depends_on;
        self
    }
}

/// Book-keeping for one created workflow: its constituent task ids, in
/// step order. Workflow status is derived on demand from task statuses;
/// there is no separate workflow state machine.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRecord {
    /// Generated workflow id.
    pub workflow_id: String,
    /// Caller-supplied name.
    pub name: String,
    /// Execution mode the workflow was created with.
    pub mode: ExecutionMode,
    /// Task ids in step order.
    pub task_ids: Vec<String>,
}

/// Derived status snapshot for a workflow.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatus {
    /// Workflow id.
    pub workflow_id: String,
    /// Caller-supplied name.
    pub name: String,
    /// Total number of steps.
    pub total_steps: usize,
    /// Steps whose task completed.
    pub completed: usize,
    /// Steps whose task failed.
    pub failed: usize,
    /// Per-step task status, in step order.
    pub step_statuses: Vec<TaskStatus>,
    /// `completed`, `partial_failure`, or `executing`.
    pub status: String,
}

impl WorkflowStatus {
    /// Derives a status snapshot from the record's task statuses.
    #[must_use]
    pub fn derive(record: &WorkflowRecord, step_statuses: Vec<TaskStatus>) -> Self {
        let completed = step_statuses
            .iter()
            .filter(|status| **status == TaskStatus::Completed)
            .count();
        let failed = step_statuses
            .iter()
            .filter(|status| **status == TaskStatus::Failed)
            .count();

        let status = if completed == step_statuses.len() {
            "completed"
        } else if failed > 0 {
            "partial_failure"
        } else {
            "executing"
        };

        Self {
            workflow_id: record.workflow_id.clone(),
            name: record.name.clone(),
            total_steps: step_statuses.len(),
            completed,
            failed,
            step_statuses,
            status: status.to_owned(),
        }
    }
}

/// Expands step descriptors into tasks with ids
/// `{workflow_id}_step_{index}`, chained per the execution mode.
///
/// # Errors
/// Returns an error if the step list is empty, a `depends_on` index is out
/// of range, or the explicit dependencies contain a cycle.
pub fn expand_workflow(
    name: &str,
    steps: &[WorkflowStep],
    mode: ExecutionMode,
) -> Result<(WorkflowRecord, Vec<Task>)> {
    if steps.is_empty() {
        return Err(OrchestratorError::EmptyWorkflow(name.to_owned()));
    }
    verify_step_dependencies(name, steps)?;

    let workflow_id = format!("workflow_{name}_{}", short_id());
    let step_ids: Vec<String> = (0..steps.len())
        .map(|index| format!("{workflow_id}_step_{index}"))
        .collect();

    let mut tasks = Vec::with_capacity(steps.len());
    for (index, step) in steps.iter().enumerate() {
        let description = step
            .description
            .clone()
            .unwrap_or_else(|| step.task_type.clone());
        let mut task = Task::new(&step.task_type, description)
            .with_id(&step_ids[index])
            .with_parameters(step.parameters.clone());
        if let Some(priority) = step.priority {
            task = task.with_priority(priority);
        }
        if let Some(agent) = &step.agent {
            task = task.with_assigned_agent(agent);
        }

        let dependencies: Vec<String> = match mode {
            ExecutionMode::Sequential => {
                if index == 0 {
                    Vec::new()
                } else {
                    vec![step_ids[index - 1].clone()]
                }
            }
            ExecutionMode::Parallel => step
                .depends_on
                .iter()
                .map(|&dependency| step_ids[dependency].clone())
                .collect(),
        };
        if !dependencies.is_empty() {
            task = task.with_dependencies(dependencies);
        }
        tasks.push(task);
    }

    let record = WorkflowRecord {
        workflow_id,
        name: name.to_owned(),
        mode,
        task_ids: step_ids,
    };
    Ok((record, tasks))
}

/// Rejects out-of-range or cyclic explicit step dependencies.
fn verify_step_dependencies(name: &str, steps: &[WorkflowStep]) -> Result<()> {
    let mut graph = DiGraph::<usize, ()>::new();
    let nodes: Vec<_> = (0..steps.len()).map(|index| graph.add_node(index)).collect();

    for (index, step) in steps.iter().enumerate() {
        for &dependency in &step.depends_on {
            if dependency >= steps.len() {
                return Err(OrchestratorError::UnknownStepDependency {
                    step: index,
                    dependency,
                });
            }
            graph.add_edge(nodes[dependency], nodes[index], ());
        }
    }

    if is_cyclic_directed(&graph) {
        return Err(OrchestratorError::CyclicDependency(format!(
            "workflow '{name}' step dependencies form a cycle"
        )));
    }
    Ok(())
}
