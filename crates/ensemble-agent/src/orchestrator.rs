//! The orchestrator: agent registry, task table and queue, scheduling
//! tick, background loops, and workflows.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use ensemble_context::ContextManager;
use ensemble_core::traits::Agent;
use ensemble_core::{AgentInfo, AgentStatus, Context, Task, TaskResult, TaskStatus};
use ensemble_routing::{RoutingStats, TaskRouter};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::config::{FrameworkConfig, OrchestratorConfig};
use crate::error::{OrchestratorError, Result};
use crate::workflow::{
    ExecutionMode, WorkflowRecord, WorkflowStatus, WorkflowStep, expand_workflow,
};

/// Read-only snapshot of the whole system.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    /// Whether the background loops are running.
    pub running: bool,
    /// Registered agent names, sorted.
    pub agents: Vec<String>,
    /// Number of agents currently healthy.
    pub healthy_agents: usize,
    /// Tasks waiting in the queue.
    pub queued_tasks: usize,
    /// Task counts keyed by status name.
    pub task_counts: BTreeMap<String, usize>,
    /// Accumulated routing statistics.
    pub routing: RoutingStats,
}

struct AgentEntry {
    info: AgentInfo,
    handle: Arc<dyn Agent>,
}

struct State {
    agents: HashMap<String, AgentEntry>,
    tasks: HashMap<String, Task>,
    queue: VecDeque<String>,
    results: HashMap<String, TaskResult>,
    task_contexts: HashMap<String, String>,
    workflows: HashMap<String, WorkflowRecord>,
    router: TaskRouter,
    running: bool,
}

impl State {
    fn agent_snapshot(&self) -> HashMap<String, AgentInfo> {
        self.agents
            .iter()
            .map(|(name, entry)| (name.clone(), entry.info.clone()))
            .collect()
    }

    fn running_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|task| task.status == TaskStatus::Running)
            .count()
    }
}

/// One task handed to an agent within a tick.
struct Dispatch {
    task: Task,
    agent_name: String,
    handle: Arc<dyn Agent>,
    context: Option<Context>,
}

/// The completion of one dispatched task.
struct Outcome {
    task_id: String,
    agent_name: String,
    elapsed_secs: f64,
    result: ensemble_core::Result<TaskResult>,
}

/// Central controller: owns the agent registry, the task table and queue,
/// the router, and the context manager, and drives execution either via
/// background loops (`start`/`stop`) or explicit `tick` calls.
pub struct Orchestrator {
    config: OrchestratorConfig,
    state: Arc<Mutex<State>>,
    contexts: Arc<Mutex<ContextManager>>,
    shutdown: watch::Sender<bool>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Creates an orchestrator from a framework config.
    ///
    /// # Errors
    /// Returns an error if the context storage directory cannot be
    /// created.
    pub fn new(config: FrameworkConfig) -> Result<Self> {
        let contexts = ContextManager::new(config.context)?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            config: config.orchestrator,
            state: Arc::new(Mutex::new(State {
                agents: HashMap::new(),
                tasks: HashMap::new(),
                queue: VecDeque::new(),
                results: HashMap::new(),
                task_contexts: HashMap::new(),
                workflows: HashMap::new(),
                router: TaskRouter::new(config.router),
                running: false,
            })),
            contexts: Arc::new(Mutex::new(contexts)),
            shutdown,
            loops: Mutex::new(Vec::new()),
        })
    }

    /// Shared handle to the context manager.
    #[must_use]
    pub fn context_manager(&self) -> Arc<Mutex<ContextManager>> {
        Arc::clone(&self.contexts)
    }

    /// Registers an agent: runs its setup step and, on success, stores a
    /// healthy registration. Returns `false` (leaving no state behind) if
    /// the name is taken or setup fails.
    pub async fn register_agent(&self, agent: Arc<dyn Agent>) -> bool {
        let name = agent.name().to_owned();
        if self.state.lock().await.agents.contains_key(&name) {
            tracing::warn!("agent {name} is already registered");
            return false;
        }

        if let Err(error) = agent.setup().await {
            tracing::warn!("agent {name} setup failed: {error}");
            return false;
        }

        let mut info = AgentInfo::new(agent.registration().clone());
        info.status = AgentStatus::Healthy;
        info.last_heartbeat = Utc::now();
        {
            // The lock was released across setup; the name may have been
            // claimed in the meantime.
            let mut state = self.state.lock().await;
            if !state.agents.contains_key(&name) {
                state
                    .agents
                    .insert(name.clone(), AgentEntry { info, handle: Arc::clone(&agent) });
                tracing::info!("registered agent: {name}");
                return true;
            }
        }

        tracing::warn!("agent {name} was registered concurrently");
        if let Err(error) = agent.stop().await {
            tracing::warn!("agent {name} stop failed: {error}");
        }
        false
    }

    /// Unregisters an agent, calling its stop step. Returns `false` if
    /// the name is unknown.
    pub async fn unregister_agent(&self, name: &str) -> bool {
        let entry = self.state.lock().await.agents.remove(name);
        let Some(entry) = entry else {
            return false;
        };
        if let Err(error) = entry.handle.stop().await {
            tracing::warn!("agent {name} stop failed: {error}");
        }
        tracing::info!("unregistered agent: {name}");
        true
    }

    /// Records a liveness report from an agent, refreshing its heartbeat
    /// timestamp and restoring it to healthy. Returns `false` if the name
    /// is unknown.
    pub async fn record_heartbeat(&self, name: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(entry) = state.agents.get_mut(name) else {
            return false;
        };
        entry.info.last_heartbeat = Utc::now();
        entry.info.status = AgentStatus::Healthy;
        true
    }

    /// Submits a task for asynchronous execution; returns its id
    /// immediately.
    pub async fn submit_task(&self, task: Task) -> String {
        self.submit_task_in_context(task, None).await
    }

    /// Submits a task associated with a conversation context. The context
    /// (if it exists) is passed to the executing agent and the task is
    /// listed among the context's active tasks.
    pub async fn submit_task_in_context(
        &self,
        task: Task,
        conversation_id: Option<&str>,
    ) -> String {
        let task_id = task.id.clone();
        if let Some(conversation_id) = conversation_id {
            let mut contexts = self.contexts.lock().await;
            if !contexts.add_task_to_context(conversation_id, task.clone()) {
                tracing::warn!("unknown context {conversation_id} for task {task_id}");
            }
        }

        let mut state = self.state.lock().await;
        if let Some(conversation_id) = conversation_id {
            state
                .task_contexts
                .insert(task_id.clone(), conversation_id.to_owned());
        }
        state.tasks.insert(task_id.clone(), task);
        state.queue.push_back(task_id.clone());
        let queued = state.queue.len();
        tracing::info!("submitted task {task_id} ({queued} queued)");
        task_id
    }

    /// Cancels a still-pending task. Running tasks cannot be preempted;
    /// returns `false` for them and for unknown ids.
    pub async fn cancel_task(&self, task_id: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(task) = state.tasks.get_mut(task_id) else {
            return false;
        };
        if task.status != TaskStatus::Pending {
            return false;
        }
        task.mark_cancelled();
        state.queue.retain(|queued| queued != task_id);
        tracing::info!("cancelled task {task_id}");
        true
    }

    /// Current status of a task, if known.
    pub async fn get_task_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.state.lock().await.tasks.get(task_id).map(|task| task.status)
    }

    /// Stored result of a terminal task, if known.
    pub async fn get_task_result(&self, task_id: &str) -> Option<TaskResult> {
        self.state.lock().await.results.get(task_id).cloned()
    }

    /// Rejects the current task table if its dependency edges contain a
    /// cycle.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::CyclicDependency`] when a cycle
    /// exists.
    pub async fn verify_acyclic(&self) -> Result<()> {
        let state = self.state.lock().await;
        let mut graph = DiGraph::<&str, ()>::new();
        let nodes: HashMap<&str, _> = state
            .tasks
            .keys()
            .map(|id| (id.as_str(), graph.add_node(id.as_str())))
            .collect();
        for task in state.tasks.values() {
            for dependency in &task.dependencies {
                if let Some(&from) = nodes.get(dependency.as_str()) {
                    graph.add_edge(from, nodes[task.id.as_str()], ());
                }
            }
        }
        if is_cyclic_directed(&graph) {
            return Err(OrchestratorError::CyclicDependency(
                "task dependencies form a cycle".to_owned(),
            ));
        }
        Ok(())
    }

    /// Expands step descriptors into dependency-chained tasks and submits
    /// them all; returns the workflow id.
    ///
    /// # Errors
    /// Returns an error if the step list is empty or its explicit
    /// dependencies are out of range or cyclic.
    pub async fn create_workflow(
        &self,
        name: &str,
        steps: &[WorkflowStep],
        mode: ExecutionMode,
    ) -> Result<String> {
        let (record, tasks) = expand_workflow(name, steps, mode)?;
        let workflow_id = record.workflow_id.clone();

        let mut state = self.state.lock().await;
        for task in tasks {
            let task_id = task.id.clone();
            state.tasks.insert(task_id.clone(), task);
            state.queue.push_back(task_id);
        }
        let steps_total = record.task_ids.len();
        state.workflows.insert(workflow_id.clone(), record);
        tracing::info!("created workflow {workflow_id} with {steps_total} steps");
        Ok(workflow_id)
    }

    /// Derived status of a workflow, if known.
    pub async fn get_workflow_status(&self, workflow_id: &str) -> Option<WorkflowStatus> {
        let state = self.state.lock().await;
        let record = state.workflows.get(workflow_id)?;
        let statuses = record
            .task_ids
            .iter()
            .map(|task_id| {
                state.tasks.get(task_id).map_or_else(
                    || {
                        // Garbage-collected step: infer from its result.
                        state.results.get(task_id).map_or(TaskStatus::Pending, |result| {
                            if result.success {
                                TaskStatus::Completed
                            } else {
                                TaskStatus::Failed
                            }
                        })
                    },
                    |task| task.status,
                )
            })
            .collect();
        Some(WorkflowStatus::derive(record, statuses))
    }

    /// Read-only snapshot of agents, tasks, and routing counters.
    pub async fn get_system_status(&self) -> SystemStatus {
        let state = self.state.lock().await;
        let mut agents: Vec<String> = state.agents.keys().cloned().collect();
        agents.sort();
        let healthy_agents = state
            .agents
            .values()
            .filter(|entry| entry.info.status == AgentStatus::Healthy)
            .count();
        let mut task_counts = BTreeMap::new();
        for task in state.tasks.values() {
            *task_counts.entry(task.status.to_string()).or_insert(0) += 1;
        }
        SystemStatus {
            running: state.running,
            agents,
            healthy_agents,
            queued_tasks: state.queue.len(),
            task_counts,
            routing: state.router.stats().clone(),
        }
    }

    /// Snapshot of one agent's registration, load, and counters.
    pub async fn get_agent_status(&self, name: &str) -> Option<AgentInfo> {
        self.state
            .lock()
            .await
            .agents
            .get(name)
            .map(|entry| entry.info.clone())
    }

    /// Runs one scheduling pass: dispatches every dependency-satisfied
    /// queued task up to the free concurrency budget, waits for all of
    /// them, and applies the outcomes. Returns the number of tasks
    /// dispatched.
    ///
    /// The background task-processor loop calls this on a fixed cadence;
    /// tests call it directly for deterministic scheduling.
    pub async fn tick(&self) -> usize {
        run_tick(&self.state, &self.contexts, &self.config).await
    }

    /// Runs one heartbeat-monitor pass, flipping agents unseen for twice
    /// the heartbeat interval to unhealthy. The heartbeat loop calls this
    /// on a fixed cadence.
    pub async fn check_heartbeats(&self) {
        check_heartbeats(&self.state, &self.config).await;
    }

    /// Runs one health-check pass: degraded-health and queue-growth
    /// warnings, garbage collection of old terminal tasks, and expired
    /// context cleanup. The health-check loop calls this on a fixed
    /// cadence.
    pub async fn run_health_check(&self) {
        run_health_check(&self.state, &self.contexts, &self.config).await;
    }

    /// Starts the background loops (task processor, heartbeat monitor,
    /// health check). Idempotent while already running.
    pub async fn start(&self) {
        {
            let mut state = self.state.lock().await;
            if state.running {
                return;
            }
            state.running = true;
        }
        self.shutdown.send_replace(false);

        let mut loops = self.loops.lock().await;
        loops.push(spawn_processor_loop(
            Arc::clone(&self.state),
            Arc::clone(&self.contexts),
            self.config.clone(),
            self.shutdown.subscribe(),
        ));
        loops.push(spawn_heartbeat_loop(
            Arc::clone(&self.state),
            self.config.clone(),
            self.shutdown.subscribe(),
        ));
        loops.push(spawn_health_loop(
            Arc::clone(&self.state),
            Arc::clone(&self.contexts),
            self.config.clone(),
            self.shutdown.subscribe(),
        ));
        tracing::info!("orchestrator started");
    }

    /// Stops the background loops and every registered agent. Agents stay
    /// registered but are marked offline.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        let handles: Vec<JoinHandle<()>> = self.loops.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(error) = handle.await {
                tracing::warn!("background loop ended abnormally: {error}");
            }
        }

        let agent_handles: Vec<(String, Arc<dyn Agent>)> = {
            let mut state = self.state.lock().await;
            state.running = false;
            for entry in state.agents.values_mut() {
                entry.info.status = AgentStatus::Offline;
            }
            state
                .agents
                .iter()
                .map(|(name, entry)| (name.clone(), Arc::clone(&entry.handle)))
                .collect()
        };
        for (name, handle) in agent_handles {
            if let Err(error) = handle.stop().await {
                tracing::warn!("agent {name} stop failed: {error}");
            }
        }
        tracing::info!("orchestrator stopped");
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Readiness of one queued task relative to its dependencies.
enum DependencyState {
    Ready,
    Waiting,
    Failed(String),
}

fn dependency_state(task: &Task, tasks: &HashMap<String, Task>) -> DependencyState {
    let mut waiting = false;
    for dependency in &task.dependencies {
        match tasks.get(dependency).map(|dep| dep.status) {
            Some(TaskStatus::Completed) => {}
            Some(TaskStatus::Failed | TaskStatus::Cancelled) => {
                return DependencyState::Failed(dependency.clone());
            }
            // Unknown dependency ids never complete; the task waits.
            Some(_) | None => waiting = true,
        }
    }
    if waiting {
        DependencyState::Waiting
    } else {
        DependencyState::Ready
    }
}

async fn run_tick(
    state: &Mutex<State>,
    contexts: &Mutex<ContextManager>,
    config: &OrchestratorConfig,
) -> usize {
    let dispatches = collect_dispatches(state, contexts, config).await;
    if dispatches.is_empty() {
        return 0;
    }
    let dispatched = dispatches.len();

    let mut executions = JoinSet::new();
    for dispatch in dispatches {
        executions.spawn(async move {
            let started = Instant::now();
            let result = dispatch
                .handle
                .execute_task(&dispatch.task, dispatch.context.as_ref())
                .await;
            Outcome {
                task_id: dispatch.task.id,
                agent_name: dispatch.agent_name,
                elapsed_secs: started.elapsed().as_secs_f64(),
                result,
            }
        });
    }

    let mut outcomes = Vec::with_capacity(dispatched);
    while let Some(joined) = executions.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(error) => tracing::error!("task execution panicked: {error}"),
        }
    }
    apply_outcomes(state, contexts, outcomes).await;
    dispatched
}

/// Scans the queue in insertion order and claims every ready task up to
/// the free concurrency budget, marking each RUNNING and booking it on
/// its agent before any execution starts.
async fn collect_dispatches(
    state: &Mutex<State>,
    contexts: &Mutex<ContextManager>,
    config: &OrchestratorConfig,
) -> Vec<Dispatch> {
    let mut guard = state.lock().await;
    let state = &mut *guard;

    let free_slots = config
        .max_concurrent_tasks
        .saturating_sub(state.running_count());

    let mut ready = Vec::new();
    let mut failed_dependencies = Vec::new();
    let mut retained = VecDeque::new();
    for task_id in std::mem::take(&mut state.queue) {
        let Some(task) = state.tasks.get(&task_id) else {
            continue;
        };
        if task.status != TaskStatus::Pending {
            continue;
        }
        match dependency_state(task, &state.tasks) {
            DependencyState::Ready if ready.len() < free_slots => ready.push(task_id),
            DependencyState::Failed(dependency) if config.fail_fast_on_failed_dependency => {
                failed_dependencies.push((task_id, dependency));
            }
            // Unmet dependencies leave the task queued; with fail-fast
            // off a failed dependency means it waits forever.
            DependencyState::Ready | DependencyState::Waiting | DependencyState::Failed(_) => {
                retained.push_back(task_id);
            }
        }
    }
    state.queue = retained;

    for (task_id, dependency) in failed_dependencies {
        let error = format!("Dependency {dependency} failed");
        if let Some(task) = state.tasks.get_mut(&task_id) {
            task.mark_failed(&error);
        }
        state
            .results
            .insert(task_id.clone(), TaskResult::failure(&task_id, &error));
        tracing::warn!("task {task_id} failed fast: {error}");
    }

    let mut snapshot = state.agent_snapshot();
    let mut dispatches = Vec::new();
    for task_id in ready {
        let Some(task) = state.tasks.get(&task_id) else {
            continue;
        };
        let Some(agent_name) = state.router.find_best_agent(task, &snapshot) else {
            let error = "No suitable agent available";
            if let Some(task) = state.tasks.get_mut(&task_id) {
                task.mark_failed(error);
            }
            state
                .results
                .insert(task_id.clone(), TaskResult::failure(&task_id, error));
            tracing::warn!("task {task_id} failed: {error}");
            continue;
        };
        let Some(entry) = state.agents.get_mut(&agent_name) else {
            continue;
        };
        entry.info.current_tasks.push(task_id.clone());
        let handle = Arc::clone(&entry.handle);
        // Later routing decisions in this tick must see the booking.
        if let Some(info) = snapshot.get_mut(&agent_name) {
            info.current_tasks.push(task_id.clone());
        }
        if let Some(task) = state.tasks.get_mut(&task_id) {
            task.mark_running();
            task.assigned_agent = Some(agent_name.clone());
            tracing::info!("dispatching task {task_id} to {agent_name}");
            dispatches.push(Dispatch {
                task: task.clone(),
                agent_name,
                handle,
                context: None,
            });
        }
    }

    let conversation_ids: Vec<Option<String>> = dispatches
        .iter()
        .map(|dispatch| state.task_contexts.get(&dispatch.task.id).cloned())
        .collect();
    drop(guard);

    let mut contexts = contexts.lock().await;
    for (dispatch, conversation_id) in dispatches.iter_mut().zip(conversation_ids) {
        if let Some(conversation_id) = conversation_id {
            dispatch.context = contexts.get_context(&conversation_id);
        }
    }
    dispatches
}

/// Applies execution outcomes: terminal task transitions, stored results,
/// and per-agent bookkeeping. A failed execution reverts the agent's
/// current-task booking and bumps its error count; the loop itself never
/// fails.
async fn apply_outcomes(
    state: &Mutex<State>,
    contexts: &Mutex<ContextManager>,
    outcomes: Vec<Outcome>,
) {
    let mut terminal_ids = Vec::with_capacity(outcomes.len());
    let mut guard = state.lock().await;
    let state = &mut *guard;
    for outcome in outcomes {
        let task_id = outcome.task_id;
        terminal_ids.push(task_id.clone());
        let succeeded = match outcome.result {
            Ok(mut task_result) => {
                if task_result.execution_time.is_none() {
                    task_result = task_result.with_execution_time(outcome.elapsed_secs);
                }
                let succeeded = task_result.success;
                if let Some(task) = state.tasks.get_mut(&task_id) {
                    if succeeded {
                        task.mark_completed(task_result.data.clone());
                        tracing::info!("task {task_id} completed");
                    } else {
                        let error = task_result
                            .error
                            .clone()
                            .unwrap_or_else(|| "task failed".to_owned());
                        task.mark_failed(&error);
                        tracing::warn!("task {task_id} failed: {error}");
                    }
                }
                state.results.insert(task_id.clone(), task_result);
                succeeded
            }
            Err(error) => {
                let message = error.to_string();
                if let Some(task) = state.tasks.get_mut(&task_id) {
                    task.mark_failed(&message);
                }
                state.results.insert(
                    task_id.clone(),
                    TaskResult::failure(&task_id, &message)
                        .with_execution_time(outcome.elapsed_secs),
                );
                tracing::warn!("task {task_id} execution error: {message}");
                false
            }
        };

        if let Some(entry) = state.agents.get_mut(&outcome.agent_name) {
            entry.info.current_tasks.retain(|current| current != &task_id);
            if succeeded {
                entry.info.total_tasks_completed += 1;
            } else {
                entry.info.error_count += 1;
            }
        }
    }

    let detachments: Vec<(String, String)> = terminal_ids
        .iter()
        .filter_map(|task_id| {
            state
                .task_contexts
                .get(task_id)
                .map(|conversation_id| (conversation_id.clone(), task_id.clone()))
        })
        .collect();
    drop(guard);

    if !detachments.is_empty() {
        let mut contexts = contexts.lock().await;
        for (conversation_id, task_id) in detachments {
            contexts.remove_task_from_context(&conversation_id, &task_id);
        }
    }
}

/// Flips agents unseen for twice the heartbeat interval to unhealthy.
async fn check_heartbeats(state: &Mutex<State>, config: &OrchestratorConfig) {
    let stale_after = Duration::seconds(2 * config.heartbeat_interval_secs as i64);
    let now = Utc::now();
    let mut state = state.lock().await;
    for (name, entry) in &mut state.agents {
        if entry.info.status == AgentStatus::Healthy && now - entry.info.last_heartbeat > stale_after
        {
            entry.info.status = AgentStatus::Unhealthy;
            tracing::warn!("agent {name} missed heartbeats, marking unhealthy");
        }
    }
}

/// Logs degraded-health and queue-growth warnings and garbage-collects
/// terminal tasks past the retention window, together with their results
/// and context associations.
async fn run_health_check(
    state: &Mutex<State>,
    contexts: &Mutex<ContextManager>,
    config: &OrchestratorConfig,
) {
    let cutoff = Utc::now() - Duration::seconds(config.task_retention_secs as i64);
    {
        let mut guard = state.lock().await;
        let state = &mut *guard;

        let total = state.agents.len();
        if total > 0 {
            let healthy = state
                .agents
                .values()
                .filter(|entry| entry.info.status == AgentStatus::Healthy)
                .count();
            if healthy * 2 < total {
                tracing::warn!("only {healthy}/{total} agents healthy");
            }
        }
        if state.queue.len() > 100 {
            tracing::warn!("task queue is growing: {} pending", state.queue.len());
        }

        let expired: Vec<String> = state
            .tasks
            .iter()
            .filter(|&(_, task)| {
                task.status.is_terminal() && task.execution_end.unwrap_or(task.created_at) < cutoff
            })
            .map(|(task_id, _)| task_id.clone())
            .collect();
        for task_id in &expired {
            state.tasks.remove(task_id);
            state.results.remove(task_id);
            state.task_contexts.remove(task_id);
        }
        if !expired.is_empty() {
            tracing::info!("garbage collected {} old tasks", expired.len());
        }
    }

    contexts.lock().await.cleanup_expired_contexts();
}

fn spawn_processor_loop(
    state: Arc<Mutex<State>>,
    contexts: Arc<Mutex<ContextManager>>,
    config: OrchestratorConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(config.tick_interval_secs.max(1));
        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    run_tick(&state, &contexts, &config).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

fn spawn_heartbeat_loop(
    state: Arc<Mutex<State>>,
    config: OrchestratorConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(config.heartbeat_interval_secs.max(1));
        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    check_heartbeats(&state, &config).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

fn spawn_health_loop(
    state: Arc<Mutex<State>>,
    contexts: Arc<Mutex<ContextManager>>,
    config: OrchestratorConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(config.health_check_interval_secs.max(1));
        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    run_health_check(&state, &contexts, &config).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
