//! End-to-end orchestrator scenarios driven by deterministic `tick`
//! calls against a mock agent.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use ensemble_agent::{ExecutionMode, FrameworkConfig, Orchestrator, WorkflowStep};
use ensemble_core::traits::Agent;
use ensemble_core::{
    AgentRegistration, AgentStatus, Context, Error, Result, Task, TaskResult, TaskStatus,
};
use serde_json::json;

struct MockAgent {
    registration: AgentRegistration,
    fail_task_types: Vec<String>,
    setup_fails: bool,
    setup_delay_ms: u64,
    executed: StdMutex<Vec<String>>,
    seen_contexts: StdMutex<Vec<Option<String>>>,
    stops: StdMutex<usize>,
}

impl MockAgent {
    fn new(name: &str, task_types: &[&str]) -> Arc<Self> {
        Self::with_slots(name, task_types, 3)
    }

    fn with_slots(name: &str, task_types: &[&str], slots: usize) -> Arc<Self> {
        let registration = AgentRegistration::new(name)
            .with_capabilities(vec![
                "file_operations".to_owned(),
                "directory_operations".to_owned(),
            ])
            .with_supported_task_types(task_types.iter().map(ToString::to_string).collect())
            .with_max_concurrent_tasks(slots);
        Arc::new(Self {
            registration,
            fail_task_types: Vec::new(),
            setup_fails: false,
            setup_delay_ms: 0,
            executed: StdMutex::new(Vec::new()),
            seen_contexts: StdMutex::new(Vec::new()),
            stops: StdMutex::new(0),
        })
    }

    fn failing_on(name: &str, task_types: &[&str], fail_task_types: &[&str]) -> Arc<Self> {
        let mut agent = Self::new(name, task_types);
        Arc::get_mut(&mut agent).unwrap().fail_task_types =
            fail_task_types.iter().map(ToString::to_string).collect();
        agent
    }

    fn broken_setup(name: &str) -> Arc<Self> {
        let mut agent = Self::new(name, &["read_file"]);
        Arc::get_mut(&mut agent).unwrap().setup_fails = true;
        agent
    }

    fn slow_setup(name: &str, delay_ms: u64) -> Arc<Self> {
        let mut agent = Self::new(name, &["read_file"]);
        Arc::get_mut(&mut agent).unwrap().setup_delay_ms = delay_ms;
        agent
    }

    fn executed_ids(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    fn stop_count(&self) -> usize {
        *self.stops.lock().unwrap()
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn name(&self) -> &str {
        &self.registration.name
    }

    fn registration(&self) -> &AgentRegistration {
        &self.registration
    }

    async fn setup(&self) -> Result<()> {
        if self.setup_fails {
            return Err(Error::Agent("setup refused".to_owned()));
        }
        if self.setup_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.setup_delay_ms)).await;
        }
        Ok(())
    }

    async fn execute_task(&self, task: &Task, context: Option<&Context>) -> Result<TaskResult> {
        self.executed.lock().unwrap().push(task.id.clone());
        self.seen_contexts
            .lock()
            .unwrap()
            .push(context.map(|ctx| ctx.conversation_id.clone()));
        if self.fail_task_types.contains(&task.task_type) {
            return Err(Error::Agent(format!("cannot run {}", task.task_type)));
        }
        Ok(TaskResult::success(&task.id, Some(json!({"ok": true}))))
    }

    async fn stop(&self) -> Result<()> {
        *self.stops.lock().unwrap() += 1;
        Ok(())
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

fn test_config() -> FrameworkConfig {
    let mut config = FrameworkConfig::default();
    config.context.enable_persistence = false;
    config
}

fn orchestrator() -> Orchestrator {
    Orchestrator::new(test_config()).unwrap()
}

#[tokio::test]
async fn test_register_and_unregister() {
    let orchestrator = orchestrator();

    assert!(orchestrator.register_agent(MockAgent::new("worker", &["read_file"])).await);
    assert!(!orchestrator.register_agent(MockAgent::new("worker", &["read_file"])).await);

    let info = orchestrator.get_agent_status("worker").await.unwrap();
    assert_eq!(info.status, AgentStatus::Healthy);
    assert_eq!(info.registration.name, "worker");

    assert!(orchestrator.unregister_agent("worker").await);
    assert!(!orchestrator.unregister_agent("worker").await);
    assert!(orchestrator.get_agent_status("worker").await.is_none());
}

#[tokio::test]
async fn test_concurrent_registration_keeps_one_agent() {
    let orchestrator = orchestrator();
    let first = MockAgent::slow_setup("worker", 30);
    let second = MockAgent::slow_setup("worker", 30);

    // Both pass the initial name check before either setup finishes.
    let (first_ok, second_ok) = tokio::join!(
        orchestrator.register_agent(Arc::clone(&first) as Arc<dyn Agent>),
        orchestrator.register_agent(Arc::clone(&second) as Arc<dyn Agent>),
    );

    assert!(first_ok != second_ok);
    assert_eq!(
        orchestrator.get_system_status().await.agents,
        vec!["worker".to_owned()]
    );
    // The loser is stopped rather than left running unregistered.
    assert_eq!(first.stop_count() + second.stop_count(), 1);
}

#[tokio::test]
async fn test_failed_setup_leaves_no_registration() {
    let orchestrator = orchestrator();
    assert!(!orchestrator.register_agent(MockAgent::broken_setup("broken")).await);
    assert!(orchestrator.get_agent_status("broken").await.is_none());
}

#[tokio::test]
async fn test_submit_and_execute() {
    let orchestrator = orchestrator();
    let agent = MockAgent::new("worker", &["read_file"]);
    orchestrator.register_agent(Arc::clone(&agent) as Arc<dyn Agent>).await;

    let task_id = orchestrator
        .submit_task(Task::new("read_file", "read the readme"))
        .await;
    assert_eq!(
        orchestrator.get_task_status(&task_id).await,
        Some(TaskStatus::Pending)
    );

    assert_eq!(orchestrator.tick().await, 1);

    assert_eq!(
        orchestrator.get_task_status(&task_id).await,
        Some(TaskStatus::Completed)
    );
    let result = orchestrator.get_task_result(&task_id).await.unwrap();
    assert!(result.success);
    assert!(result.execution_time.is_some());
    assert_eq!(agent.executed_ids(), vec![task_id]);

    let info = orchestrator.get_agent_status("worker").await.unwrap();
    assert_eq!(info.total_tasks_completed, 1);
    assert!(info.current_tasks.is_empty());
}

#[tokio::test]
async fn test_no_suitable_agent_is_terminal() {
    let orchestrator = orchestrator();
    let task_id = orchestrator
        .submit_task(Task::new("launch_rocket", "unsupported"))
        .await;

    assert_eq!(orchestrator.tick().await, 0);

    assert_eq!(
        orchestrator.get_task_status(&task_id).await,
        Some(TaskStatus::Failed)
    );
    let result = orchestrator.get_task_result(&task_id).await.unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("No suitable agent"));

    // Not requeued: the next tick finds nothing to do.
    assert_eq!(orchestrator.tick().await, 0);
}

#[tokio::test]
async fn test_dependencies_gate_dispatch() {
    let orchestrator = orchestrator();
    let agent = MockAgent::new("worker", &["read_file"]);
    orchestrator.register_agent(Arc::clone(&agent) as Arc<dyn Agent>).await;

    let first = orchestrator
        .submit_task(Task::new("read_file", "first").with_id("t1"))
        .await;
    let second = orchestrator
        .submit_task(
            Task::new("read_file", "second")
                .with_id("t2")
                .with_dependencies(vec![first.clone()]),
        )
        .await;

    assert_eq!(orchestrator.tick().await, 1);
    assert_eq!(
        orchestrator.get_task_status(&second).await,
        Some(TaskStatus::Pending)
    );

    assert_eq!(orchestrator.tick().await, 1);
    assert_eq!(
        orchestrator.get_task_status(&second).await,
        Some(TaskStatus::Completed)
    );
    assert_eq!(agent.executed_ids(), vec![first, second]);
}

#[tokio::test]
async fn test_global_concurrency_ceiling() {
    let mut config = test_config();
    config.orchestrator.max_concurrent_tasks = 1;
    let orchestrator = Orchestrator::new(config).unwrap();
    orchestrator.register_agent(MockAgent::new("worker", &["read_file"])).await;

    orchestrator.submit_task(Task::new("read_file", "a")).await;
    orchestrator.submit_task(Task::new("read_file", "b")).await;

    assert_eq!(orchestrator.tick().await, 1);
    assert_eq!(orchestrator.tick().await, 1);
    assert_eq!(orchestrator.tick().await, 0);
}

#[tokio::test]
async fn test_one_tick_spreads_load_across_agents() {
    let orchestrator = orchestrator();
    orchestrator
        .register_agent(MockAgent::with_slots("alpha", &["read_file"], 1))
        .await;
    orchestrator
        .register_agent(MockAgent::with_slots("beta", &["read_file"], 1))
        .await;

    orchestrator.submit_task(Task::new("read_file", "a")).await;
    orchestrator.submit_task(Task::new("read_file", "b")).await;

    // Each agent has one slot and the 0.8 ceiling excludes a booked
    // agent, so both tasks go out in one tick, one to each.
    assert_eq!(orchestrator.tick().await, 2);
    let alpha = orchestrator.get_agent_status("alpha").await.unwrap();
    let beta = orchestrator.get_agent_status("beta").await.unwrap();
    assert_eq!(alpha.total_tasks_completed, 1);
    assert_eq!(beta.total_tasks_completed, 1);
}

#[tokio::test]
async fn test_pinned_agent_wins_ties() {
    let orchestrator = orchestrator();
    orchestrator.register_agent(MockAgent::new("alpha", &["read_file"])).await;
    orchestrator.register_agent(MockAgent::new("zeta", &["read_file"])).await;

    let unpinned = orchestrator.submit_task(Task::new("read_file", "tie")).await;
    let pinned = orchestrator
        .submit_task(Task::new("read_file", "pinned").with_assigned_agent("zeta"))
        .await;
    orchestrator.tick().await;

    let alpha = orchestrator.get_agent_status("alpha").await.unwrap();
    let zeta = orchestrator.get_agent_status("zeta").await.unwrap();
    // The tie goes to the lexicographically first agent; the pin
    // overrides scoring entirely.
    assert_eq!(alpha.total_tasks_completed, 1);
    assert_eq!(zeta.total_tasks_completed, 1);
    assert!(orchestrator.get_task_result(&unpinned).await.unwrap().success);
    assert!(orchestrator.get_task_result(&pinned).await.unwrap().success);
}

#[tokio::test]
async fn test_execution_error_reverts_agent_bookkeeping() {
    let orchestrator = orchestrator();
    let agent = MockAgent::failing_on("worker", &["read_file", "explode"], &["explode"]);
    orchestrator.register_agent(Arc::clone(&agent) as Arc<dyn Agent>).await;

    let task_id = orchestrator.submit_task(Task::new("explode", "boom")).await;
    assert_eq!(orchestrator.tick().await, 1);

    assert_eq!(
        orchestrator.get_task_status(&task_id).await,
        Some(TaskStatus::Failed)
    );
    let result = orchestrator.get_task_result(&task_id).await.unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("cannot run explode"));

    let info = orchestrator.get_agent_status("worker").await.unwrap();
    assert!(info.current_tasks.is_empty());
    assert_eq!(info.error_count, 1);
    assert_eq!(info.total_tasks_completed, 0);

    // The scheduler survives and keeps executing other work.
    let next = orchestrator.submit_task(Task::new("read_file", "after")).await;
    orchestrator.tick().await;
    assert!(orchestrator.get_task_result(&next).await.unwrap().success);
}

#[tokio::test]
async fn test_cancel_pending_task_only() {
    let orchestrator = orchestrator();
    orchestrator.register_agent(MockAgent::new("worker", &["read_file"])).await;

    let task_id = orchestrator.submit_task(Task::new("read_file", "a")).await;
    assert!(orchestrator.cancel_task(&task_id).await);
    assert_eq!(
        orchestrator.get_task_status(&task_id).await,
        Some(TaskStatus::Cancelled)
    );
    assert!(!orchestrator.cancel_task(&task_id).await);
    assert!(!orchestrator.cancel_task("unknown").await);

    assert_eq!(orchestrator.tick().await, 0);
}

#[tokio::test]
async fn test_heartbeat_staleness_and_recovery() {
    let mut config = test_config();
    config.orchestrator.heartbeat_interval_secs = 0;
    let orchestrator = Orchestrator::new(config).unwrap();
    orchestrator.register_agent(MockAgent::new("worker", &["read_file"])).await;

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    orchestrator.check_heartbeats().await;
    assert_eq!(
        orchestrator.get_agent_status("worker").await.unwrap().status,
        AgentStatus::Unhealthy
    );

    assert!(orchestrator.record_heartbeat("worker").await);
    assert!(!orchestrator.record_heartbeat("ghost").await);
    assert_eq!(
        orchestrator.get_agent_status("worker").await.unwrap().status,
        AgentStatus::Healthy
    );
}

#[tokio::test]
async fn test_health_check_garbage_collects_old_tasks() {
    let mut config = test_config();
    config.orchestrator.task_retention_secs = 0;
    let orchestrator = Orchestrator::new(config).unwrap();
    orchestrator.register_agent(MockAgent::new("worker", &["read_file"])).await;

    let task_id = orchestrator.submit_task(Task::new("read_file", "a")).await;
    orchestrator.tick().await;
    assert!(orchestrator.get_task_result(&task_id).await.is_some());

    orchestrator.run_health_check().await;
    assert!(orchestrator.get_task_status(&task_id).await.is_none());
    assert!(orchestrator.get_task_result(&task_id).await.is_none());
}

#[tokio::test]
async fn test_context_travels_with_task() {
    let orchestrator = orchestrator();
    let agent = MockAgent::new("worker", &["read_file"]);
    orchestrator.register_agent(Arc::clone(&agent) as Arc<dyn Agent>).await;

    let contexts = orchestrator.context_manager();
    contexts.lock().await.create_context("conv-1", "alice", None);

    let task_id = orchestrator
        .submit_task_in_context(Task::new("read_file", "scoped"), Some("conv-1"))
        .await;
    {
        let mut contexts = contexts.lock().await;
        let context = contexts.get_context("conv-1").unwrap();
        assert!(context.has_task(&task_id));
    }

    orchestrator.tick().await;

    let seen = agent.seen_contexts.lock().unwrap().clone();
    assert_eq!(seen, vec![Some("conv-1".to_owned())]);
    // Terminal tasks are detached from their context.
    let mut contexts = contexts.lock().await;
    assert!(contexts.get_context("conv-1").unwrap().active_tasks.is_empty());
}

#[tokio::test]
async fn test_system_status_snapshot() {
    let orchestrator = orchestrator();
    orchestrator.register_agent(MockAgent::new("worker", &["read_file"])).await;

    orchestrator.submit_task(Task::new("read_file", "a")).await;
    orchestrator.submit_task(Task::new("read_file", "b")).await;
    orchestrator.tick().await;
    orchestrator.submit_task(Task::new("read_file", "c")).await;

    let status = orchestrator.get_system_status().await;
    assert!(!status.running);
    assert_eq!(status.agents, vec!["worker".to_owned()]);
    assert_eq!(status.healthy_agents, 1);
    assert_eq!(status.queued_tasks, 1);
    assert_eq!(status.task_counts.get("completed"), Some(&2));
    assert_eq!(status.task_counts.get("pending"), Some(&1));
    assert_eq!(status.routing.total_routed, 2);
    assert_eq!(status.routing.successful_matches, 2);
}

#[tokio::test]
async fn test_background_loops_execute_tasks() {
    init_tracing();
    let orchestrator = orchestrator();
    orchestrator.register_agent(MockAgent::new("worker", &["read_file"])).await;
    orchestrator.start().await;

    let task_id = orchestrator.submit_task(Task::new("read_file", "a")).await;
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;

    assert_eq!(
        orchestrator.get_task_status(&task_id).await,
        Some(TaskStatus::Completed)
    );
    orchestrator.stop().await;
    assert_eq!(
        orchestrator.get_agent_status("worker").await.unwrap().status,
        AgentStatus::Offline
    );
    assert!(!orchestrator.get_system_status().await.running);
}

#[tokio::test]
async fn test_sequential_workflow_completes() {
    let orchestrator = orchestrator();
    let agent = MockAgent::new("worker", &["read_file", "process_data"]);
    orchestrator.register_agent(Arc::clone(&agent) as Arc<dyn Agent>).await;

    let workflow_id = orchestrator
        .create_workflow(
            "etl",
            &[
                WorkflowStep::new("read_file"),
                WorkflowStep::new("process_data"),
            ],
            ExecutionMode::Sequential,
        )
        .await
        .unwrap();

    assert_eq!(orchestrator.tick().await, 1);
    let mid = orchestrator.get_workflow_status(&workflow_id).await.unwrap();
    assert_eq!(mid.status, "executing");
    assert_eq!(mid.completed, 1);

    assert_eq!(orchestrator.tick().await, 1);
    let done = orchestrator.get_workflow_status(&workflow_id).await.unwrap();
    assert_eq!(done.status, "completed");
    assert_eq!(done.completed, 2);
    assert_eq!(
        agent.executed_ids(),
        vec![
            format!("{workflow_id}_step_0"),
            format!("{workflow_id}_step_1"),
        ]
    );
}

#[tokio::test]
async fn test_failed_step_stalls_successors_by_default() {
    let orchestrator = orchestrator();
    let agent = MockAgent::failing_on(
        "worker",
        &["explode", "read_file"],
        &["explode"],
    );
    orchestrator.register_agent(Arc::clone(&agent) as Arc<dyn Agent>).await;

    let workflow_id = orchestrator
        .create_workflow(
            "doomed",
            &[
                WorkflowStep::new("explode"),
                WorkflowStep::new("read_file"),
                WorkflowStep::new("read_file"),
            ],
            ExecutionMode::Sequential,
        )
        .await
        .unwrap();

    assert_eq!(orchestrator.tick().await, 1);
    assert_eq!(orchestrator.tick().await, 0);
    assert_eq!(orchestrator.tick().await, 0);

    let status = orchestrator.get_workflow_status(&workflow_id).await.unwrap();
    assert_eq!(status.status, "partial_failure");
    assert_eq!(status.failed, 1);
    // Steps 2 and 3 wait forever on the failed step; they are never
    // cancelled or failed automatically.
    assert_eq!(
        status.step_statuses[1..],
        [TaskStatus::Pending, TaskStatus::Pending]
    );
}

#[tokio::test]
async fn test_fail_fast_propagates_dependency_failure() {
    let mut config = test_config();
    config.orchestrator.fail_fast_on_failed_dependency = true;
    let orchestrator = Orchestrator::new(config).unwrap();
    let agent = MockAgent::failing_on("worker", &["explode", "read_file"], &["explode"]);
    orchestrator.register_agent(Arc::clone(&agent) as Arc<dyn Agent>).await;

    let workflow_id = orchestrator
        .create_workflow(
            "doomed",
            &[
                WorkflowStep::new("explode"),
                WorkflowStep::new("read_file"),
                WorkflowStep::new("read_file"),
            ],
            ExecutionMode::Sequential,
        )
        .await
        .unwrap();

    orchestrator.tick().await;
    orchestrator.tick().await;
    orchestrator.tick().await;

    let status = orchestrator.get_workflow_status(&workflow_id).await.unwrap();
    assert_eq!(status.failed, 3);
    let second = orchestrator
        .get_task_result(&format!("{workflow_id}_step_1"))
        .await
        .unwrap();
    assert!(second.error.unwrap().contains("Dependency"));
}

#[tokio::test]
async fn test_parallel_workflow_fan_in() {
    let orchestrator = orchestrator();
    let agent = MockAgent::new("worker", &["read_file", "process_data"]);
    orchestrator.register_agent(Arc::clone(&agent) as Arc<dyn Agent>).await;

    let workflow_id = orchestrator
        .create_workflow(
            "fanin",
            &[
                WorkflowStep::new("read_file"),
                WorkflowStep::new("read_file"),
                WorkflowStep::new("process_data").with_depends_on(vec![0, 1]),
            ],
            ExecutionMode::Parallel,
        )
        .await
        .unwrap();

    // Both independent steps go out together; the fan-in step waits.
    assert_eq!(orchestrator.tick().await, 2);
    assert_eq!(orchestrator.tick().await, 1);
    let status = orchestrator.get_workflow_status(&workflow_id).await.unwrap();
    assert_eq!(status.status, "completed");
}

#[tokio::test]
async fn test_verify_acyclic_rejects_cycles() {
    let orchestrator = orchestrator();
    orchestrator
        .submit_task(
            Task::new("read_file", "a")
                .with_id("a")
                .with_dependencies(vec!["b".to_owned()]),
        )
        .await;
    orchestrator
        .submit_task(
            Task::new("read_file", "b")
                .with_id("b")
                .with_dependencies(vec!["a".to_owned()]),
        )
        .await;

    assert!(orchestrator.verify_acyclic().await.is_err());
}
