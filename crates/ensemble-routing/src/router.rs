//! Agent selection with weighted multi-criteria scoring.

use std::cmp::Ordering;
use std::collections::HashMap;

use ensemble_core::{AgentInfo, AgentStatus, Task};
use serde::Serialize;

use crate::analysis::RoutingAnalysis;
use crate::config::{CapabilityMap, RouterConfig};
use crate::stats::RoutingStats;

/// Per-criterion score breakdown for one agent, normalized to `[0, 1]`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AgentScore {
    /// Capability-overlap score.
    pub capability: f64,
    /// Inverse-workload score; strictly decreases as load grows.
    pub workload: f64,
    /// Priority-affinity score.
    pub priority: f64,
    /// Historical-performance score; neutral 0.5 for new agents.
    pub performance: f64,
    /// Weighted combination of the four criteria, in `[0, 1]`.
    pub total: f64,
    /// Whether the under-utilization bonus applied.
    pub load_balanced: bool,
    /// Whether both task and agent were in the high-priority class.
    pub priority_boosted: bool,
}

/// An agent name with its score breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredAgent {
    /// Agent name.
    pub name: String,
    /// Score breakdown.
    pub score: AgentScore,
}

/// Post-hoc explanation of a routing decision.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingValidation {
    /// The routed task.
    pub task_id: String,
    /// The agent that was selected.
    pub selected_agent: String,
    /// Whether the selected agent currently qualifies for the task.
    pub is_valid: bool,
    /// Human-readable reasons when the selection does not qualify.
    pub reasons: Vec<String>,
    /// The selected agent's combined score, when valid.
    pub score: Option<f64>,
    /// Top-scoring alternatives (at most three, excluding the selection).
    pub alternatives: Vec<ScoredAgent>,
}

/// Observed system performance, fed back into [`TaskRouter::optimize_config`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingPerformance {
    /// Fraction of tasks that completed successfully.
    pub success_rate: f64,
    /// Average task response time in seconds.
    pub avg_response_time: f64,
    /// Average agent load ratio across the fleet.
    pub agent_utilization: f64,
}

/// Selects the best agent for a task from a snapshot of agent descriptors.
///
/// Selection is deterministic: candidates are collected in sorted-name
/// order and ranked with a stable sort, so repeated calls over the same
/// snapshot return the same agent and exact score ties resolve
/// reproducibly.
#[derive(Debug, Default)]
pub struct TaskRouter {
    config: RouterConfig,
    capabilities: CapabilityMap,
    stats: RoutingStats,
}

impl TaskRouter {
    /// Creates a router with the given configuration and the default
    /// capability map.
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            capabilities: CapabilityMap::default(),
            stats: RoutingStats::default(),
        }
    }

    /// Replaces the task-type to capability mapping.
    #[must_use]
    pub fn with_capability_map(mut self, capabilities: CapabilityMap) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Accumulated routing statistics.
    #[must_use]
    pub fn stats(&self) -> &RoutingStats {
        &self.stats
    }

    /// Finds the best agent for a task, or `None` if no capable agent is
    /// available.
    ///
    /// A pinned `assigned_agent` that still qualifies always wins over
    /// scoring; otherwise every capable agent is scored on capability,
    /// workload, priority, and performance, and the top-ranked name is
    /// returned.
    pub fn find_best_agent(
        &mut self,
        task: &Task,
        available_agents: &HashMap<String, AgentInfo>,
    ) -> Option<String> {
        self.stats.total_routed += 1;

        if let Some(pinned) = &task.assigned_agent {
            if self.agent_qualifies(pinned, task, available_agents) {
                self.stats.successful_matches += 1;
                tracing::info!("task {} routed to pinned agent {pinned}", task.id);
                return Some(pinned.clone());
            }
            tracing::warn!("pinned agent {pinned} cannot handle task {}", task.id);
        }

        let ranked = self.rank_agents(task, available_agents);
        let Some(best) = ranked.first() else {
            self.stats.failed_matches += 1;
            tracing::warn!(
                "no capable agent for task {} (type: {})",
                task.id,
                task.task_type
            );
            return None;
        };

        self.stats.successful_matches += 1;
        if best.score.load_balanced {
            self.stats.load_balanced_routes += 1;
        }
        if best.score.priority_boosted {
            self.stats.priority_boosted_routes += 1;
        }

        tracing::info!(
            "task {} routed to {} (score: {:.3})",
            task.id,
            best.name,
            best.score.total
        );
        Some(best.name.clone())
    }

    /// Whether a specific agent currently qualifies for a task: healthy,
    /// supports the task type, has a free slot, and sits under the workload
    /// ceiling.
    #[must_use]
    pub fn agent_qualifies(
        &self,
        agent_name: &str,
        task: &Task,
        available_agents: &HashMap<String, AgentInfo>,
    ) -> bool {
        let Some(info) = available_agents.get(agent_name) else {
            return false;
        };

        info.status == AgentStatus::Healthy
            && info.registration.supports_task_type(&task.task_type)
            && info.has_capacity()
            && info.load_ratio() < self.config.max_agent_workload_ratio
    }

    /// Scores every capable agent for a task, highest first. Candidates are
    /// visited in sorted-name order and ranked with a stable sort, so the
    /// result is deterministic for a given snapshot.
    #[must_use]
    pub fn rank_agents(
        &self,
        task: &Task,
        available_agents: &HashMap<String, AgentInfo>,
    ) -> Vec<ScoredAgent> {
        let mut capable: Vec<&String> = available_agents
            .keys()
            .filter(|name| self.agent_qualifies(name, task, available_agents))
            .collect();
        capable.sort();

        let mut ranked: Vec<ScoredAgent> = capable
            .into_iter()
            .map(|name| {
                let score = self.score_agent(task, &available_agents[name]);
                tracing::debug!(
                    "agent {name} score for task {}: {:.3} (cap:{:.2}, load:{:.2}, pri:{:.2}, perf:{:.2})",
                    task.id,
                    score.total,
                    score.capability,
                    score.workload,
                    score.priority,
                    score.performance
                );
                ScoredAgent {
                    name: name.clone(),
                    score,
                }
            })
            .collect();

        ranked.sort_by(|left, right| {
            right
                .score
                .total
                .partial_cmp(&left.score.total)
                .unwrap_or(Ordering::Equal)
        });
        ranked
    }

    /// Computes the four-criterion score breakdown for one agent.
    #[must_use]
    pub fn score_agent(&self, task: &Task, info: &AgentInfo) -> AgentScore {
        let capability = self.capability_score(task, info);
        let (workload, load_balanced) = self.workload_score(info);
        let (priority, priority_boosted) = self.priority_score(task, info);
        let performance = Self::performance_score(info);

        let weighted = capability * self.config.capability_weight
            + workload * self.config.workload_weight
            + priority * self.config.priority_weight
            + performance * self.config.performance_weight;
        let divisor = self.config.total_weight();
        let total = if divisor > 0.0 { weighted / divisor } else { 0.0 };

        AgentScore {
            capability,
            workload,
            priority,
            performance,
            total,
            load_balanced,
            priority_boosted,
        }
    }

    /// Overlap between the task type's required capabilities and the agent's
    /// declared ones. Full overlap scores 1.0; types with no mapped
    /// requirements score a flat 0.8; partial overlap interpolates with a
    /// higher floor above 50%.
    fn capability_score(&self, task: &Task, info: &AgentInfo) -> f64 {
        if !info.registration.supports_task_type(&task.task_type) {
            return 0.0;
        }

        let required = self.capabilities.required_for(&task.task_type);
        if required.is_empty() {
            return 0.8;
        }

        let matched = required
            .iter()
            .filter(|capability| info.registration.capabilities.contains(capability))
            .count();
        if matched == required.len() {
            return 1.0;
        }

        let overlap = matched as f64 / required.len() as f64;
        if overlap >= 0.5 {
            0.6 + overlap * 0.4
        } else {
            overlap * 0.6
        }
    }

    /// Inverse load ratio, with a small bonus for agents under half load
    /// when load balancing is enabled. Returns the score and whether the
    /// bonus applied.
    fn workload_score(&self, info: &AgentInfo) -> (f64, bool) {
        if info.registration.max_concurrent_tasks == 0 {
            return (0.0, false);
        }

        let ratio = info.load_ratio();
        let mut score = 1.0 - ratio;
        let bonus = self.config.enable_load_balancing && ratio < 0.5;
        if bonus {
            score += 0.1;
        }
        (score.min(1.0), bonus)
    }

    /// Affinity between task and agent priority classes: both high (>= 7)
    /// scores 1.0, both low (<= 3) scores 0.8, otherwise the score decays
    /// with the normalized distance between the two priorities.
    fn priority_score(&self, task: &Task, info: &AgentInfo) -> (f64, bool) {
        let task_priority = task.priority;
        let agent_priority = info.registration.priority;

        if task_priority >= 7 && agent_priority >= 7 {
            return (1.0, self.config.enable_priority_boosting);
        }
        if task_priority <= 3 && agent_priority <= 3 {
            return (0.8, false);
        }

        let task_norm = Self::normalize_priority(task_priority);
        let agent_norm = Self::normalize_priority(agent_priority);
        ((1.0 - (task_norm - agent_norm).abs()).max(0.0), false)
    }

    fn normalize_priority(priority: u8) -> f64 {
        if priority >= 1 {
            f64::from(priority - 1) / 9.0
        } else {
            0.5
        }
    }

    /// Historical success rate weighted 80%, blended with an experience
    /// factor capped at 100 completed tasks weighted 20%. New agents score
    /// a neutral 0.5.
    fn performance_score(info: &AgentInfo) -> f64 {
        let completed = info.total_tasks_completed as f64;
        if info.total_tasks_completed == 0 {
            return 0.5;
        }

        let success_rate = ((completed - info.error_count as f64) / completed).max(0.0);
        let experience = (completed / 100.0).min(1.0);
        (success_rate * 0.8 + experience * 0.2).min(1.0)
    }

    /// Analyzes a batch of tasks to understand routing requirements.
    #[must_use]
    pub fn analyze_routing_requirements(&self, tasks: &[Task]) -> RoutingAnalysis {
        RoutingAnalysis::from_tasks(tasks, &self.capabilities)
    }

    /// Explains a routing decision: whether the selected agent still
    /// qualifies, its score, and the top alternatives.
    #[must_use]
    pub fn validate_routing_decision(
        &self,
        task: &Task,
        selected_agent: &str,
        available_agents: &HashMap<String, AgentInfo>,
    ) -> RoutingValidation {
        let mut validation = RoutingValidation {
            task_id: task.id.clone(),
            selected_agent: selected_agent.to_owned(),
            is_valid: false,
            reasons: Vec::new(),
            score: None,
            alternatives: Vec::new(),
        };

        let Some(info) = available_agents.get(selected_agent) else {
            validation
                .reasons
                .push(format!("agent '{selected_agent}' not found"));
            return validation;
        };

        if self.agent_qualifies(selected_agent, task, available_agents) {
            validation.is_valid = true;
            validation.score = Some(self.score_agent(task, info).total);
            validation.alternatives = self
                .rank_agents(task, available_agents)
                .into_iter()
                .filter(|scored| scored.name != selected_agent)
                .take(3)
                .collect();
            return validation;
        }

        if info.status != AgentStatus::Healthy {
            validation
                .reasons
                .push(format!("agent status: {}", info.status));
        }
        if !info.registration.supports_task_type(&task.task_type) {
            validation
                .reasons
                .push(format!("task type '{}' not supported", task.task_type));
        }
        if !info.has_capacity() {
            validation.reasons.push(format!(
                "agent at capacity: {}/{}",
                info.current_tasks.len(),
                info.registration.max_concurrent_tasks
            ));
        } else if info.load_ratio() >= self.config.max_agent_workload_ratio {
            validation.reasons.push(format!(
                "agent over workload ceiling: {:.2} >= {:.2}",
                info.load_ratio(),
                self.config.max_agent_workload_ratio
            ));
        }
        validation
    }

    /// Adapts the tunable weights and the workload ceiling to observed
    /// performance, then renormalizes the three tunable weights to sum
    /// to one.
    pub fn optimize_config(&mut self, performance: &RoutingPerformance) {
        if performance.success_rate < 0.8 {
            self.config.capability_weight = (self.config.capability_weight + 0.1).min(0.5);
            tracing::info!("increased capability weight due to low success rate");
        }

        if performance.avg_response_time > 10.0 {
            self.config.workload_weight = (self.config.workload_weight + 0.1).min(0.5);
            tracing::info!("increased workload weight due to high response time");
        }

        if performance.agent_utilization < 0.3 {
            self.config.max_agent_workload_ratio =
                (self.config.max_agent_workload_ratio - 0.1).max(0.5);
            tracing::info!("decreased workload ceiling due to low utilization");
        }

        let total = self.config.capability_weight
            + self.config.workload_weight
            + self.config.priority_weight;
        if total > 0.0 {
            self.config.capability_weight /= total;
            self.config.workload_weight /= total;
            self.config.priority_weight /= total;
        }
    }
}
