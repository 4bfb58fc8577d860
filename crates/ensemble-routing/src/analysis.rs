//! Batch routing-requirements analysis.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use ensemble_core::Task;
use serde::Serialize;

use crate::config::CapabilityMap;

/// Share of a batch above which a single task type is flagged as a
/// potential bottleneck.
const BOTTLENECK_SHARE: f64 = 0.3;

/// A task type concentrated enough to exhaust same-type agent capacity.
#[derive(Debug, Clone, Serialize)]
pub struct Bottleneck {
    /// The concentrated task type.
    pub task_type: String,
    /// Share of the batch this type represents, in percent.
    pub percentage: f64,
}

/// Diagnostic report over a batch of tasks: what agent capacity and
/// capabilities the batch demands.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingAnalysis {
    /// Number of tasks analyzed.
    pub total_tasks: usize,
    /// Task count per type.
    pub task_types: HashMap<String, usize>,
    /// Task count per priority value.
    pub priority_distribution: BTreeMap<u8, usize>,
    /// Union of capabilities the batch requires.
    pub capability_requirements: BTreeSet<String>,
    /// Rough agent-demand estimate, assuming an agent handles about two
    /// concurrent same-type tasks.
    pub estimated_agents_needed: usize,
    /// Task types exceeding the concentration threshold.
    pub potential_bottlenecks: Vec<Bottleneck>,
}

impl RoutingAnalysis {
    /// Builds the report for a batch of tasks against a capability map.
    #[must_use]
    pub fn from_tasks(tasks: &[Task], capabilities: &CapabilityMap) -> Self {
        let mut task_types: HashMap<String, usize> = HashMap::new();
        let mut priority_distribution: BTreeMap<u8, usize> = BTreeMap::new();
        let mut capability_requirements: BTreeSet<String> = BTreeSet::new();

        for task in tasks {
            *task_types.entry(task.task_type.clone()).or_default() += 1;
            *priority_distribution.entry(task.priority).or_default() += 1;
            capability_requirements.extend(
                capabilities
                    .required_for(&task.task_type)
                    .iter()
                    .cloned(),
            );
        }

        let estimated_agents_needed = task_types
            .values()
            .map(|&count| (count / 2).max(1))
            .sum();

        let total = tasks.len();
        let mut potential_bottlenecks: Vec<Bottleneck> = task_types
            .iter()
            .filter(|&(_, &count)| total > 0 && count as f64 / total as f64 > BOTTLENECK_SHARE)
            .map(|(task_type, &count)| Bottleneck {
                task_type: task_type.clone(),
                percentage: count as f64 / total as f64 * 100.0,
            })
            .collect();
        potential_bottlenecks.sort_by(|left, right| left.task_type.cmp(&right.task_type));

        Self {
            total_tasks: total,
            task_types,
            priority_distribution,
            capability_requirements,
            estimated_agents_needed,
            potential_bottlenecks,
        }
    }
}
