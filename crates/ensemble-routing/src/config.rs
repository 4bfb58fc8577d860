//! Router configuration and the task-type to capability mapping.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use ensemble_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Tunable routing configuration.
///
/// The three tunable weights (capability, workload, priority) are kept
/// normalized by [`crate::TaskRouter::optimize_config`] so that, together
/// with the fixed performance weight, the combined score stays in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Load ratio at or above which an otherwise-capable agent is excluded
    /// from new assignments, even if it has a nominal free slot.
    pub max_agent_workload_ratio: f64,
    /// Weight of the capability-overlap criterion.
    pub capability_weight: f64,
    /// Weight of the current-workload criterion.
    pub workload_weight: f64,
    /// Weight of the priority-affinity criterion.
    pub priority_weight: f64,
    /// Weight of the historical-performance criterion; held fixed outside
    /// optimization.
    pub performance_weight: f64,
    /// Grants a small bonus to agents under 50% load.
    pub enable_load_balancing: bool,
    /// Counts high-priority matches in the routing statistics.
    pub enable_priority_boosting: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_agent_workload_ratio: 0.8,
            capability_weight: 0.3,
            workload_weight: 0.3,
            priority_weight: 0.4,
            performance_weight: 0.1,
            enable_load_balancing: true,
            enable_priority_boosting: true,
        }
    }
}

impl RouterConfig {
    /// Sum of all four criterion weights; the normalization divisor.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.capability_weight + self.workload_weight + self.priority_weight
            + self.performance_weight
    }
}

/// Task-type to required-capability mapping.
///
/// Kept as an explicit, externally-configurable value so new task types can
/// be added without touching the router. The default table covers the
/// built-in file, task-management, and coordination task types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityMap {
    map: HashMap<String, Vec<String>>,
}

impl CapabilityMap {
    /// Creates an empty mapping; every task type then scores the flat
    /// no-requirements default.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Loads a mapping from a TOML table of `task_type = ["capability", ..]`
    /// entries.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|error| Error::Config(format!("failed to read capability map: {error}")))?;
        let map = toml::from_str(&contents)
            .map_err(|error| Error::Config(format!("failed to parse capability map: {error}")))?;
        Ok(map)
    }

    /// Adds or replaces the required capabilities for a task type.
    pub fn insert(&mut self, task_type: impl Into<String>, capabilities: Vec<String>) {
        self.map.insert(task_type.into(), capabilities);
    }

    /// Capabilities required for a task type; empty if the type is unmapped.
    #[must_use]
    pub fn required_for(&self, task_type: &str) -> &[String] {
        self.map.get(task_type).map_or(&[], Vec::as_slice)
    }
}

impl Default for CapabilityMap {
    fn default() -> Self {
        let entries: [(&str, &[&str]); 15] = [
            ("read_file", &["file_operations"]),
            ("write_file", &["file_operations"]),
            ("list_directory", &["file_operations", "directory_operations"]),
            ("analyze_directory", &["file_operations", "file_analysis"]),
            ("search_files", &["file_operations", "file_search"]),
            ("backup_files", &["file_operations", "batch_operations"]),
            ("create_task", &["task_management"]),
            ("manage_workflow", &["workflow_coordination", "task_management"]),
            ("schedule_tasks", &["task_scheduling"]),
            ("monitor_progress", &["task_monitoring"]),
            ("orchestrate_workflow", &["workflow_orchestration", "agent_coordination"]),
            ("coordinate_agents", &["agent_coordination", "multi_agent_communication"]),
            ("allocate_resources", &["resource_allocation"]),
            ("resolve_conflicts", &["conflict_resolution"]),
            ("handle_emergencies", &["error_recovery", "system_monitoring"]),
        ];

        let map = entries
            .into_iter()
            .map(|(task_type, capabilities)| {
                (
                    task_type.to_owned(),
                    capabilities.iter().map(|&cap| cap.to_owned()).collect(),
                )
            })
            .collect();

        Self { map }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_default_weights_sum_to_one_point_one() {
        let config = RouterConfig::default();
        assert!((config.total_weight() - 1.1).abs() < 1e-9);
        assert!((config.max_agent_workload_ratio - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_default_capability_map_entries() {
        let map = CapabilityMap::default();
        assert_eq!(map.required_for("read_file"), ["file_operations"]);
        assert_eq!(
            map.required_for("coordinate_agents"),
            ["agent_coordination", "multi_agent_communication"]
        );
        assert!(map.required_for("unknown_type").is_empty());
    }

    #[test]
    fn test_capability_map_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "transcode_video = [\"media_processing\", \"gpu\"]").unwrap();

        let map = CapabilityMap::load_from_file(file.path()).unwrap();
        assert_eq!(map.required_for("transcode_video"), ["media_processing", "gpu"]);
        assert!(map.required_for("read_file").is_empty());
    }

    #[test]
    fn test_capability_map_insert_overrides() {
        let mut map = CapabilityMap::default();
        map.insert("read_file", vec!["remote_storage".to_owned()]);
        assert_eq!(map.required_for("read_file"), ["remote_storage"]);
    }
}
