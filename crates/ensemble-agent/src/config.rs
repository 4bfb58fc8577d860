//! Orchestrator and framework-level configuration.

use std::fs;
use std::path::Path;

use ensemble_context::ContextConfig;
use ensemble_core::{Error, Result};
use ensemble_routing::RouterConfig;
use serde::{Deserialize, Serialize};

/// Tunables for the orchestrator's scheduling and maintenance loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Global ceiling on concurrently running tasks across all agents.
    pub max_concurrent_tasks: usize,
    /// Expected heartbeat cadence; agents unseen for twice this long are
    /// flipped to unhealthy.
    pub heartbeat_interval_secs: u64,
    /// Sleep between health-check sweeps.
    pub health_check_interval_secs: u64,
    /// Age past which terminal tasks and their results are garbage
    /// collected.
    pub task_retention_secs: u64,
    /// Sleep between scheduling ticks.
    pub tick_interval_secs: u64,
    /// When enabled, a task whose dependency reached FAILED or CANCELLED
    /// is failed immediately instead of staying pending forever.
    pub fail_fast_on_failed_dependency: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 50,
            heartbeat_interval_secs: 30,
            health_check_interval_secs: 60,
            task_retention_secs: 3600,
            tick_interval_secs: 1,
            fail_fast_on_failed_dependency: false,
        }
    }
}

/// Top-level configuration aggregating every subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameworkConfig {
    /// Orchestrator loop tunables.
    pub orchestrator: OrchestratorConfig,
    /// Router weights and ceilings.
    pub router: RouterConfig,
    /// Context TTL and persistence settings.
    pub context: ContextConfig,
}

impl FrameworkConfig {
    /// Loads the config at `path`, writing the defaults there first if no
    /// file exists yet.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or created.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            let config = Self::default();
            config.save_to_file(path)?;
            Ok(config)
        }
    }

    /// Loads a TOML config file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        tracing::debug!("loaded framework config from {}", path.display());
        Ok(config)
    }

    /// Writes the config as TOML, creating parent directories as needed.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|error| Error::Config(format!("failed to serialize config: {error}")))?;
        fs::write(path, contents)?;
        Ok(())
    }
}
