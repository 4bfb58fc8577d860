//! Context manager configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the context manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Soft cap on active contexts; exceeding it only logs a warning.
    pub max_contexts: usize,
    /// Hours without mutation after which a context expires.
    pub context_ttl_hours: u64,
    /// Minimum seconds between cleanup sweeps.
    pub cleanup_interval_secs: u64,
    /// Whether contexts are persisted to disk.
    pub enable_persistence: bool,
    /// Whether `merge_contexts` is allowed.
    pub enable_context_sharing: bool,
    /// Directory holding one JSON record per conversation.
    pub storage_path: PathBuf,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_contexts: 1000,
            context_ttl_hours: 24,
            cleanup_interval_secs: 3600,
            enable_persistence: true,
            enable_context_sharing: true,
            storage_path: PathBuf::from("data/contexts"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ContextConfig::default();
        assert_eq!(config.context_ttl_hours, 24);
        assert_eq!(config.cleanup_interval_secs, 3600);
        assert!(config.enable_persistence);
        assert!(config.enable_context_sharing);
    }
}
