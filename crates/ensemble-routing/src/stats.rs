//! Accumulated routing statistics.

use serde::Serialize;

/// Counters accumulated across routing decisions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoutingStats {
    /// Total routing requests handled.
    pub total_routed: u64,
    /// Requests that produced an agent selection.
    pub successful_matches: u64,
    /// Requests for which no capable agent existed.
    pub failed_matches: u64,
    /// Selections where the winner held an under-utilization bonus.
    pub load_balanced_routes: u64,
    /// Selections where both task and agent were in the high-priority class.
    pub priority_boosted_routes: u64,
}

impl RoutingStats {
    /// Fraction of routing requests that found an agent; zero before any
    /// request was handled.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_routed == 0 {
            return 0.0;
        }
        self.successful_matches as f64 / self.total_routed as f64
    }
}
