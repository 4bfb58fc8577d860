//! Task routing for the ensemble framework.
//!
//! The router is a pure selection component: given a task and a snapshot of
//! agent descriptors it picks the best agent or declares no match, using a
//! weighted multi-criteria score over capability overlap, current workload,
//! priority affinity, and historical performance. Aside from accumulated
//! statistics it holds no state, and repeated calls over the same snapshot
//! are deterministic.

pub mod analysis;
pub mod config;
pub mod router;
pub mod stats;

pub use analysis::{Bottleneck, RoutingAnalysis};
pub use config::{CapabilityMap, RouterConfig};
pub use router::{AgentScore, RoutingPerformance, RoutingValidation, ScoredAgent, TaskRouter};
pub use stats::RoutingStats;
