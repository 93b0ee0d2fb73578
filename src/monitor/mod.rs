//! The incremental monitoring core: window planning, footprint estimation,
//! shard partitioning and the per-run orchestration around them.

pub mod engine;
pub mod estimator;
pub mod orchestrator;
pub mod shard;
pub mod store;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{ConfigRunOutcome, EngineError, WindowEngine};
pub use estimator::{FootprintEstimate, FootprintEstimator};
pub use orchestrator::{MonitorOrchestrator, OrchestratorError, RunSummary};
pub use shard::ShardSpec;
