//! Pipeline coordinator: the consume -> normalize -> embed -> persist
//! lifecycle.
//!
//! [`coordinator::Coordinator`] owns batching, bounded concurrency,
//! per-item failure isolation, and graceful drain. [`stats`] holds the
//! process-wide advisory counters and the periodic reporter task.

pub mod coordinator;
pub mod stats;

pub use coordinator::{Coordinator, CoordinatorConfig, CoordinatorError, ItemOutcome, WorkerMode};
pub use stats::{run_stats_reporter, PipelineStats, StatsSnapshot};
