//! Database isolation engine (spec §4.6/§4.7): strategy selection, the raw-SQL
//! state manager, per-operation metrics, the worker-facing `DatabaseManager`
//! façade, and the seed manager that populates data before tests run.
pub mod manager;
pub mod metrics;
pub mod seed;
pub mod state;
pub mod strategy;

pub use manager::{DatabaseManager, Transaction};
pub use metrics::{MetricsRecorder, OperationMetric};
pub use seed::{RestoreStrategy, SeedAction, SeedContext, SeedDataSink, SeedManager, SeedScenario, SeedStrategy};
pub use state::DbStateManager;
pub use strategy::IsolationStrategy;
