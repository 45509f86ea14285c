//! Crate-wide error types.
//!
//! Every component gets its own `thiserror` enum with a matching `Result`
//! alias, mirroring the teacher's `settings.rs`/`test.rs`/`http/web.rs`
//! convention of a per-module error type rather than one crate-wide error.
//! [`IntegrError`] aggregates all of them for the handful of call sites
//! (`Environment::start`, `ServiceManager::start_all`) that must propagate
//! across component boundaries.
use thiserror::Error;

/// Errors raised while building or validating an [`crate::config::EnvironmentConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("duplicate service name: '{0}'")]
    DuplicateName(String),

    #[error("service '{0}' must configure exactly one of `local` or `container`")]
    AmbiguousMode(String),

    #[error("dependency cycle detected: {0}")]
    Cycle(String),

    #[error("service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency { service: String, dependency: String },
}

/// Errors raised by a [`crate::runner::Runner`] implementation.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn process for '{service}': {reason}")]
    Spawn { service: String, reason: String },

    #[error("failed to start container for '{service}': {reason}")]
    ContainerStart { service: String, reason: String },

    #[error("failed to stop '{service}': {reason}")]
    Stop { service: String, reason: String },

    #[error("container engine error for '{service}': {reason}")]
    Engine { service: String, reason: String },
}

/// Errors raised by the readiness prober.
#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("readiness probe for '{service}' exhausted its retries")]
    Exhausted { service: String },
}

/// Errors raised while computing the connection-string propagation table.
#[derive(Debug, Error)]
pub enum ConnectionStringError {
    #[error(
        "connection-string conflict: env var '{key}' is produced by both '{first}' and '{second}'"
    )]
    Conflict {
        key: String,
        first: String,
        second: String,
    },

    #[error("database '{0}' has no `env_mapping` configured")]
    MissingMapping(String),

    #[error("database '{0}' is not container-backed; connection strings require a container")]
    NotContainerBacked(String),
}

/// Errors raised by the [`crate::service_manager::ServiceManager`] scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("dependency '{dependency}' of '{service}' is not running")]
    DependencyNotReady { service: String, dependency: String },
}

/// Errors raised by the database isolation engine.
#[derive(Debug, Error)]
pub enum DbStateError {
    #[error("savepoint '{0}' does not exist")]
    UnknownSavepoint(String),

    #[error("snapshot '{0}' does not exist")]
    UnknownSnapshot(String),

    #[error("a transaction is already in progress for this connection")]
    TransactionInProgress,

    #[error("no transaction is in progress")]
    NoTransaction,

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// Errors raised by the seed manager.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("seed command failed: {reason}")]
    CommandFailed { reason: String },

    #[error("seed command timed out after {0}ms")]
    Timeout(u64),

    #[error(transparent)]
    DbState(#[from] DbStateError),
}

/// Errors raised by the test context's HTTP client façade.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("no base URL is known for service '{0}'; it may not be started, or exposes no HTTP port")]
    NoBaseUrl(String),

    #[error(transparent)]
    Request(#[from] reqwest_middleware::Error),
}

/// Errors raised by the override manager. Delivery failures are logged, not
/// propagated (spec: "the test continues, because the override store is
/// still consistent with what the test requested") — this type mostly exists
/// so `Adapter` implementations have something concrete to return.
#[derive(Debug, Error)]
pub enum OverrideError {
    #[error("adapter rejected override '{0}'")]
    Rejected(String),
}

/// Top-level aggregate error returned by the Environment Orchestrator and
/// anything that composes across components.
#[derive(Debug, Error)]
pub enum IntegrError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    #[error(transparent)]
    ConnectionString(#[from] ConnectionStringError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    DbState(#[from] DbStateError),

    #[error(transparent)]
    Seed(#[from] SeedError),

    #[error(transparent)]
    Override(#[from] OverrideError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("shared-environment mode has no local orchestrator to operate on")]
    SharedEnvironment,
}
