//! The `Runner` trait (spec §4.1) and its two implementations.
pub mod container;
pub mod local;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::RunnerError;

/// Starts, probes and stops a single service, local process or container
/// alike. `async-trait` is used here (rather than native async-fn-in-trait)
/// because the `Runner` trait needs `dyn` dispatch — the service manager
/// holds a heterogeneous `HashMap<String, Box<dyn Runner>>` across local and
/// container-backed services.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Starts the underlying process or container. `fast` skips the startup
    /// grace window and any baked-in wait strategy, trading startup safety
    /// for speed (used when the caller already knows the environment is warm,
    /// e.g. repeated runs against a shared environment).
    async fn start(&mut self, fast: bool) -> Result<(), RunnerError>;

    /// Stops the runner. Idempotent: stopping something that never started,
    /// or stopping twice, is a no-op rather than an error.
    async fn stop(&mut self) -> Result<(), RunnerError>;

    /// Runs this runner's readiness check, if any was configured. `false`
    /// both while still starting and after the process/container has died.
    async fn is_ready(&mut self) -> bool;

    /// Env-var map computed from a container-backed database's resolved
    /// host/port (spec §4.3). Empty for anything that isn't a
    /// container-backed database with an `env_mapping`.
    fn connection_strings(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// The base URL a test's HTTP client should target to reach this runner,
    /// once started. `None` if the runner exposes no HTTP port at all (a
    /// worker database, a message broker with no readiness endpoint, ...).
    fn http_base_url(&self) -> Option<String> {
        None
    }
}
