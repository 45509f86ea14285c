//! # integr8
//!
//! **integr8** brings up a reproducible, ephemeral environment of
//! interdependent services — application processes, databases, message
//! brokers, object storage — for black-box testing of HTTP/WS APIs, then
//! tears it down deterministically.
//!
//! It is designed to:
//!
//! - Start native subprocesses and containers behind one polymorphic
//!   [`runner::Runner`], in dependency order, with readiness gating
//! - Propagate a container-backed database's live host/port/credentials
//!   into the environment of the services that depend on it
//! - Isolate database state per test, per file, or per run via savepoints,
//!   schemas, fresh databases, or snapshots
//! - Let a running test swap an application-internal collaborator (a
//!   service, a middleware, an auth identity) through an in-process adapter
//!   or an HTTP side channel
//!
//! ---
//!
//! ## Architecture overview
//!
//! Bringing an environment up follows a fixed pipeline:
//!
//! 1. **Configuration** — an [`EnvironmentConfig`] declares every service,
//!    database, messaging broker and storage unit, plus their dependency
//!    edges.
//! 2. **Scheduling** — [`ServiceManager`] topologically sorts the
//!    dependency graph and drives one [`orchestrator::CategoryOrchestrator`]
//!    per category.
//! 3. **Execution** — each orchestrator starts its [`runner::Runner`]s
//!    (native process or container) and polls them through the
//!    [`readiness`] prober until ready.
//! 4. **Context** — [`EnvironmentOrchestrator::context`] hands the test
//!    framework a [`TestContext`]: the per-worker façade onto connection
//!    strings, database managers, overrides, the clock and lifecycle
//!    events.
//!
//! Tearing an environment down reverses step 2/3 in strict reverse
//! dependency order, regardless of individual failures.
//!
//! ---
//!
//! ## Logging
//!
//! Logging is configured once, lazily, via [`logging::configure`].
//!
//! Features:
//!
//! - Colored log levels
//! - Timestamped, module-aware formatting
//! - Environment-driven filtering (`RUST_LOG`)
//! - Suppression of noisy dependency logs (`sea_orm`, `sqlx`,
//!   `testcontainers`, `reqwest`) by default
//!
//! ---
//!
//! ## Scope
//!
//! CLI parsing, configuration-file loading, project scaffolding, test
//! template generation and framework (Jest/Vitest-style) binding glue are
//! explicitly out of scope — they are thin drivers a downstream crate
//! builds on top of this one.
#![deny(clippy::unwrap_used)]
#![deny(clippy::redundant_clone)]

pub mod adapter;
pub mod clock;
pub mod config;
pub mod connection_strings;
pub mod context;
pub mod db;
pub(crate) mod docker;
pub mod environment;
pub mod error;
pub mod events;
pub mod logging;
pub mod orchestrator;
pub mod overrides;
pub mod readiness;
pub mod runner;
pub mod service_manager;
pub(crate) mod util;

pub use adapter::Adapter;
pub use config::{
    Category, ContainerSpec, EndpointDiscoveryConfig, EnvMapping, EnvironmentConfig,
    EnvironmentConfigBuilder, LocalSpec, LogLevel, LoggingSpec, MountMode, PortBinding,
    ReadinessSpec, ServiceSpec, TestModeConfig, VolumeBinding,
};
pub use context::{HttpClient, TestContext};
pub use db::{
    DatabaseManager, IsolationStrategy, RestoreStrategy, SeedAction, SeedContext, SeedDataSink,
    SeedManager, SeedScenario, SeedStrategy, Transaction,
};
pub use environment::{
    is_shared_environment, setup_blocking, teardown_blocking, EnvironmentOrchestrator,
};
pub use error::{HttpError, IntegrError};
pub use events::{EventBus, LifecycleEvent};
pub use overrides::{AuthOverrideBuilder, OverrideBuilder, OverrideManager, OverrideType};
pub use service_manager::ServiceManager;
