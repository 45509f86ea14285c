//! Environment Orchestrator (spec §4.1/§4.8): the top-level object a test
//! suite starts once. Wraps a [`ServiceManager`] with shared-environment
//! detection and a synchronous `setup`/`teardown` entry point for harnesses
//! that can't `.await` at their bootstrap site (e.g. a `#[ctor]`-style
//! one-time init run before `main`), ported from the teacher's
//! `test.rs::setup`/`teardown` channel-and-background-runtime pattern and
//! generalized from "boot one actix-web server" to "start every configured
//! service".
use std::collections::HashMap;
use std::future::Future;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, OnceLock};
use std::thread;

use tracing::info;

use crate::config::{EnvironmentConfig, TestModeConfig};
use crate::context::TestContext;
use crate::error::IntegrError;
use crate::events::EventBus;
use crate::service_manager::ServiceManager;

/// Env var a shared CI environment sets so individual test processes attach
/// to an already-running environment instead of starting their own (spec
/// §4.8: "when the environment is already running... attach instead of
/// spawning a second copy").
const SHARED_ENVIRONMENT_VAR: &str = "ENVIRONMENT_RUNNING";

/// Env var overriding the HTTP port a detached, shared-environment context
/// targets (spec §8 scenario 6 uses `http://localhost:3000` as its literal
/// example; this crate treats `3000` as the convention's default rather
/// than a hard-coded value, since the spec leaves the discovery mechanism
/// unspecified for the shared case).
const SHARED_HTTP_PORT_VAR: &str = "INTEGR8_SHARED_HTTP_PORT";
const DEFAULT_SHARED_HTTP_PORT: u16 = 3000;

pub fn is_shared_environment() -> bool {
    std::env::var(SHARED_ENVIRONMENT_VAR).is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn shared_http_base_url() -> String {
    let port = std::env::var(SHARED_HTTP_PORT_VAR)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_SHARED_HTTP_PORT);
    format!("http://localhost:{port}")
}

pub struct EnvironmentOrchestrator {
    manager: Option<ServiceManager>,
    events: EventBus,
    test_mode: Option<TestModeConfig>,
}

impl EnvironmentOrchestrator {
    pub fn new(config: &EnvironmentConfig) -> Result<Self, IntegrError> {
        let events = EventBus::new();
        let test_mode = config.test_mode.clone();
        if is_shared_environment() {
            return Ok(Self { manager: None, events, test_mode });
        }
        let manager = ServiceManager::new(config, events.clone())?;
        Ok(Self {
            manager: Some(manager),
            events,
            test_mode,
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub async fn start(&mut self, fast: bool) -> Result<(), IntegrError> {
        let Some(manager) = self.manager.as_mut() else {
            info!("shared environment detected ({SHARED_ENVIRONMENT_VAR}); skipping local startup");
            return Ok(());
        };
        manager.start_all(fast).await?;
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), IntegrError> {
        let Some(manager) = self.manager.as_mut() else {
            return Ok(());
        };
        manager.stop_all().await?;
        Ok(())
    }

    pub async fn is_ready(&mut self, name: &str) -> bool {
        match self.manager.as_mut() {
            Some(manager) => manager.is_ready(name).await,
            None => true,
        }
    }

    pub fn connection_strings(&self) -> HashMap<String, String> {
        self.manager
            .as_ref()
            .map(|m| m.aggregated_connection_strings())
            .unwrap_or_default()
    }

    /// The base URL a test's HTTP client should target: the resolved
    /// address of the first `service`-category unit in a locally-started
    /// environment, or the shared-environment fallback address when
    /// attached to an environment someone else started (spec §4.8/§6,
    /// scenario 6).
    pub fn http_base_url(&self) -> Option<String> {
        match &self.manager {
            Some(manager) => manager
                .first_service_name()
                .and_then(|name| manager.http_base_url(&name)),
            None => Some(shared_http_base_url()),
        }
    }

    pub fn context(&self) -> TestContext {
        let mut context = TestContext::attached(self.events.clone(), self.connection_strings());
        if let Some(url) = self.http_base_url() {
            context = context.with_http_base_url(url);
        }
        if let Some(test_mode) = &self.test_mode {
            if let (Some(port), Some(endpoint)) = (test_mode.control_port, &test_mode.override_endpoint) {
                context = context.with_control_port(port, endpoint);
            }
            if test_mode.enable_fake_timers {
                context.clock().pause();
            }
        }
        context
    }
}

struct Channel<T> {
    tx: Sender<T>,
    rx: Mutex<Receiver<T>>,
}

fn channel<T>() -> Channel<T> {
    let (tx, rx) = mpsc::channel();
    Channel { tx, rx: Mutex::new(rx) }
}

enum Command {
    Stop,
}

static READY_CHANNEL: OnceLock<Channel<()>> = OnceLock::new();
fn ready_channel() -> &'static Channel<()> {
    READY_CHANNEL.get_or_init(channel)
}

static STOP_COMMAND_CHANNEL: OnceLock<Channel<Command>> = OnceLock::new();
fn stop_command_channel() -> &'static Channel<Command> {
    STOP_COMMAND_CHANNEL.get_or_init(channel)
}

static SHUTDOWN_CHANNEL: OnceLock<Channel<()>> = OnceLock::new();
fn shutdown_channel() -> &'static Channel<()> {
    SHUTDOWN_CHANNEL.get_or_init(channel)
}

/// Runs a closure to completion on a throwaway single-use Tokio runtime.
/// Used by synchronous code paths (the blocking teardown signal wait) that
/// need to drive a small amount of async work without access to the
/// background runtime spawned by [`setup_blocking`].
pub(crate) fn execute_blocking<F, Fut>(future: F)
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    let rt = tokio::runtime::Runtime::new().expect("cannot create a Tokio runtime for blocking execution");
    rt.block_on(future());
}

/// Synchronous setup entry point for harnesses that run before any async
/// runtime exists (e.g. a `#[ctor]`-style global test fixture). Spawns a
/// dedicated background thread with its own multi-thread Tokio runtime,
/// starts the environment on it, and blocks the calling thread until
/// startup completes or panics.
///
/// `env` carries ownership of whatever keeps the containers alive
/// (testcontainers' `ContainerAsync` handles are dropped — and their
/// containers removed — as soon as nothing holds them, so the background
/// thread must hold `environment` for the whole process lifetime).
pub fn setup_blocking(config: EnvironmentConfig, fast: bool) {
    crate::logging::configure();

    thread::spawn(move || {
        let body = async move {
            let mut environment = EnvironmentOrchestrator::new(&config).expect("invalid environment config");

            info!("starting integration test environment...");
            if let Err(e) = environment.start(fast).await {
                panic!("failed to start test environment: {e}");
            }
            info!("test environment started successfully");

            ready_channel().tx.send(()).expect("failed to send ready signal");

            let _ = tokio::task::spawn_blocking(move || {
                let command = stop_command_channel()
                    .rx
                    .lock()
                    .expect("stop command channel lock poisoned")
                    .recv()
                    .expect("failed to receive stop command");

                match command {
                    Command::Stop => {
                        info!("shutting down test environment...");
                        execute_blocking(|| async {
                            if let Err(e) = environment.stop().await {
                                info!("error while stopping test environment (ignored): {e}");
                            }
                        });
                        info!("test environment shut down successfully");
                    }
                }
            })
            .await;

            shutdown_channel().tx.send(()).expect("failed to send shutdown signal");
        };

        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("cannot create background Tokio runtime")
            .block_on(body);
    });

    ready_channel()
        .rx
        .lock()
        .expect("ready channel lock poisoned")
        .recv()
        .expect("failed to receive ready signal");
}

/// Signals the background environment thread to stop and blocks until it
/// confirms shutdown is complete.
pub fn teardown_blocking() {
    let _ = stop_command_channel().tx.send(Command::Stop);
    let rx = shutdown_channel()
        .rx
        .try_lock()
        .expect("teardown_blocking called more than once concurrently");
    let _ = rx.recv();
}
