//! Local-process runner: spawns `local.command` as a plain host subprocess.
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use crate::config::{LocalSpec, LogLevel, ReadinessSpec, ServiceSpec};
use crate::error::RunnerError;
use crate::readiness;
use crate::util::split_command;

use super::Runner;

/// Forwards a child's piped stream to the service logger at `level`, one
/// line at a time, until the stream closes (the child exits or closes its
/// own end). Spawned as a detached task so it runs for the whole lifetime of
/// the child without the runner holding the stream handle.
fn forward_stream(stream: impl tokio::io::AsyncRead + Unpin + Send + 'static, service: String, level: LogLevel) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match level {
                    LogLevel::Debug => debug!(service = %service, "{line}"),
                    LogLevel::Info | LogLevel::Log => info!(service = %service, "{line}"),
                    LogLevel::Warn => warn!(service = %service, "{line}"),
                    LogLevel::Error => error!(service = %service, "{line}"),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(service = %service, "error reading child output: {e}");
                    break;
                }
            }
        }
    });
}

/// Startup grace window: after spawning, wait this long and make sure the
/// process hasn't already exited before declaring it started.
const STARTUP_GRACE: Duration = Duration::from_secs(1);
/// Graceful-stop polling: after SIGTERM, check this many times...
const STOP_POLL_ATTEMPTS: u32 = 10;
/// ...this often, before escalating to SIGKILL.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct LocalRunner {
    spec: ServiceSpec,
    local: LocalSpec,
    injected_env: HashMap<String, String>,
    child: Option<Child>,
}

impl LocalRunner {
    pub fn new(spec: ServiceSpec, local: LocalSpec, injected_env: HashMap<String, String>) -> Self {
        Self {
            spec,
            local,
            injected_env,
            child: None,
        }
    }

    /// Base env (current process) overlaid with the service's own `env`,
    /// overlaid with whatever connection strings the scheduler injected.
    /// Recomputed fresh on every `start`, so unlike mutating a process-global
    /// environment there is nothing to restore afterwards.
    fn build_env(&self) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = std::env::vars().collect();
        env.extend(self.local.env.clone());
        env.extend(self.injected_env.clone());
        env
    }
}

async fn run_host_command(command: &str) -> bool {
    let tokens = split_command(command);
    let Some((program, args)) = tokens.split_first() else {
        return false;
    };
    Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

async fn probe_readiness(readiness: &ReadinessSpec, service: &str) -> bool {
    if let Some(command) = readiness.command.clone() {
        readiness::probe(
            move || {
                let command = command.clone();
                async move { run_host_command(&command).await }
            },
            readiness,
            service,
        )
        .await
    } else if let Some(endpoint) = readiness.endpoint.clone() {
        readiness::probe(
            move || {
                let endpoint = endpoint.clone();
                async move { readiness::http_check(&endpoint).await }
            },
            readiness,
            service,
        )
        .await
    } else {
        true
    }
}

#[async_trait]
impl Runner for LocalRunner {
    async fn start(&mut self, fast: bool) -> Result<(), RunnerError> {
        let tokens = split_command(&self.local.command);
        let Some((program, command_args)) = tokens.split_first() else {
            return Err(RunnerError::Spawn {
                service: self.spec.name.clone(),
                reason: "empty `local.command`".to_string(),
            });
        };

        let stdout_level = self.spec.log_level();

        let mut command = Command::new(program);
        command
            .args(command_args)
            .args(&self.local.args)
            .envs(self.build_env())
            .stdout(if stdout_level.is_some() { Stdio::piped() } else { Stdio::null() })
            .stderr(if stdout_level.is_some() { Stdio::piped() } else { Stdio::null() });
        if let Some(dir) = &self.local.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| RunnerError::Spawn {
            service: self.spec.name.clone(),
            reason: e.to_string(),
        })?;

        // Logging stream is routed to the service logger at the configured
        // level; stderr is always routed at `error` regardless of that
        // level (spec §4.1). An un-drained pipe would otherwise block the
        // child once the OS buffer fills, so both streams are always
        // forwarded whenever piped at all.
        if let Some(level) = stdout_level {
            if let Some(stdout) = child.stdout.take() {
                forward_stream(stdout, self.spec.name.clone(), level);
            }
            if let Some(stderr) = child.stderr.take() {
                forward_stream(stderr, self.spec.name.clone(), LogLevel::Error);
            }
        }

        if !fast {
            tokio::time::sleep(STARTUP_GRACE).await;
            match child.try_wait() {
                Ok(Some(status)) => {
                    return Err(RunnerError::Spawn {
                        service: self.spec.name.clone(),
                        reason: format!("process exited during startup with {status}"),
                    });
                }
                Ok(None) => info!(service = %self.spec.name, "process alive after startup grace window"),
                Err(e) => warn!(service = %self.spec.name, "could not poll child status: {e}"),
            }
        }

        self.child = Some(child);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RunnerError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if matches!(child.try_wait(), Ok(Some(_))) {
            return Ok(());
        }

        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                // SAFETY: `pid` comes from a `Child` we still hold; sending
                // SIGTERM to it cannot affect unrelated processes.
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
            }
            for _ in 0..STOP_POLL_ATTEMPTS {
                if matches!(child.try_wait(), Ok(Some(_))) {
                    return Ok(());
                }
                tokio::time::sleep(STOP_POLL_INTERVAL).await;
            }
        }

        if let Err(e) = child.start_kill() {
            warn!(service = %self.spec.name, "SIGKILL failed (process may already be gone): {e}");
        }
        let _ = tokio::time::timeout(Duration::from_secs(1), child.wait()).await;
        Ok(())
    }

    async fn is_ready(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        if matches!(child.try_wait(), Ok(Some(_)) | Err(_)) {
            return false;
        }
        match self.spec.readiness.clone() {
            Some(readiness) => probe_readiness(&readiness, &self.spec.name).await,
            None => true,
        }
    }

    /// Local processes aren't port-mapped by anything, so the only way to
    /// know where one is listening is the `PORT` it was told to bind to in
    /// its own declared `env` block.
    fn http_base_url(&self) -> Option<String> {
        self.local.env.get("PORT").map(|port| format!("http://localhost:{port}"))
    }
}
