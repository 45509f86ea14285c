//! Seed Manager (spec §4.7): populates a database before tests run, once,
//! per file, per test, or under caller-supplied predicates, then restores
//! state afterward according to a separate restore strategy.
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{DbStateError, SeedError};
use crate::util::split_command;

use super::manager::DatabaseManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedStrategy {
    Once,
    PerFile,
    PerTest,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStrategy {
    None,
    Rollback,
    Reset,
    Snapshot,
}

#[derive(Debug, Clone, Default)]
pub struct SeedContext {
    pub file: Option<String>,
    pub test: Option<String>,
    pub worker_id: String,
}

impl SeedContext {
    fn key(&self) -> String {
        match (&self.file, &self.test) {
            (Some(file), Some(test)) => format!("{file}::{test}"),
            (Some(file), None) => file.clone(),
            (None, Some(test)) => test.clone(),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SeedAction {
    Command { command: String, timeout_ms: u64 },
    Data(Vec<serde_json::Value>),
}

/// Destination for `SeedAction::Data` rows. The seed manager only knows how
/// to run a shell command itself; inserting structured rows requires
/// schema knowledge it deliberately doesn't have, so that's delegated here.
#[async_trait]
pub trait SeedDataSink: Send + Sync {
    async fn insert(&self, rows: &[serde_json::Value]) -> Result<(), SeedError>;
}

pub struct SeedScenario {
    pub condition: Option<Box<dyn Fn(&SeedContext) -> bool + Send + Sync>>,
    pub action: SeedAction,
    pub snapshot_after: Option<String>,
}

impl SeedScenario {
    pub fn command(command: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            condition: None,
            action: SeedAction::Command {
                command: command.into(),
                timeout_ms,
            },
            snapshot_after: None,
        }
    }

    pub fn data(rows: Vec<serde_json::Value>) -> Self {
        Self {
            condition: None,
            action: SeedAction::Data(rows),
            snapshot_after: None,
        }
    }

    pub fn when(mut self, predicate: impl Fn(&SeedContext) -> bool + Send + Sync + 'static) -> Self {
        self.condition = Some(Box::new(predicate));
        self
    }

    pub fn snapshot_as(mut self, name: impl Into<String>) -> Self {
        self.snapshot_after = Some(name.into());
        self
    }
}

pub struct SeedManager {
    strategy: SeedStrategy,
    restore_strategy: RestoreStrategy,
    scenarios: Vec<SeedScenario>,
    working_dir: Option<PathBuf>,
    has_seeded_once: bool,
    seeded_files: HashSet<String>,
    seeded_tests: HashSet<String>,
    current_snapshot_id: Option<String>,
}

impl SeedManager {
    pub fn new(strategy: SeedStrategy, restore_strategy: RestoreStrategy) -> Self {
        Self {
            strategy,
            restore_strategy,
            scenarios: Vec::new(),
            working_dir: None,
            has_seeded_once: false,
            seeded_files: HashSet::new(),
            seeded_tests: HashSet::new(),
            current_snapshot_id: None,
        }
    }

    pub fn with_scenarios(mut self, scenarios: Vec<SeedScenario>) -> Self {
        self.scenarios = scenarios;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn should_seed(&self, ctx: &SeedContext) -> bool {
        match self.strategy {
            SeedStrategy::Once => !self.has_seeded_once,
            SeedStrategy::PerFile => ctx.file.as_ref().is_none_or(|f| !self.seeded_files.contains(f)),
            SeedStrategy::PerTest => !self.seeded_tests.contains(&ctx.key()),
            SeedStrategy::Custom => true,
        }
    }

    fn mark_seeded(&mut self, ctx: &SeedContext) {
        match self.strategy {
            SeedStrategy::Once => self.has_seeded_once = true,
            SeedStrategy::PerFile => {
                if let Some(file) = &ctx.file {
                    self.seeded_files.insert(file.clone());
                }
            }
            SeedStrategy::PerTest => {
                self.seeded_tests.insert(ctx.key());
            }
            SeedStrategy::Custom => {}
        }
    }

    pub async fn seed(
        &mut self,
        ctx: &SeedContext,
        connection_strings: &std::collections::HashMap<String, String>,
        sink: Option<&dyn SeedDataSink>,
    ) -> Result<(), SeedError> {
        if !self.should_seed(ctx) {
            return Ok(());
        }

        match self.strategy {
            SeedStrategy::Custom => {
                for index in 0..self.scenarios.len() {
                    let applies = match &self.scenarios[index].condition {
                        Some(predicate) => predicate(ctx),
                        None => true,
                    };
                    if applies {
                        self.run_scenario(index, &ctx.worker_id, connection_strings, sink).await?;
                    }
                }
            }
            _ => {
                if !self.scenarios.is_empty() {
                    self.run_scenario(0, &ctx.worker_id, connection_strings, sink).await?;
                }
            }
        }

        self.mark_seeded(ctx);
        Ok(())
    }

    async fn run_scenario(
        &mut self,
        index: usize,
        worker_id: &str,
        connection_strings: &std::collections::HashMap<String, String>,
        sink: Option<&dyn SeedDataSink>,
    ) -> Result<(), SeedError> {
        let (action, snapshot_after) = {
            let scenario = &self.scenarios[index];
            (scenario.action.clone(), scenario.snapshot_after.clone())
        };

        match action {
            SeedAction::Command { command, timeout_ms } => {
                self.run_command(&command, timeout_ms, worker_id, connection_strings).await?;
            }
            SeedAction::Data(rows) => {
                let sink = sink.ok_or_else(|| SeedError::CommandFailed {
                    reason: "inline seed data requires a configured `SeedDataSink`".to_string(),
                })?;
                sink.insert(&rows).await?;
            }
        }

        if let Some(name) = snapshot_after {
            self.current_snapshot_id = Some(name);
        }
        Ok(())
    }

    async fn run_command(
        &self,
        command: &str,
        timeout_ms: u64,
        worker_id: &str,
        connection_strings: &std::collections::HashMap<String, String>,
    ) -> Result<(), SeedError> {
        let tokens = split_command(command);
        let Some((program, args)) = tokens.split_first() else {
            return Err(SeedError::CommandFailed {
                reason: "empty seed command".to_string(),
            });
        };

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.envs(std::env::vars());
        cmd.envs(connection_strings.clone());
        cmd.env("WORKER_ID", worker_id);
        cmd.env("NODE_ENV", "test");
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let child = cmd.spawn().map_err(|e| SeedError::CommandFailed { reason: e.to_string() })?;
        let output = tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait_with_output())
            .await
            .map_err(|_| SeedError::Timeout(timeout_ms))?
            .map_err(|e| SeedError::CommandFailed { reason: e.to_string() })?;

        if !output.stderr.is_empty() {
            warn!("seed command stderr: {}", String::from_utf8_lossy(&output.stderr));
        }
        if !output.status.success() {
            return Err(SeedError::CommandFailed {
                reason: format!("exit status {:?}", output.status.code()),
            });
        }
        Ok(())
    }

    /// Restores state between tests according to the configured restore
    /// strategy. `active_savepoint` is only consulted for
    /// `RestoreStrategy::Rollback`.
    pub async fn restore(
        &mut self,
        db: &mut DatabaseManager,
        worker_name: &str,
    ) -> Result<(), SeedError> {
        match self.restore_strategy {
            RestoreStrategy::None => Ok(()),
            RestoreStrategy::Rollback => {
                db.restore(worker_name).await.map_err(SeedError::from)
            }
            RestoreStrategy::Reset => db.reset().await.map_err(SeedError::from),
            RestoreStrategy::Snapshot => {
                if let Some(name) = self.current_snapshot_id.clone() {
                    db.restore(&name).await.map_err(SeedError::from)
                } else {
                    Err(SeedError::DbState(DbStateError::Unsupported(
                        "no snapshot has been recorded to restore".to_string(),
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_strategy_seeds_a_single_time() {
        let mut manager = SeedManager::new(SeedStrategy::Once, RestoreStrategy::None);
        let ctx = SeedContext {
            worker_id: "w1".into(),
            ..Default::default()
        };
        assert!(manager.should_seed(&ctx));
        manager.mark_seeded(&ctx);
        assert!(!manager.should_seed(&ctx));
    }

    #[test]
    fn per_file_strategy_tracks_files_independently() {
        let mut manager = SeedManager::new(SeedStrategy::PerFile, RestoreStrategy::None);
        let a = SeedContext {
            file: Some("a.rs".into()),
            worker_id: "w1".into(),
            ..Default::default()
        };
        let b = SeedContext {
            file: Some("b.rs".into()),
            worker_id: "w1".into(),
            ..Default::default()
        };
        manager.mark_seeded(&a);
        assert!(!manager.should_seed(&a));
        assert!(manager.should_seed(&b));
    }

    #[test]
    fn per_test_strategy_tracks_file_and_test_pairs() {
        let mut manager = SeedManager::new(SeedStrategy::PerTest, RestoreStrategy::None);
        let ctx = SeedContext {
            file: Some("a.rs".into()),
            test: Some("creates a user".into()),
            worker_id: "w1".into(),
        };
        assert!(manager.should_seed(&ctx));
        manager.mark_seeded(&ctx);
        assert!(!manager.should_seed(&ctx));
    }

    #[test]
    fn custom_strategy_always_reports_seedable() {
        let manager = SeedManager::new(SeedStrategy::Custom, RestoreStrategy::None);
        let ctx = SeedContext::default();
        assert!(manager.should_seed(&ctx));
    }
}
