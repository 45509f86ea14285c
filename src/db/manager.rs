//! Per-worker `DatabaseManager` façade (spec §4.6): the object test code
//! actually holds. Translates the strategy-agnostic `snapshot`/`restore`
//! vocabulary into the right `DbStateManager` calls for whichever
//! [`IsolationStrategy`] this worker was configured with.
use std::future::Future;

use sea_orm::{ConnectionTrait, QueryResult, Statement, Value};

use crate::error::DbStateError;

use super::state::DbStateManager;
use super::strategy::IsolationStrategy;

pub struct DatabaseManager {
    worker_id: String,
    strategy: IsolationStrategy,
    state: DbStateManager,
    active_savepoint: Option<String>,
    connection_url: String,
}

impl DatabaseManager {
    pub async fn connect(
        connection_url: impl Into<String>,
        strategy: IsolationStrategy,
        worker_id: impl Into<String>,
    ) -> Result<Self, DbStateError> {
        let connection_url = connection_url.into();
        let worker_id = worker_id.into();
        let connection = sea_orm::Database::connect(&connection_url).await?;
        let state = DbStateManager::new(connection, strategy, worker_id.clone());
        Ok(Self {
            worker_id,
            strategy,
            state,
            active_savepoint: None,
            connection_url,
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_url
    }

    pub fn metrics(&self) -> &super::metrics::MetricsRecorder {
        self.state.metrics()
    }

    fn scoped_name(&self, name: &str) -> String {
        format!("{name}_{}", self.worker_id)
    }

    /// Establishes this worker's isolated state: a savepoint, a fresh schema,
    /// a fresh database, or a data snapshot, depending on the configured
    /// strategy.
    pub async fn snapshot(&mut self, name: &str) -> Result<(), DbStateError> {
        match self.strategy {
            IsolationStrategy::Savepoint => {
                let id = self.state.create_savepoint().await?;
                self.active_savepoint = Some(id);
                Ok(())
            }
            IsolationStrategy::Schema => self.state.create_schema(&self.scoped_name(name)).await,
            IsolationStrategy::Database => self.state.create_database(&self.scoped_name(name)).await,
            IsolationStrategy::Snapshot => self.state.create_snapshot(name).await,
        }
    }

    /// Undoes whatever `snapshot` established, returning this worker to a
    /// clean slate for the next test.
    pub async fn restore(&mut self, name: &str) -> Result<(), DbStateError> {
        match self.strategy {
            IsolationStrategy::Savepoint => {
                let id = self
                    .active_savepoint
                    .take()
                    .ok_or_else(|| DbStateError::UnknownSavepoint(name.to_string()))?;
                self.state.rollback_to_savepoint(&id).await
            }
            IsolationStrategy::Schema => self.state.drop_schema(&self.scoped_name(name)).await,
            IsolationStrategy::Database => self.state.drop_database(&self.scoped_name(name)).await,
            IsolationStrategy::Snapshot => self.state.restore_snapshot(name).await,
        }
    }

    /// Drops every schema/database/savepoint/snapshot this manager created,
    /// regardless of the active strategy. Called when a worker is retired.
    pub async fn reset(&mut self) -> Result<(), DbStateError> {
        self.active_savepoint = None;
        self.state.cleanup().await
    }

    pub async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<QueryResult>, DbStateError> {
        let stmt = Statement::from_sql_and_values(self.state.backend(), sql, params);
        Ok(self.state.executor().query_all(stmt).await?)
    }

    /// Runs `f` inside a transaction on the underlying connection, committing
    /// if it returns `Ok` and rolling back if it returns `Err`, unless `f`
    /// already called `tx.commit()`/`tx.rollback()` itself.
    pub async fn transaction<F, Fut, T>(&mut self, f: F) -> Result<T, DbStateError>
    where
        F: FnOnce(&mut Transaction<'_>) -> Fut,
        Fut: Future<Output = Result<T, DbStateError>>,
    {
        self.state.begin_transaction().await?;
        let mut tx = Transaction {
            state: &mut self.state,
            finished: false,
        };
        let result = f(&mut tx).await;
        let finished = tx.finished;
        drop(tx);

        match result {
            Ok(value) => {
                if !finished {
                    self.state.commit_transaction().await?;
                }
                Ok(value)
            }
            Err(e) => {
                if !finished {
                    let _ = self.state.rollback_transaction().await;
                }
                Err(e)
            }
        }
    }
}

pub struct Transaction<'a> {
    state: &'a mut DbStateManager,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<QueryResult>, DbStateError> {
        let stmt = Statement::from_sql_and_values(self.state.backend(), sql, params);
        Ok(self.state.executor().query_all(stmt).await?)
    }

    pub async fn commit(&mut self) -> Result<(), DbStateError> {
        if self.finished {
            return Err(DbStateError::NoTransaction);
        }
        self.finished = true;
        self.state.commit_transaction().await
    }

    pub async fn rollback(&mut self) -> Result<(), DbStateError> {
        if self.finished {
            return Err(DbStateError::NoTransaction);
        }
        self.finished = true;
        self.state.rollback_transaction().await
    }
}
