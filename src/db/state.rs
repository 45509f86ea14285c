//! `DbStateManager`: the SQL-level isolation primitives behind every
//! [`super::strategy::IsolationStrategy`] (spec §4.6). This is the one place
//! the crate issues raw SQL; everything above it (`DatabaseManager`) is a
//! thin pass-through that never interprets result rows, matching the
//! driver-boundary decision recorded in `DESIGN.md`.
use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use rand::Rng;
use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, Statement, TransactionTrait};

use crate::error::DbStateError;

use super::metrics::{MetricsRecorder, OperationMetric};
use super::strategy::IsolationStrategy;

#[derive(Debug, Clone)]
struct TrackedResource {
    #[allow(dead_code)]
    created_at: chrono::DateTime<Utc>,
    #[allow(dead_code)]
    worker_id: String,
}

#[derive(Debug, Clone)]
struct SnapshotRecord {
    shadow_schema: String,
}

pub struct DbStateManager {
    connection: DatabaseConnection,
    strategy: IsolationStrategy,
    worker_id: String,
    active_transaction: Option<DatabaseTransaction>,
    savepoints: Vec<String>,
    schemas: HashMap<String, TrackedResource>,
    databases: HashMap<String, TrackedResource>,
    snapshots: HashMap<String, SnapshotRecord>,
    metrics: MetricsRecorder,
}

impl DbStateManager {
    pub fn new(connection: DatabaseConnection, strategy: IsolationStrategy, worker_id: String) -> Self {
        Self {
            connection,
            strategy,
            worker_id,
            active_transaction: None,
            savepoints: Vec::new(),
            schemas: HashMap::new(),
            databases: HashMap::new(),
            snapshots: HashMap::new(),
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    pub(crate) fn backend(&self) -> sea_orm::DatabaseBackend {
        self.connection.get_database_backend()
    }

    pub(crate) fn executor(&self) -> &dyn ConnectionTrait {
        match &self.active_transaction {
            Some(tx) => tx,
            None => &self.connection,
        }
    }

    pub(crate) fn connection_ref(&self) -> &DatabaseConnection {
        &self.connection
    }

    fn record(&mut self, operation: &str, started: Instant) {
        self.metrics.record(OperationMetric {
            operation: operation.to_string(),
            duration: started.elapsed(),
            timestamp: Utc::now(),
            worker_id: self.worker_id.clone(),
            strategy: self.strategy,
        });
    }

    async fn execute(&self, sql: String) -> Result<(), DbStateError> {
        self.executor()
            .execute(Statement::from_string(self.backend(), sql))
            .await?;
        Ok(())
    }

    async fn tables_in_schema(&self, schema: &str) -> Result<Vec<String>, DbStateError> {
        let stmt = Statement::from_sql_and_values(
            self.backend(),
            "SELECT table_name FROM information_schema.tables WHERE table_schema = $1 AND table_type = 'BASE TABLE'",
            [schema.into()],
        );
        let rows = self.executor().query_all(stmt).await?;
        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            tables.push(row.try_get::<String>("", "table_name")?);
        }
        Ok(tables)
    }

    // -- savepoints ---------------------------------------------------

    pub async fn create_savepoint(&mut self) -> Result<String, DbStateError> {
        let started = Instant::now();
        let suffix: u32 = rand::rng().random();
        let id = format!(
            "sp_{}_{}_{:x}",
            self.worker_id,
            Utc::now().timestamp_millis(),
            suffix
        );
        self.execute(format!("SAVEPOINT {id}")).await?;
        self.savepoints.push(id.clone());
        self.record("create_savepoint", started);
        Ok(id)
    }

    pub async fn rollback_to_savepoint(&mut self, id: &str) -> Result<(), DbStateError> {
        let started = Instant::now();
        if !self.savepoints.iter().any(|s| s == id) {
            return Err(DbStateError::UnknownSavepoint(id.to_string()));
        }
        self.execute(format!("ROLLBACK TO SAVEPOINT {id}")).await?;
        self.savepoints.retain(|s| s != id);
        self.record("rollback_to_savepoint", started);
        Ok(())
    }

    // -- schemas --------------------------------------------------------

    pub async fn create_schema(&mut self, name: &str) -> Result<(), DbStateError> {
        let started = Instant::now();
        if self.schemas.contains_key(name) {
            self.drop_schema(name).await?;
        }
        self.execute(format!("CREATE SCHEMA \"{name}\"")).await?;
        for table in self.tables_in_schema("public").await? {
            self.execute(format!(
                "CREATE TABLE \"{name}\".\"{table}\" (LIKE public.\"{table}\" INCLUDING ALL)"
            ))
            .await?;
        }
        self.schemas.insert(
            name.to_string(),
            TrackedResource {
                created_at: Utc::now(),
                worker_id: self.worker_id.clone(),
            },
        );
        self.record("create_schema", started);
        Ok(())
    }

    pub async fn drop_schema(&mut self, name: &str) -> Result<(), DbStateError> {
        let started = Instant::now();
        self.execute(format!("DROP SCHEMA IF EXISTS \"{name}\" CASCADE"))
            .await?;
        self.schemas.remove(name);
        self.record("drop_schema", started);
        Ok(())
    }

    pub async fn copy_schema(&mut self, from: &str, to: &str) -> Result<(), DbStateError> {
        let started = Instant::now();
        if self.schemas.contains_key(to) {
            self.drop_schema(to).await?;
        }
        self.execute(format!("CREATE SCHEMA \"{to}\"")).await?;
        for table in self.tables_in_schema(from).await? {
            self.execute(format!(
                "CREATE TABLE \"{to}\".\"{table}\" (LIKE \"{from}\".\"{table}\" INCLUDING ALL)"
            ))
            .await?;
        }
        self.schemas.insert(
            to.to_string(),
            TrackedResource {
                created_at: Utc::now(),
                worker_id: self.worker_id.clone(),
            },
        );
        self.record("copy_schema", started);
        Ok(())
    }

    // -- databases --------------------------------------------------------

    pub async fn create_database(&mut self, name: &str) -> Result<(), DbStateError> {
        let started = Instant::now();
        if self.databases.contains_key(name) {
            self.drop_database(name).await?;
        }
        // CREATE DATABASE cannot run inside a transaction block in Postgres.
        self.connection
            .execute(Statement::from_string(
                self.backend(),
                format!("CREATE DATABASE \"{name}\""),
            ))
            .await?;
        self.databases.insert(
            name.to_string(),
            TrackedResource {
                created_at: Utc::now(),
                worker_id: self.worker_id.clone(),
            },
        );
        self.record("create_database", started);
        Ok(())
    }

    pub async fn drop_database(&mut self, name: &str) -> Result<(), DbStateError> {
        let started = Instant::now();
        self.connection
            .execute(Statement::from_string(
                self.backend(),
                format!("DROP DATABASE IF EXISTS \"{name}\""),
            ))
            .await?;
        self.databases.remove(name);
        self.record("drop_database", started);
        Ok(())
    }

    // -- snapshots --------------------------------------------------------

    pub async fn create_snapshot(&mut self, name: &str) -> Result<(), DbStateError> {
        let started = Instant::now();
        let shadow = format!("__snapshot_{name}");
        if self.schemas.contains_key(&shadow) {
            self.drop_schema(&shadow).await?;
        }
        self.execute(format!("CREATE SCHEMA \"{shadow}\"")).await?;
        for table in self.tables_in_schema("public").await? {
            self.execute(format!(
                "CREATE TABLE \"{shadow}\".\"{table}\" AS TABLE public.\"{table}\""
            ))
            .await?;
        }
        self.schemas.insert(
            shadow.clone(),
            TrackedResource {
                created_at: Utc::now(),
                worker_id: self.worker_id.clone(),
            },
        );
        self.snapshots
            .insert(name.to_string(), SnapshotRecord { shadow_schema: shadow });
        self.record("create_snapshot", started);
        Ok(())
    }

    pub async fn restore_snapshot(&mut self, name: &str) -> Result<(), DbStateError> {
        let started = Instant::now();
        let shadow = self
            .snapshots
            .get(name)
            .ok_or_else(|| DbStateError::UnknownSnapshot(name.to_string()))?
            .shadow_schema
            .clone();
        for table in self.tables_in_schema(&shadow).await? {
            self.execute(format!("TRUNCATE TABLE public.\"{table}\"")).await?;
            self.execute(format!(
                "INSERT INTO public.\"{table}\" SELECT * FROM \"{shadow}\".\"{table}\""
            ))
            .await?;
        }
        self.record("restore_snapshot", started);
        Ok(())
    }

    // -- transactions --------------------------------------------------------

    pub async fn begin_transaction(&mut self) -> Result<(), DbStateError> {
        if self.active_transaction.is_some() {
            return Err(DbStateError::TransactionInProgress);
        }
        self.active_transaction = Some(self.connection.begin().await?);
        Ok(())
    }

    pub async fn commit_transaction(&mut self) -> Result<(), DbStateError> {
        let tx = self.active_transaction.take().ok_or(DbStateError::NoTransaction)?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn rollback_transaction(&mut self) -> Result<(), DbStateError> {
        let tx = self.active_transaction.take().ok_or(DbStateError::NoTransaction)?;
        tx.rollback().await?;
        Ok(())
    }

    pub async fn cleanup(&mut self) -> Result<(), DbStateError> {
        let schemas: Vec<String> = self.schemas.keys().cloned().collect();
        for schema in schemas {
            self.drop_schema(&schema).await?;
        }
        let databases: Vec<String> = self.databases.keys().cloned().collect();
        for database in databases {
            self.drop_database(&database).await?;
        }
        self.savepoints.clear();
        self.snapshots.clear();
        Ok(())
    }
}
