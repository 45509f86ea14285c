//! The four database isolation strategies (spec §4.6).
use serde::{Deserialize, Serialize};

/// How a per-worker `DatabaseManager` isolates state between tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationStrategy {
    /// `SAVEPOINT`/`ROLLBACK TO SAVEPOINT` inside one long-lived transaction.
    /// Cheapest strategy; requires every write under test to happen on the
    /// same connection/transaction.
    Savepoint,
    /// A dedicated `CREATE SCHEMA`, structurally cloned from `public`, per
    /// worker. Middle ground: isolates concurrent workers without needing a
    /// full second database.
    Schema,
    /// A dedicated `CREATE DATABASE` per worker. Strongest isolation,
    /// heaviest to set up and tear down.
    Database,
    /// A point-in-time data snapshot restored between tests, independent of
    /// transactions — the only strategy that survives a test committing.
    Snapshot,
}

impl std::fmt::Display for IsolationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            IsolationStrategy::Savepoint => "savepoint",
            IsolationStrategy::Schema => "schema",
            IsolationStrategy::Database => "database",
            IsolationStrategy::Snapshot => "snapshot",
        };
        f.write_str(label)
    }
}
