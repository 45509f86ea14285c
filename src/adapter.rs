//! The in-process override adapter (spec §4.5): an application under test
//! that links this crate directly (rather than over the HTTP control port)
//! implements this trait and registers itself with the `OverrideManager` so
//! overrides can be applied without a network hop.
use async_trait::async_trait;

use crate::error::OverrideError;
use crate::overrides::OverrideRecord;

#[async_trait]
pub trait Adapter: Send + Sync {
    /// Applies `record` against whatever the adapter owns (a DI container,
    /// a module registry, a repository instance). Adapters that can't
    /// resolve the target should return `OverrideError::Rejected` rather
    /// than panic, since override delivery failures are logged, not fatal.
    async fn apply_override(&self, record: &OverrideRecord) -> Result<(), OverrideError>;

    /// Clears every override this adapter has applied, restoring the
    /// original implementation. Called at the end of each test/worker.
    async fn clear(&self) -> Result<(), OverrideError>;
}
