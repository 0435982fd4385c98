//! CanonicalStore trait definition.

use async_trait::async_trait;

use super::Result;
use crate::model::CanonicalDataset;

/// Interface for canonical table persistence.
///
/// Canonical tables are derived snapshots: every write replaces both tables
/// wholesale, never patches rows in place.
///
/// # Implementations
///
/// - `SqliteCanonicalStore`: SQLite storage
/// - `MockCanonicalStore`: In-memory mock for testing
#[async_trait]
pub trait CanonicalStore: Send + Sync {
    /// Replace both canonical tables with `dataset`.
    ///
    /// Either both tables hold the new data afterwards or neither changed.
    async fn replace(&self, dataset: &CanonicalDataset) -> Result<()>;

    /// Read both canonical tables back, rows in their original order.
    ///
    /// Returns an empty dataset if nothing was written yet.
    async fn load(&self) -> Result<CanonicalDataset>;
}
