//! History sink trait

use crate::error::Result;
use crate::types::HistoryItem;

/// Append-only log of completed tasks
///
/// Implementations:
/// - `HistoryDb`: SQLite
pub trait HistorySink: Send + Sync {
    fn append(&self, item: &HistoryItem) -> Result<()>;

    /// Most recent entries, newest first
    fn recent(&self, _limit: usize) -> Result<Vec<HistoryItem>> {
        Ok(Vec::new())
    }
}
