//! Completion payload reported by the sync driver

use serde::{Deserialize, Serialize};

/// Counts gathered over one successful sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub categories_pulled: u32,
    pub feeds_pulled: u32,
    pub entries_pulled: u32,
    pub entries_pushed: u32,
}
