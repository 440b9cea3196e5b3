//! Worker pool statistics.

use serde::{Deserialize, Serialize};

/// Snapshot of the queue's admission state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    /// Jobs waiting for a slot.
    pub queued: usize,
    /// Jobs holding a slot.
    pub active: usize,
    /// Slot capacity.
    pub max_concurrent: usize,
    /// Jobs finished successfully since start.
    pub completed: u64,
    /// Jobs that ended in an error event since start.
    pub failed: u64,
}

impl QueueStats {
    /// Total jobs in the system (queued + active).
    pub fn in_flight(&self) -> usize {
        self.queued + self.active
    }

    /// Free slots right now.
    pub fn free_slots(&self) -> usize {
        self.max_concurrent.saturating_sub(self.active)
    }
}
