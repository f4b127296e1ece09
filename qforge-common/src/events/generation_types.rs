//! Payload types carried by generation events

use serde::{Deserialize, Serialize};

/// Per-kind counters carried in a progress snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    /// Items requested for this run
    pub target: usize,
    /// Items newly persisted
    pub created: usize,
    /// Candidates skipped as duplicates
    pub skipped: usize,
    /// Candidates rejected by validation
    pub invalid: usize,
}

impl KindCounts {
    /// Shortfall against the target (never negative)
    pub fn remaining(&self) -> usize {
        self.target.saturating_sub(self.created)
    }
}
