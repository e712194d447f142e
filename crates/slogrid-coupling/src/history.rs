//! Action history — bounded, append-only audit log.
//!
//! Every trigger and revert (successful or not) is recorded here for
//! effectiveness scoring and postmortems. The control logic itself never
//! reads it back.

use std::collections::VecDeque;

use slogrid_types::ActionRecord;

/// Default retention cap.
pub const DEFAULT_HISTORY_CAP: usize = 1000;

/// Ring buffer of the most recent action records.
#[derive(Debug)]
pub struct ActionHistory {
    records: VecDeque<ActionRecord>,
    cap: usize,
    /// Total records ever appended, including evicted ones.
    total_appended: u64,
}

impl Default for ActionHistory {
    fn default() -> Self {
        Self::with_cap(DEFAULT_HISTORY_CAP)
    }
}

impl ActionHistory {
    pub fn with_cap(cap: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(cap.min(64)),
            cap: cap.max(1),
            total_appended: 0,
        }
    }

    /// Append a record, evicting the oldest once the cap is reached.
    pub fn push(&mut self, record: ActionRecord) {
        if self.records.len() == self.cap {
            self.records.pop_front();
        }
        self.records.push_back(record);
        self.total_appended += 1;
    }

    /// The most recent `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ActionRecord> {
        self.records.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }
}
