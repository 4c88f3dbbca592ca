//! Bounded per-user interaction history.
//!
//! Entries are stored oldest first; when the cap is exceeded the oldest are
//! evicted FIFO. Queries return newest first. Eviction is not an error;
//! appending always succeeds logically.

use crate::domain::{Interaction, UserRecord};

/// Append an interaction, evicting from the front while over capacity.
pub fn append(record: &mut UserRecord, interaction: Interaction, capacity: usize) {
    record.history.push_back(interaction);
    while record.history.len() > capacity {
        record.history.pop_front();
    }
}

/// The most recent interactions, newest first, at most `count` of them.
pub fn recent(record: &UserRecord, count: usize) -> Vec<Interaction> {
    record.history.iter().rev().take(count).cloned().collect()
}
