//! Recording change feed.

use std::sync::{Arc, Mutex, PoisonError};
use ticketlock_core::{ChangeFeed, TicketChange};

/// Change feed that keeps every published change in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingChangeFeed {
    changes: Arc<Mutex<Vec<TicketChange>>>,
}

impl RecordingChangeFeed {
    /// Create an empty feed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in order.
    #[must_use]
    pub fn changes(&self) -> Vec<TicketChange> {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ChangeFeed for RecordingChangeFeed {
    fn publish(&self, change: TicketChange) {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(change);
    }
}
