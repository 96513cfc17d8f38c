//! In-memory Lock Store with TTLs driven by an injected clock.

use chrono::Duration as ChronoDuration;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ticketlock_core::environment::Clock;
use ticketlock_core::{DateTime, LockError, LockHolder, LockResult, LockStore, TicketId, Utc};

#[derive(Debug, Clone, Copy)]
struct Entry {
    holder: LockHolder,
    expires_at: DateTime<Utc>,
}

/// Mock Lock Store.
///
/// Every operation runs under one mutex, so conditional acquire, holder
/// compare-and-delete and extend are atomic just like their Redis
/// counterparts. Entries whose deadline has passed on the injected clock are
/// treated as absent.
#[derive(Clone)]
pub struct InMemoryLockStore {
    entries: Arc<Mutex<HashMap<TicketId, Entry>>>,
    clock: Arc<dyn Clock>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryLockStore {
    /// Create a store that reads time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Simulate the backend going down (every call fails) or coming back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Overwrite the entry for `ticket_id`, as if another process had taken
    /// it after ours lapsed.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Backend`] if the mutex is poisoned.
    pub fn force_holder(
        &self,
        ticket_id: TicketId,
        holder: LockHolder,
        ttl: Duration,
    ) -> LockResult<()> {
        let expires_at = self.deadline(ttl)?;
        self.entries()?.insert(ticket_id, Entry { holder, expires_at });
        Ok(())
    }

    /// Number of live entries.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Backend`] if the mutex is poisoned.
    pub fn live_count(&self) -> LockResult<usize> {
        let now = self.clock.now();
        Ok(self.entries()?.values().filter(|e| e.expires_at > now).count())
    }

    fn entries(&self) -> LockResult<std::sync::MutexGuard<'_, HashMap<TicketId, Entry>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LockError::Backend("lock store unavailable".to_string()));
        }
        self.entries
            .lock()
            .map_err(|_| LockError::Backend("Mutex lock failed".to_string()))
    }

    fn deadline(&self, ttl: Duration) -> LockResult<DateTime<Utc>> {
        let ttl = ChronoDuration::from_std(ttl)
            .map_err(|e| LockError::Backend(format!("TTL out of range: {e}")))?;
        Ok(self.clock.now() + ttl)
    }

    fn live(entries: &HashMap<TicketId, Entry>, ticket_id: TicketId, now: DateTime<Utc>) -> Option<Entry> {
        entries.get(&ticket_id).copied().filter(|e| e.expires_at > now)
    }
}

impl std::fmt::Debug for InMemoryLockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLockStore").finish_non_exhaustive()
    }
}

impl LockStore for InMemoryLockStore {
    async fn acquire_if_absent(
        &self,
        ticket_id: TicketId,
        holder: LockHolder,
        ttl: Duration,
    ) -> LockResult<bool> {
        let expires_at = self.deadline(ttl)?;
        let now = self.clock.now();
        let mut entries = self.entries()?;
        if Self::live(&entries, ticket_id, now).is_some() {
            return Ok(false);
        }
        entries.insert(ticket_id, Entry { holder, expires_at });
        Ok(true)
    }

    async fn release(&self, ticket_id: TicketId) -> LockResult<()> {
        self.entries()?.remove(&ticket_id);
        Ok(())
    }

    async fn release_held(&self, ticket_id: TicketId, holder: LockHolder) -> LockResult<bool> {
        let now = self.clock.now();
        let mut entries = self.entries()?;
        match Self::live(&entries, ticket_id, now) {
            Some(entry) if entry.holder == holder => {
                entries.remove(&ticket_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn holder_of(&self, ticket_id: TicketId) -> LockResult<Option<LockHolder>> {
        let now = self.clock.now();
        let entries = self.entries()?;
        Ok(Self::live(&entries, ticket_id, now).map(|e| e.holder))
    }

    async fn extend(
        &self,
        ticket_id: TicketId,
        holder: LockHolder,
        ttl: Duration,
    ) -> LockResult<bool> {
        let wanted = self.deadline(ttl)?;
        let now = self.clock.now();
        let mut entries = self.entries()?;
        match Self::live(&entries, ticket_id, now) {
            Some(entry) if entry.holder == holder => {
                if entry.expires_at < wanted {
                    entries.insert(ticket_id, Entry { holder, expires_at: wanted });
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
