//! Redis-based Lock Store.
//!
//! One key per ticket, holding the holder's user and booking ids, with a
//! millisecond TTL equal to the reservation hold:
//!
//! - **Key**: `ticket_lock:{ticket_id}` → `{user_id}:{booking_id}`
//! - **Acquire**: `SET key holder NX PX ttl`, a single atomic command
//! - **Release**: `DEL key`, or a Lua compare-and-delete for holder-scoped release
//! - **Extend**: Lua compare-and-`PEXPIRE`, never shortening the remaining TTL
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use ticketlock_core::{BookingId, LockHolder, LockStore, TicketId, UserId};
//! use ticketlock_redis::RedisLockStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let locks = RedisLockStore::new("redis://127.0.0.1:6379").await?;
//! let ticket = TicketId::new();
//! let holder = LockHolder::new(UserId::new(), BookingId::new());
//!
//! if locks.acquire_if_absent(ticket, holder, Duration::from_secs(600)).await? {
//!     // the ticket is ours for ten minutes
//!     locks.release_held(ticket, holder).await?;
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;
use ticketlock_core::{LockError, LockHolder, LockResult, LockStore, TicketId};

const RELEASE_HELD_SCRIPT: &str = r"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    end
    return 0
";

// PTTL is -1 for a key without expiry; such a key is left alone.
const EXTEND_SCRIPT: &str = r"
    if redis.call('GET', KEYS[1]) ~= ARGV[1] then
        return 0
    end
    local remaining = redis.call('PTTL', KEYS[1])
    if remaining >= 0 and remaining < tonumber(ARGV[2]) then
        redis.call('PEXPIRE', KEYS[1], ARGV[2])
    end
    return 1
";

/// `Redis`-backed [`LockStore`].
///
/// Clones share the same `ConnectionManager`.
#[derive(Clone)]
pub struct RedisLockStore {
    conn_manager: ConnectionManager,
    release_held: Script,
    extend: Script,
}

impl RedisLockStore {
    /// Connect to `Redis`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Backend`] if the URL is malformed or the server
    /// is unreachable.
    pub async fn new(redis_url: &str) -> LockResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| LockError::Backend(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            LockError::Backend(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("RedisLockStore initialized successfully");

        Ok(Self::from_manager(conn_manager))
    }

    /// Build a store over an existing connection manager.
    #[must_use]
    pub fn from_manager(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            release_held: Script::new(RELEASE_HELD_SCRIPT),
            extend: Script::new(EXTEND_SCRIPT),
        }
    }

    /// `ticket_lock:{ticket_id}`
    fn lock_key(ticket_id: TicketId) -> String {
        format!("ticket_lock:{ticket_id}")
    }

    /// TTL in whole milliseconds, at least one.
    fn ttl_millis(ttl: Duration) -> u64 {
        u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
    }
}

impl std::fmt::Debug for RedisLockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLockStore").finish_non_exhaustive()
    }
}

impl LockStore for RedisLockStore {
    async fn acquire_if_absent(
        &self,
        ticket_id: TicketId,
        holder: LockHolder,
        ttl: Duration,
    ) -> LockResult<bool> {
        let mut conn = self.conn_manager.clone();
        let key = Self::lock_key(ticket_id);

        // Reply is "OK" when set, nil when the key already exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(holder.to_string())
            .arg("NX")
            .arg("PX")
            .arg(Self::ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| LockError::Backend(format!("Failed to acquire lock: {e}")))?;

        let acquired = reply.is_some();
        tracing::debug!(
            ticket_id = %ticket_id,
            user_id = %holder.user_id,
            booking_id = %holder.booking_id,
            acquired,
            "Ticket lock acquire attempted"
        );
        Ok(acquired)
    }

    async fn release(&self, ticket_id: TicketId) -> LockResult<()> {
        let mut conn = self.conn_manager.clone();
        let _: i64 = conn
            .del(Self::lock_key(ticket_id))
            .await
            .map_err(|e| LockError::Backend(format!("Failed to release lock: {e}")))?;

        tracing::debug!(ticket_id = %ticket_id, "Ticket lock released");
        Ok(())
    }

    async fn release_held(&self, ticket_id: TicketId, holder: LockHolder) -> LockResult<bool> {
        let mut conn = self.conn_manager.clone();
        let deleted: i64 = self
            .release_held
            .key(Self::lock_key(ticket_id))
            .arg(holder.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::Backend(format!("Failed to release held lock: {e}")))?;

        tracing::debug!(
            ticket_id = %ticket_id,
            user_id = %holder.user_id,
            booking_id = %holder.booking_id,
            released = deleted == 1,
            "Holder-scoped ticket lock release"
        );
        Ok(deleted == 1)
    }

    async fn holder_of(&self, ticket_id: TicketId) -> LockResult<Option<LockHolder>> {
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = conn
            .get(Self::lock_key(ticket_id))
            .await
            .map_err(|e| LockError::Backend(format!("Failed to read lock: {e}")))?;

        value
            .map(|raw| {
                raw.parse::<LockHolder>().map_err(|_| LockError::Corrupt {
                    ticket_id,
                    value: raw,
                })
            })
            .transpose()
    }

    async fn extend(
        &self,
        ticket_id: TicketId,
        holder: LockHolder,
        ttl: Duration,
    ) -> LockResult<bool> {
        let mut conn = self.conn_manager.clone();
        let extended: i64 = self
            .extend
            .key(Self::lock_key(ticket_id))
            .arg(holder.to_string())
            .arg(Self::ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::Backend(format!("Failed to extend lock: {e}")))?;

        Ok(extended == 1)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use ticketlock_core::{BookingId, UserId};

    // Note: tests marked #[ignore] require a running Redis instance
    // Run with: docker run -d -p 6379:6379 redis:7-alpine

    const HOLD: Duration = Duration::from_secs(600);

    fn holder() -> LockHolder {
        LockHolder::new(UserId::new(), BookingId::new())
    }

    async fn store() -> RedisLockStore {
        RedisLockStore::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis")
    }

    #[test]
    fn test_lock_key_format() {
        let ticket = TicketId::new();
        assert_eq!(
            RedisLockStore::lock_key(ticket),
            format!("ticket_lock:{ticket}")
        );
    }

    #[test]
    fn test_ttl_millis_is_never_zero() {
        assert_eq!(RedisLockStore::ttl_millis(Duration::ZERO), 1);
        assert_eq!(RedisLockStore::ttl_millis(Duration::from_secs(600)), 600_000);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_acquire_is_exclusive() {
        let locks = store().await;
        let ticket = TicketId::new();
        let (alice, bob) = (holder(), holder());

        assert!(locks.acquire_if_absent(ticket, alice, HOLD).await.expect("acquire"));
        assert!(!locks.acquire_if_absent(ticket, bob, HOLD).await.expect("acquire"));
        assert_eq!(locks.holder_of(ticket).await.expect("read"), Some(alice));

        locks.release(ticket).await.expect("release");
        assert_eq!(locks.holder_of(ticket).await.expect("read"), None);
        assert!(locks.acquire_if_absent(ticket, bob, HOLD).await.expect("acquire"));
        locks.release(ticket).await.expect("cleanup");
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_release_held_checks_holder() {
        let locks = store().await;
        let ticket = TicketId::new();
        let (alice, bob) = (holder(), holder());

        locks.acquire_if_absent(ticket, alice, HOLD).await.expect("acquire");
        assert!(!locks.release_held(ticket, bob).await.expect("release"));
        assert_eq!(locks.holder_of(ticket).await.expect("read"), Some(alice));
        assert!(locks.release_held(ticket, alice).await.expect("release"));
        assert!(!locks.release_held(ticket, alice).await.expect("release"));
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_lock_expires_after_ttl() {
        let locks = store().await;
        let ticket = TicketId::new();

        locks
            .acquire_if_absent(ticket, holder(), Duration::from_millis(100))
            .await
            .expect("acquire");
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(locks.holder_of(ticket).await.expect("read"), None);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_extend_only_for_holder() {
        let locks = store().await;
        let ticket = TicketId::new();
        let (alice, bob) = (holder(), holder());

        locks
            .acquire_if_absent(ticket, alice, Duration::from_millis(200))
            .await
            .expect("acquire");
        assert!(!locks.extend(ticket, bob, HOLD).await.expect("extend"));
        assert!(locks.extend(ticket, alice, HOLD).await.expect("extend"));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(locks.holder_of(ticket).await.expect("read"), Some(alice));
        locks.release(ticket).await.expect("cleanup");
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_extend_missing_lock_fails() {
        let locks = store().await;
        assert!(!locks
            .extend(TicketId::new(), holder(), HOLD)
            .await
            .expect("extend"));
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_older_booking_cannot_release_same_users_new_hold() {
        let locks = store().await;
        let ticket = TicketId::new();
        let user = UserId::new();
        let old = LockHolder::new(user, BookingId::new());
        let current = LockHolder::new(user, BookingId::new());

        locks.acquire_if_absent(ticket, current, HOLD).await.expect("acquire");
        assert!(!locks.release_held(ticket, old).await.expect("release"));
        assert_eq!(locks.holder_of(ticket).await.expect("read"), Some(current));
        locks.release(ticket).await.expect("cleanup");
    }
}
