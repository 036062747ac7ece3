//! Ledger store abstraction.
//!
//! A store owns the committed client rows and the append-only entry log, and
//! hands out [`AtomicUnit`]s: scoped transactions that hold the exclusive lock
//! on one client row and commit or roll back all of their effects together.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use creditledger_common::{ClientBalance, ClientId, Entry, EntryDraft, Result};

pub use memory::MemoryStore;
pub use postgres::{PgStoreSettings, PostgresStore};

/// Committed balance of a client next to the sum of its entry log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAudit {
    pub client_id: ClientId,
    pub balance: ClientBalance,
    /// Sum of the signed effects of every committed entry.
    pub entries_sum: i64,
    pub entry_count: i64,
}

impl ClientAudit {
    /// Running balance matches the entry log and respects the floor.
    pub fn is_consistent(&self) -> bool {
        self.balance.balance == self.entries_sum && self.balance.balance >= self.balance.floor()
    }
}

/// Durable storage for clients and entries.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a new atomic unit.
    async fn begin(&self) -> Result<Box<dyn AtomicUnit>>;

    /// Unlocked read of committed limit and balance. Never waits on a
    /// client lock and never observes uncommitted effects.
    async fn read_client(&self, client_id: ClientId) -> Result<Option<ClientBalance>>;

    /// Up to `limit` committed entries, most recent first.
    async fn recent_entries(&self, client_id: ClientId, limit: usize) -> Result<Vec<Entry>>;

    /// Balance and entry log totals read from a single committed state.
    async fn audit_client(&self, client_id: ClientId) -> Result<Option<ClientAudit>>;

    /// Release pooled resources. Called once at shutdown.
    async fn close(&self);
}

/// A scoped, all-or-nothing group of store operations.
///
/// Dropping a unit without calling [`AtomicUnit::commit`] rolls it back and
/// releases any client lock it holds. This also covers a unit whose future
/// was cancelled by a timeout.
#[async_trait]
pub trait AtomicUnit: Send {
    /// Take the exclusive lock on the client row and read it. Blocks while
    /// another unit holds the same client.
    async fn lock_and_read_client(&mut self, client_id: ClientId) -> Result<Option<ClientBalance>>;

    /// Add `delta` to the locked client's balance. Returns the balance as
    /// seen inside this unit.
    async fn apply_delta(&mut self, client_id: ClientId, delta: i64) -> Result<i64>;

    /// Append an entry for the locked client. The store assigns its timestamp.
    async fn append_entry(&mut self, client_id: ClientId, draft: &EntryDraft) -> Result<()>;

    /// Publish every effect of the unit and release the lock.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every effect of the unit and release the lock.
    async fn rollback(self: Box<Self>) -> Result<()>;
}
