//! Embedded in-process ledger store.
//!
//! Committed state lives in one `RwLock<ClientAccount>` per client. Writers
//! serialize on a separate per-client async mutex, created lazily on first
//! use, which an [`AtomicUnit`] holds for its whole lifetime. Readers only
//! take the short `RwLock` read guard, so statements never wait on a writer.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use creditledger_common::{
    ClientBalance, ClientId, Entry, EntryDraft, LedgerError, Result,
};

use crate::account::ClientAccount;
use crate::journal::JournalBatch;
use crate::store::{AtomicUnit, ClientAudit, LedgerStore};

#[derive(Default)]
struct Shared {
    accounts: DashMap<ClientId, Arc<RwLock<ClientAccount>>>,
    locks: DashMap<ClientId, Arc<Mutex<()>>>,
}

/// In-memory store. Cloning shares the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `(id, limit)` clients at zero balance.
    pub fn with_clients(clients: impl IntoIterator<Item = (ClientId, i64)>) -> Result<Self> {
        let store = Self::new();
        for (id, limit) in clients {
            store.insert_client(id, limit)?;
        }
        Ok(store)
    }

    /// Seed a client. Existing clients are left untouched.
    pub fn insert_client(&self, id: ClientId, limit: i64) -> Result<()> {
        let account = ClientAccount::new(id, limit)?;
        self.shared
            .accounts
            .entry(id)
            .or_insert_with(|| Arc::new(RwLock::new(account)));
        Ok(())
    }

    /// Number of seeded clients.
    pub fn client_count(&self) -> usize {
        self.shared.accounts.len()
    }

    fn account(&self, id: ClientId) -> Option<Arc<RwLock<ClientAccount>>> {
        self.shared.accounts.get(&id).map(|a| a.value().clone())
    }

    fn client_lock(&self, id: ClientId) -> Arc<Mutex<()>> {
        self.shared
            .locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn AtomicUnit>> {
        Ok(Box::new(MemoryUnit {
            store: self.clone(),
            held: None,
            finished: false,
        }))
    }

    async fn read_client(&self, client_id: ClientId) -> Result<Option<ClientBalance>> {
        Ok(self.account(client_id).map(|a| a.read().snapshot()))
    }

    async fn recent_entries(&self, client_id: ClientId, limit: usize) -> Result<Vec<Entry>> {
        Ok(self
            .account(client_id)
            .map(|a| a.read().recent(limit))
            .unwrap_or_default())
    }

    async fn audit_client(&self, client_id: ClientId) -> Result<Option<ClientAudit>> {
        Ok(self.account(client_id).map(|a| {
            let account = a.read();
            ClientAudit {
                client_id,
                balance: account.snapshot(),
                entries_sum: account.entries_sum(),
                entry_count: account.entry_count() as i64,
            }
        }))
    }

    async fn close(&self) {
        info!(clients = self.client_count(), "Memory store closed");
    }
}

struct HeldClient {
    account: Arc<RwLock<ClientAccount>>,
    working: ClientBalance,
    batch: JournalBatch,
    _guard: OwnedMutexGuard<()>,
}

/// Atomic unit over [`MemoryStore`]. Holds at most one client.
pub struct MemoryUnit {
    store: MemoryStore,
    held: Option<HeldClient>,
    finished: bool,
}

impl MemoryUnit {
    fn held_mut(&mut self, client_id: ClientId) -> Result<&mut HeldClient> {
        match self.held.as_mut() {
            Some(held) if held.batch.client_id == client_id => Ok(held),
            _ => Err(LedgerError::Store(format!(
                "client {client_id} is not locked by this unit"
            ))),
        }
    }
}

#[async_trait]
impl AtomicUnit for MemoryUnit {
    async fn lock_and_read_client(&mut self, client_id: ClientId) -> Result<Option<ClientBalance>> {
        if let Some(held) = &self.held {
            if held.batch.client_id == client_id {
                return Ok(Some(held.working));
            }
            return Err(LedgerError::Store(format!(
                "unit already holds client {}",
                held.batch.client_id
            )));
        }

        let Some(account) = self.store.account(client_id) else {
            return Ok(None);
        };

        let guard = self.store.client_lock(client_id).lock_owned().await;
        let working = account.read().snapshot();

        self.held = Some(HeldClient {
            account,
            working,
            batch: JournalBatch::new(client_id),
            _guard: guard,
        });
        Ok(Some(working))
    }

    async fn apply_delta(&mut self, client_id: ClientId, delta: i64) -> Result<i64> {
        let held = self.held_mut(client_id)?;
        let balance = held
            .working
            .projected(delta)
            .ok_or_else(|| LedgerError::Store("balance overflow".to_string()))?;
        held.batch.add_delta(delta)?;
        held.working.balance = balance;
        Ok(balance)
    }

    async fn append_entry(&mut self, client_id: ClientId, draft: &EntryDraft) -> Result<()> {
        let held = self.held_mut(client_id)?;
        held.batch.add_entry(draft.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut unit = self;
        unit.finished = true;
        let Some(held) = unit.held.take() else {
            return Ok(());
        };
        let HeldClient {
            account,
            batch,
            _guard,
            ..
        } = held;

        if batch.is_empty() {
            return Ok(());
        }

        let client_id = batch.client_id;
        let balance = {
            let mut account = account.write();
            account.apply(batch, Utc::now())?
        };
        debug!(client_id = %client_id, balance, "Unit committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let mut unit = self;
        unit.finished = true;
        if let Some(held) = unit.held.take() {
            debug!(client_id = %held.batch.client_id, "Unit rolled back");
        }
        Ok(())
    }
}

impl Drop for MemoryUnit {
    fn drop(&mut self) {
        if !self.finished {
            if let Some(held) = &self.held {
                debug!(
                    client_id = %held.batch.client_id,
                    "Unit dropped before commit, discarding staged effects"
                );
            }
        }
    }
}
