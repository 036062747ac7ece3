//! Committed per-client state held by the embedded store.

use chrono::{DateTime, Utc};

use creditledger_common::{ClientBalance, ClientId, Entry, LedgerError, Result};

use crate::journal::JournalBatch;

/// A client's limit, running balance, and entry log.
#[derive(Debug, Clone)]
pub struct ClientAccount {
    /// Client identifier.
    pub id: ClientId,
    /// Credit limit.
    pub limit: i64,
    /// Running balance, always the sum of `entries`.
    pub balance: i64,
    /// Append-only log in commit order.
    entries: Vec<Entry>,
}

impl ClientAccount {
    /// Open an account with a zero balance.
    pub fn new(id: ClientId, limit: i64) -> Result<Self> {
        if limit < 0 {
            return Err(LedgerError::validation(
                "limit",
                format!("limit must be non-negative, got {limit}"),
            ));
        }
        Ok(Self {
            id,
            limit,
            balance: 0,
            entries: Vec::new(),
        })
    }

    /// Current limit and balance.
    pub fn snapshot(&self) -> ClientBalance {
        ClientBalance::new(self.limit, self.balance)
    }

    /// Up to `n` entries, most recent first.
    pub fn recent(&self, n: usize) -> Vec<Entry> {
        self.entries.iter().rev().take(n).cloned().collect()
    }

    /// Sum of signed effects over the whole log.
    pub fn entries_sum(&self) -> i64 {
        self.entries.iter().map(Entry::signed_amount).sum()
    }

    /// Number of committed entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Publish a staged batch. Either the balance and the log both change or
    /// neither does.
    ///
    /// `recorded_at` is clamped to the last entry's timestamp so that commit
    /// order and timestamp order agree even if the wall clock steps back.
    pub fn apply(&mut self, batch: JournalBatch, recorded_at: DateTime<Utc>) -> Result<i64> {
        if batch.client_id != self.id {
            return Err(LedgerError::Store(format!(
                "batch for client {} applied to client {}",
                batch.client_id, self.id
            )));
        }
        if !batch.is_balanced() {
            return Err(LedgerError::Store(format!(
                "unbalanced batch for client {}: delta {} vs entries {}",
                self.id,
                batch.delta,
                batch.entries_effect()
            )));
        }
        let balance = self
            .balance
            .checked_add(batch.delta)
            .ok_or_else(|| LedgerError::Store("balance overflow".to_string()))?;

        let recorded_at = match self.entries.last() {
            Some(last) if last.recorded_at > recorded_at => last.recorded_at,
            _ => recorded_at,
        };

        self.entries.extend(batch.into_entries(recorded_at));
        self.balance = balance;
        Ok(balance)
    }
}
