//! Staged effects of an atomic unit, published together at commit.

use chrono::{DateTime, Utc};

use creditledger_common::{ClientId, Entry, EntryDraft, LedgerError, Result};

/// Balance delta and entries staged by one atomic unit.
#[derive(Debug, Clone)]
pub struct JournalBatch {
    /// Client the batch belongs to.
    pub client_id: ClientId,
    /// Net change applied to the running balance.
    pub delta: i64,
    /// Entries to append, in submission order.
    pub drafts: Vec<EntryDraft>,
}

impl JournalBatch {
    /// Create an empty batch.
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            delta: 0,
            drafts: Vec::new(),
        }
    }

    /// Accumulate a balance change.
    pub fn add_delta(&mut self, delta: i64) -> Result<()> {
        self.delta = self
            .delta
            .checked_add(delta)
            .ok_or_else(|| LedgerError::Store("staged delta overflow".to_string()))?;
        Ok(())
    }

    /// Stage an entry.
    pub fn add_entry(&mut self, draft: EntryDraft) {
        self.drafts.push(draft);
    }

    /// Whether nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.delta == 0 && self.drafts.is_empty()
    }

    /// Sum of the signed effects of the staged entries.
    pub fn entries_effect(&self) -> i64 {
        self.drafts.iter().map(EntryDraft::delta).sum()
    }

    /// The staged balance change matches the staged entries exactly.
    pub fn is_balanced(&self) -> bool {
        self.delta == self.entries_effect()
    }

    /// Turn staged drafts into committed entries stamped with `recorded_at`.
    pub fn into_entries(self, recorded_at: DateTime<Utc>) -> Vec<Entry> {
        let client_id = self.client_id;
        self.drafts
            .into_iter()
            .map(|d| Entry {
                client_id,
                amount: d.amount,
                kind: d.kind,
                description: d.description,
                recorded_at,
            })
            .collect()
    }
}
