//! Ledger entries and statements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Amount, ClientId, LedgerError, Result};

/// Maximum number of entries carried by a statement.
pub const STATEMENT_ENTRY_LIMIT: usize = 10;

/// Maximum description length in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 10;

/// Direction of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// Increases the balance.
    #[serde(rename = "c")]
    Credit,
    /// Decreases the balance.
    #[serde(rename = "d")]
    Debit,
}

impl EntryKind {
    /// Signed effect of `amount` on the balance.
    pub fn signed(&self, amount: Amount) -> i64 {
        match self {
            EntryKind::Credit => amount.get(),
            EntryKind::Debit => -amount.get(),
        }
    }

    /// Wire code (`c` or `d`), also used as the stored column value.
    pub fn code(&self) -> &'static str {
        match self {
            EntryKind::Credit => "c",
            EntryKind::Debit => "d",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for EntryKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "c" => Ok(EntryKind::Credit),
            "d" => Ok(EntryKind::Debit),
            other => Err(LedgerError::validation(
                "type",
                format!("type must be 'c' or 'd', got '{other}'"),
            )),
        }
    }
}

/// Entry description, 1 to 10 characters. Never trimmed or truncated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Description(String);

impl Description {
    /// Create a description, rejecting empty or over-long text.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let chars = text.chars().count();
        if chars == 0 || chars > MAX_DESCRIPTION_CHARS {
            return Err(LedgerError::validation(
                "description",
                format!(
                    "description must have 1 to {MAX_DESCRIPTION_CHARS} characters, got {chars}"
                ),
            ));
        }
        Ok(Self(text))
    }

    /// Get the description text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Description {
    type Error = LedgerError;

    fn try_from(text: String) -> Result<Self> {
        Self::new(text)
    }
}

impl From<Description> for String {
    fn from(d: Description) -> Self {
        d.0
    }
}

/// A structurally valid submission, ready for the transaction engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub amount: Amount,
    pub kind: EntryKind,
    pub description: Description,
}

impl EntryDraft {
    /// Assemble a draft from already-validated parts.
    pub fn new(amount: Amount, kind: EntryKind, description: Description) -> Self {
        Self {
            amount,
            kind,
            description,
        }
    }

    /// Validate raw request values into a draft.
    pub fn parse(amount: i64, kind: &str, description: impl Into<String>) -> Result<Self> {
        Ok(Self {
            amount: Amount::new(amount)?,
            kind: kind.parse()?,
            description: Description::new(description)?,
        })
    }

    /// Credit draft.
    pub fn credit(amount: Amount, description: Description) -> Self {
        Self::new(amount, EntryKind::Credit, description)
    }

    /// Debit draft.
    pub fn debit(amount: Amount, description: Description) -> Self {
        Self::new(amount, EntryKind::Debit, description)
    }

    /// Signed effect on the balance.
    pub fn delta(&self) -> i64 {
        self.kind.signed(self.amount)
    }
}

/// A committed, immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Owning client.
    pub client_id: ClientId,
    /// Amount in minor units.
    pub amount: Amount,
    /// Credit or debit.
    pub kind: EntryKind,
    /// Free-text description.
    pub description: Description,
    /// Commit timestamp assigned by the store.
    pub recorded_at: DateTime<Utc>,
}

impl Entry {
    /// Signed effect on the balance.
    pub fn signed_amount(&self) -> i64 {
        self.kind.signed(self.amount)
    }
}

/// Balance portion of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    /// Committed balance at read time.
    pub total: i64,
    /// Credit limit.
    pub limit: i64,
    /// Wall-clock time the statement was assembled.
    pub as_of: DateTime<Utc>,
}

/// Point-in-time statement: balance plus the most recent entries.
///
/// The balance and the entries come from two separate committed reads. Under
/// concurrent writes they may reflect slightly different moments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub balance: BalanceSnapshot,
    /// Most recent first, at most [`STATEMENT_ENTRY_LIMIT`].
    pub entries: Vec<Entry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_effect() {
        let amount = Amount::new(250).unwrap();
        assert_eq!(EntryKind::Credit.signed(amount), 250);
        assert_eq!(EntryKind::Debit.signed(amount), -250);
    }

    #[test]
    fn test_kind_wire_format() {
        assert_eq!(serde_json::to_string(&EntryKind::Credit).unwrap(), "\"c\"");
        assert_eq!(serde_json::from_str::<EntryKind>("\"d\"").unwrap(), EntryKind::Debit);
        assert!(serde_json::from_str::<EntryKind>("\"x\"").is_err());
        assert!("credit".parse::<EntryKind>().is_err());
    }

    #[test]
    fn test_description_bounds() {
        assert!(Description::new("").is_err());
        assert!(Description::new("a").is_ok());
        assert!(Description::new("0123456789").is_ok());
        assert!(Description::new("0123456789X").is_err());
        // Counted in characters, not bytes.
        assert!(Description::new("éééééééééé").is_ok());
    }

    #[test]
    fn test_description_not_trimmed() {
        let d = Description::new("  pad  ").unwrap();
        assert_eq!(d.as_str(), "  pad  ");
    }

    #[test]
    fn test_draft_parse() {
        let draft = EntryDraft::parse(500, "d", "rent").unwrap();
        assert_eq!(draft.delta(), -500);

        let err = EntryDraft::parse(0, "c", "zero").unwrap_err();
        assert!(matches!(err, LedgerError::Validation { field: Some(ref f), .. } if f == "value"));

        let err = EntryDraft::parse(10, "x", "bad").unwrap_err();
        assert!(matches!(err, LedgerError::Validation { field: Some(ref f), .. } if f == "type"));
    }
}
