//! CreditLedger Ledger Engine
//!
//! Per-client running balances under a credit limit. The [`TransactionEngine`]
//! wraps every submission in an atomic unit that locks the client, checks the
//! limit, updates the balance and appends the entry, or does none of it.

pub mod engine;
pub mod account;
pub mod journal;
pub mod store;

pub use engine::{EngineConfig, TransactionEngine};
pub use account::ClientAccount;
pub use journal::JournalBatch;
pub use store::{AtomicUnit, ClientAudit, LedgerStore, MemoryStore, PgStoreSettings, PostgresStore};
