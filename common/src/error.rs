//! Error types for CreditLedger operations.

use crate::ClientId;
use thiserror::Error;

/// Main error type for ledger operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// No client with this id exists.
    #[error("Client not found: {0}")]
    ClientNotFound(ClientId),

    /// A debit would push the balance below the negative limit.
    #[error("Limit exceeded for client {client_id}: balance {balance}, limit {limit}, debit {amount}")]
    LimitExceeded {
        client_id: ClientId,
        balance: i64,
        limit: i64,
        amount: i64,
    },

    /// Malformed input, rejected before touching the store.
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Store I/O failure. The atomic unit was rolled back.
    #[error("Store error: {0}")]
    Store(String),

    /// Operation exceeded its deadline. The atomic unit was rolled back.
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl LedgerError {
    /// Create a validation error for a field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        LedgerError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Check if this error is a transient store failure.
    ///
    /// The engine never retries; callers may.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Store(_) | LedgerError::Timeout(_))
    }

    /// Get error code for boundary responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::ClientNotFound(_) => "CLIENT_NOT_FOUND",
            LedgerError::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            LedgerError::Validation { .. } => "VALIDATION_FAILURE",
            LedgerError::Store(_) => "STORE_FAILURE",
            LedgerError::Timeout(_) => "TIMEOUT",
        }
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
