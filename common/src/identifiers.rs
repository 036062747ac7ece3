//! Identifier types for ledger entities.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{LedgerError, Result};

/// Identifier of a client ledger. Always a positive integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct ClientId(i32);

impl ClientId {
    /// Create a client ID, rejecting zero and negative values.
    pub fn new(id: i32) -> Result<Self> {
        if id <= 0 {
            return Err(LedgerError::validation(
                "client_id",
                format!("client id must be positive, got {id}"),
            ));
        }
        Ok(Self(id))
    }

    /// Get the raw integer value.
    pub fn get(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i32> for ClientId {
    type Error = LedgerError;

    fn try_from(id: i32) -> Result<Self> {
        Self::new(id)
    }
}

impl From<ClientId> for i32 {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_positive() {
        assert_eq!(ClientId::new(7).unwrap().get(), 7);
        assert!(ClientId::new(0).is_err());
        assert!(ClientId::new(-3).is_err());
    }

    #[test]
    fn test_client_id_serde() {
        let id: ClientId = serde_json::from_str("42").unwrap();
        assert_eq!(id.get(), 42);
        assert!(serde_json::from_str::<ClientId>("0").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
    }
}
