//! Monetary types. All values are integers in minor currency units (cents).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{LedgerError, Result};

/// A strictly positive entry amount in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    /// Create an amount, rejecting zero and negative values.
    pub fn new(value: i64) -> Result<Self> {
        if value <= 0 {
            return Err(LedgerError::validation(
                "value",
                format!("value must be a positive integer, got {value}"),
            ));
        }
        Ok(Self(value))
    }

    /// Get the raw value.
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Amount {
    type Error = LedgerError;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// A client's credit limit and current balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientBalance {
    /// Maximum negative balance the client may reach.
    pub limit: i64,
    /// Current running balance.
    pub balance: i64,
}

impl ClientBalance {
    /// Create a new limit/balance pair.
    pub fn new(limit: i64, balance: i64) -> Self {
        Self { limit, balance }
    }

    /// Lowest balance the client may hold.
    pub fn floor(&self) -> i64 {
        -self.limit
    }

    /// Balance after applying `delta`, or `None` on overflow.
    pub fn projected(&self, delta: i64) -> Option<i64> {
        self.balance.checked_add(delta)
    }

    /// Check whether applying `delta` keeps the balance at or above the floor.
    pub fn admits(&self, delta: i64) -> bool {
        self.projected(delta)
            .map(|b| b >= self.floor())
            .unwrap_or(false)
    }
}
