//! CreditLedger Common Types
//!
//! This crate contains shared types used across the CreditLedger workspace,
//! including identifiers, validated entry values, and the error taxonomy.

pub mod identifiers;
pub mod monetary;
pub mod entry;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use entry::*;
pub use error::*;
pub use time::*;
