//! CreditLedger Server
//!
//! HTTP front end for the ledger engine. The [`LedgerService`] owns the
//! engine, tracks the server lifecycle and counts outcomes; [`http::router`]
//! maps the wire format onto it.

pub mod config;
pub mod http;
pub mod metrics;
pub mod service;
pub mod state;

pub use config::{ServerConfig, StoreBackend};
pub use service::{LedgerService, ServiceError};
pub use state::ServiceState;
