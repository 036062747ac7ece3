//! Ledger service: lifecycle, metrics and input validation around the engine.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{info, instrument, warn};

use creditledger_common::{constants, ClientBalance, ClientId, EntryDraft, LedgerError, Statement};
use creditledger_ledger::TransactionEngine;

use crate::metrics::{LedgerMetrics, SharedMetrics};
use crate::state::ServiceState;

/// Errors surfaced by the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service is not in a state that accepts requests.
    #[error("Service unavailable: {0:?}")]
    Unavailable(ServiceState),

    /// The ledger refused or failed the operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Decrements the active-request gauge when dropped.
struct InFlight<'a>(&'a LedgerMetrics);

impl<'a> InFlight<'a> {
    fn enter(metrics: &'a LedgerMetrics) -> Self {
        metrics.request_started();
        Self(metrics)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.request_finished();
    }
}

/// The ledger service shared by all request handlers.
pub struct LedgerService {
    /// Transaction engine over the configured store.
    engine: TransactionEngine,
    /// Current lifecycle state.
    state: RwLock<ServiceState>,
    /// Service metrics.
    metrics: SharedMetrics,
    /// Bound on draining in-flight requests at shutdown.
    shutdown_grace: Duration,
}

impl LedgerService {
    /// Create a new service instance in the `Starting` state.
    pub fn new(engine: TransactionEngine) -> Self {
        Self {
            engine,
            state: RwLock::new(ServiceState::Starting),
            metrics: Arc::new(LedgerMetrics::new()),
            shutdown_grace: constants::shutdown_grace(),
        }
    }

    /// Override the shutdown drain bound.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Start accepting requests.
    pub fn start(&self) {
        *self.state.write() = ServiceState::Running;
        info!("Ledger service running");
    }

    /// Stop gracefully: refuse new requests, drain in-flight ones, close the store.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        {
            let mut state = self.state.write();
            if matches!(*state, ServiceState::ShuttingDown | ServiceState::Stopped) {
                return;
            }
            *state = ServiceState::ShuttingDown;
        }
        info!("Stopping ledger service");

        let deadline = tokio::time::Instant::now() + self.shutdown_grace;
        while self.metrics.snapshot().requests_active > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    active = self.metrics.snapshot().requests_active,
                    "Shutdown grace elapsed with requests in flight"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        self.engine.store().close().await;
        *self.state.write() = ServiceState::Stopped;
        info!("Ledger service stopped");
    }

    /// Get current state.
    pub fn state(&self) -> ServiceState {
        *self.state.read()
    }

    /// Check if accepting new requests.
    pub fn is_accepting_requests(&self) -> bool {
        self.state().accepts_requests()
    }

    /// Service metrics.
    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Validate raw request fields and record one entry.
    pub async fn submit_entry(
        &self,
        client_id: i32,
        value: i64,
        kind: &str,
        description: String,
    ) -> Result<ClientBalance, ServiceError> {
        let _in_flight = self.admit()?;
        self.metrics.submission_received();

        let result = async {
            let client_id = ClientId::new(client_id)?;
            let draft = EntryDraft::parse(value, kind, description)?;
            self.engine.submit_entry(client_id, &draft).await
        }
        .await;

        match &result {
            Ok(_) => self.metrics.entry_accepted(),
            Err(e) => self.metrics.record_error(e),
        }
        Ok(result?)
    }

    /// Fetch the statement for a client.
    pub async fn statement(&self, client_id: i32) -> Result<Statement, ServiceError> {
        let _in_flight = self.admit()?;

        let result = async {
            let client_id = ClientId::new(client_id)?;
            self.engine.get_statement(client_id).await
        }
        .await;

        match &result {
            Ok(_) => self.metrics.statement_served(),
            Err(e) => self.metrics.record_error(e),
        }
        Ok(result?)
    }

    /// Count a request that failed before reaching the service, such as a
    /// body that does not decode.
    pub fn record_rejected(&self, error: &LedgerError) {
        self.metrics.record_error(error);
    }

    /// Count an entry submission whose request never decoded. It still counts
    /// toward `submissions_total`.
    pub fn record_rejected_submission(&self, error: &LedgerError) {
        self.metrics.submission_received();
        self.metrics.record_error(error);
    }

    fn admit(&self) -> Result<InFlight<'_>, ServiceError> {
        // Registered before the state check so that `stop` never misses it.
        let in_flight = InFlight::enter(&self.metrics);
        let state = self.state();
        if !state.accepts_requests() {
            return Err(ServiceError::Unavailable(state));
        }
        Ok(in_flight)
    }
}
