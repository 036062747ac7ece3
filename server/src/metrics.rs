//! Metrics collection for ledger monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use creditledger_common::LedgerError;

/// Ledger service metrics.
pub struct LedgerMetrics {
    /// Total entry submissions received.
    pub submissions_total: AtomicU64,
    /// Entries committed.
    pub entries_accepted: AtomicU64,
    /// Debits rejected by the credit limit.
    pub limit_rejections: AtomicU64,
    /// Requests naming an unknown client.
    pub clients_not_found: AtomicU64,
    /// Requests failing input validation.
    pub validation_failures: AtomicU64,
    /// Store failures and timeouts.
    pub store_failures: AtomicU64,
    /// Statements served.
    pub statements_served: AtomicU64,
    /// Requests currently being processed.
    pub requests_active: AtomicU64,
}

impl LedgerMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            submissions_total: AtomicU64::new(0),
            entries_accepted: AtomicU64::new(0),
            limit_rejections: AtomicU64::new(0),
            clients_not_found: AtomicU64::new(0),
            validation_failures: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            statements_served: AtomicU64::new(0),
            requests_active: AtomicU64::new(0),
        }
    }

    /// Record a request entering the service.
    pub fn request_started(&self) {
        self.requests_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request leaving the service.
    pub fn request_finished(&self) {
        self.requests_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Increment submissions received.
    pub fn submission_received(&self) {
        self.submissions_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a committed entry.
    pub fn entry_accepted(&self) {
        self.entries_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a served statement.
    pub fn statement_served(&self) {
        self.statements_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed request under its error kind.
    pub fn record_error(&self, error: &LedgerError) {
        let counter = match error {
            LedgerError::LimitExceeded { .. } => &self.limit_rejections,
            LedgerError::ClientNotFound(_) => &self.clients_not_found,
            LedgerError::Validation { .. } => &self.validation_failures,
            LedgerError::Store(_) | LedgerError::Timeout(_) => &self.store_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submissions_total: self.submissions_total.load(Ordering::Relaxed),
            entries_accepted: self.entries_accepted.load(Ordering::Relaxed),
            limit_rejections: self.limit_rejections.load(Ordering::Relaxed),
            clients_not_found: self.clients_not_found.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            statements_served: self.statements_served.load(Ordering::Relaxed),
            requests_active: self.requests_active.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP creditledger_submissions_total Total entry submissions
# TYPE creditledger_submissions_total counter
creditledger_submissions_total {}

# HELP creditledger_entries_accepted Total entries committed
# TYPE creditledger_entries_accepted counter
creditledger_entries_accepted {}

# HELP creditledger_limit_rejections Total debits rejected by the credit limit
# TYPE creditledger_limit_rejections counter
creditledger_limit_rejections {}

# HELP creditledger_clients_not_found Total requests for unknown clients
# TYPE creditledger_clients_not_found counter
creditledger_clients_not_found {}

# HELP creditledger_validation_failures Total requests failing validation
# TYPE creditledger_validation_failures counter
creditledger_validation_failures {}

# HELP creditledger_store_failures Total store failures and timeouts
# TYPE creditledger_store_failures counter
creditledger_store_failures {}

# HELP creditledger_statements_served Total statements served
# TYPE creditledger_statements_served counter
creditledger_statements_served {}

# HELP creditledger_requests_active Requests currently in progress
# TYPE creditledger_requests_active gauge
creditledger_requests_active {}
"#,
            snapshot.submissions_total,
            snapshot.entries_accepted,
            snapshot.limit_rejections,
            snapshot.clients_not_found,
            snapshot.validation_failures,
            snapshot.store_failures,
            snapshot.statements_served,
            snapshot.requests_active,
        )
    }
}

impl Default for LedgerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub submissions_total: u64,
    pub entries_accepted: u64,
    pub limit_rejections: u64,
    pub clients_not_found: u64,
    pub validation_failures: u64,
    pub store_failures: u64,
    pub statements_served: u64,
    pub requests_active: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<LedgerMetrics>;

#[cfg(test)]
mod tests {
    use super::*;
    use creditledger_common::ClientId;

    #[test]
    fn test_metrics_increment() {
        let metrics = LedgerMetrics::new();

        metrics.submission_received();
        metrics.submission_received();
        metrics.entry_accepted();
        metrics.record_error(&LedgerError::LimitExceeded {
            client_id: ClientId::new(1).unwrap(),
            balance: -900,
            limit: 1000,
            amount: 200,
        });

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.submissions_total, 2);
        assert_eq!(snapshot.entries_accepted, 1);
        assert_eq!(snapshot.limit_rejections, 1);
        assert_eq!(snapshot.store_failures, 0);
    }

    #[test]
    fn test_timeouts_count_as_store_failures() {
        let metrics = LedgerMetrics::new();
        metrics.record_error(&LedgerError::Timeout("submit_entry".to_string()));
        metrics.record_error(&LedgerError::Store("connection reset".to_string()));
        assert_eq!(metrics.snapshot().store_failures, 2);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = LedgerMetrics::new();
        metrics.statement_served();

        let output = metrics.to_prometheus();
        assert!(output.contains("creditledger_statements_served 1"));
        assert!(output.contains("creditledger_entries_accepted 0"));
    }
}
