//! Simulation metrics.

use std::collections::VecDeque;

/// Simulation metrics.
#[derive(Debug, Clone)]
pub struct SimulationMetrics {
    /// Total operations attempted.
    pub total_operations: u64,
    /// Entries committed.
    pub accepted_entries: u64,
    /// Debits rejected by the credit limit.
    pub limit_rejections: u64,
    /// Statements read.
    pub statements: u64,
    /// Any other failure (store errors, timeouts).
    pub failures: u64,
    /// Latency samples (µs).
    latency_samples: VecDeque<u64>,
    /// Maximum samples to keep.
    max_samples: usize,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            total_operations: 0,
            accepted_entries: 0,
            limit_rejections: 0,
            statements: 0,
            failures: 0,
            latency_samples: VecDeque::with_capacity(10000),
            max_samples: 10000,
        }
    }

    fn sample(&mut self, latency_us: u64) {
        self.total_operations += 1;
        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency_us);
    }

    /// Record a committed entry.
    pub fn record_accepted(&mut self, latency_us: u64) {
        self.sample(latency_us);
        self.accepted_entries += 1;
    }

    /// Record a limit rejection.
    pub fn record_rejected(&mut self, latency_us: u64) {
        self.sample(latency_us);
        self.limit_rejections += 1;
    }

    /// Record a statement read.
    pub fn record_statement(&mut self, latency_us: u64) {
        self.sample(latency_us);
        self.statements += 1;
    }

    /// Record a failed operation.
    pub fn record_failure(&mut self) {
        self.total_operations += 1;
        self.failures += 1;
    }

    /// Fold another worker's metrics into this one.
    pub fn merge(&mut self, other: SimulationMetrics) {
        self.total_operations += other.total_operations;
        self.accepted_entries += other.accepted_entries;
        self.limit_rejections += other.limit_rejections;
        self.statements += other.statements;
        self.failures += other.failures;
        for sample in other.latency_samples {
            if self.latency_samples.len() >= self.max_samples {
                self.latency_samples.pop_front();
            }
            self.latency_samples.push_back(sample);
        }
    }

    /// Get average latency in µs.
    pub fn average_latency_us(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    /// Get p50 latency.
    pub fn p50_latency_us(&self) -> u64 {
        self.percentile_latency(50)
    }

    /// Get p99 latency.
    pub fn p99_latency_us(&self) -> u64 {
        self.percentile_latency(99)
    }

    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Share of entry submissions that were committed.
    pub fn acceptance_rate(&self) -> f64 {
        let submissions = self.accepted_entries + self.limit_rejections;
        if submissions == 0 {
            return 0.0;
        }

        self.accepted_entries as f64 / submissions as f64
    }

    /// Operations per second.
    pub fn throughput(&self, elapsed_secs: f64) -> f64 {
        if elapsed_secs <= 0.0 {
            return 0.0;
        }

        self.total_operations as f64 / elapsed_secs
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}
