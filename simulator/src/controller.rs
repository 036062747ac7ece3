//! Simulation controller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use creditledger_common::{ClientId, EntryDraft, LedgerError};
use creditledger_ledger::{EngineConfig, MemoryStore, TransactionEngine};

use crate::metrics::SimulationMetrics;
use crate::scenario::Scenario;

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Number of clients.
    pub clients: usize,
    /// Credit limit of every client.
    pub limit: i64,
    /// Concurrent workers.
    pub workers: usize,
    /// Operations per worker.
    pub operations: usize,
    /// Largest entry amount.
    pub max_amount: i64,
    /// Random seed for reproducibility.
    pub seed: Option<u64>,
}

/// Outcome of a run.
#[derive(Debug)]
pub struct SimulationReport {
    /// Aggregated metrics across workers.
    pub metrics: SimulationMetrics,
    /// Wall time of the load phase.
    pub elapsed: Duration,
    /// Clients whose balance disagrees with their entries or sits below the floor.
    pub inconsistent_clients: Vec<ClientId>,
}

/// Controls the simulation.
pub struct SimulationController {
    config: SimulationConfig,
    engine: Arc<TransactionEngine>,
    clients: Vec<ClientId>,
    seed: u64,
}

impl SimulationController {
    /// Create a controller over a fresh in-memory ledger.
    pub fn new(config: SimulationConfig) -> anyhow::Result<Self> {
        if config.clients == 0 || config.workers == 0 {
            anyhow::bail!("Simulation needs at least one client and one worker");
        }
        if config.max_amount <= 0 {
            anyhow::bail!("Max amount must be positive");
        }

        let clients = (1..=config.clients)
            .map(|i| ClientId::new(i32::try_from(i)?).map_err(anyhow::Error::from))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let store = MemoryStore::with_clients(clients.iter().map(|&id| (id, config.limit)))?;
        let engine = TransactionEngine::new(Arc::new(store), EngineConfig::default());

        let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
        info!(
            clients = config.clients,
            limit = config.limit,
            seed,
            "Initialized in-memory ledger"
        );

        Ok(Self {
            config,
            engine: Arc::new(engine),
            clients,
            seed,
        })
    }

    /// Run the scenario to completion, then verify every client.
    pub async fn run(&self, scenario: &Scenario) -> anyhow::Result<SimulationReport> {
        info!(
            scenario = %scenario.name,
            workers = self.config.workers,
            operations = self.config.operations,
            "{}",
            scenario.description
        );

        let start = Instant::now();
        let handles: Vec<_> = (0..self.config.workers)
            .map(|worker| {
                let engine = self.engine.clone();
                let clients = self.clients.clone();
                let scenario = scenario.clone();
                let rng = StdRng::seed_from_u64(self.seed.wrapping_add(worker as u64));
                let operations = self.config.operations;
                let max_amount = self.config.max_amount;
                tokio::spawn(async move {
                    run_worker(engine, clients, scenario, rng, operations, max_amount).await
                })
            })
            .collect();

        let mut metrics = SimulationMetrics::new();
        for result in futures::future::join_all(handles).await {
            metrics.merge(result?);
        }
        let elapsed = start.elapsed();

        let mut inconsistent_clients = Vec::new();
        for &client_id in &self.clients {
            let audit = self.engine.verify_client(client_id).await?;
            if !audit.is_consistent() {
                inconsistent_clients.push(client_id);
            }
        }

        Ok(SimulationReport {
            metrics,
            elapsed,
            inconsistent_clients,
        })
    }
}

async fn run_worker(
    engine: Arc<TransactionEngine>,
    clients: Vec<ClientId>,
    scenario: Scenario,
    mut rng: StdRng,
    operations: usize,
    max_amount: i64,
) -> SimulationMetrics {
    let mut metrics = SimulationMetrics::new();

    for _ in 0..operations {
        let client_id = if scenario.hot_client {
            clients[0]
        } else {
            clients[rng.gen_range(0..clients.len())]
        };

        if rng.gen_bool(scenario.read_ratio) {
            let started = Instant::now();
            match engine.get_statement(client_id).await {
                Ok(_) => metrics.record_statement(micros(started)),
                Err(e) => {
                    warn!(error = %e, "Statement failed");
                    metrics.record_failure();
                }
            }
            continue;
        }

        let amount = rng.gen_range(1..=max_amount);
        let kind = if rng.gen_bool(scenario.debit_ratio) { "d" } else { "c" };
        let draft = match EntryDraft::parse(amount, kind, "sim") {
            Ok(draft) => draft,
            Err(e) => {
                warn!(error = %e, "Invalid generated entry");
                metrics.record_failure();
                continue;
            }
        };

        let started = Instant::now();
        match engine.submit_entry(client_id, &draft).await {
            Ok(_) => metrics.record_accepted(micros(started)),
            Err(LedgerError::LimitExceeded { .. }) => metrics.record_rejected(micros(started)),
            Err(e) => {
                debug!(error = %e, "Submission failed");
                metrics.record_failure();
            }
        }
    }

    metrics
}

fn micros(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> SimulationConfig {
        SimulationConfig {
            clients: 3,
            limit: 5_000,
            workers: 6,
            operations: 100,
            max_amount: 1_000,
            seed: Some(seed),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_hot_client_stays_consistent() {
        let controller = SimulationController::new(config(7)).unwrap();
        let report = controller.run(&Scenario::load("hot-client").unwrap()).await.unwrap();

        assert_eq!(report.metrics.total_operations, 600);
        assert_eq!(report.metrics.failures, 0);
        assert!(report.metrics.limit_rejections > 0);
        assert!(report.inconsistent_clients.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_balanced_run_stays_consistent() {
        let controller = SimulationController::new(config(11)).unwrap();
        let report = controller.run(&Scenario::balanced()).await.unwrap();

        assert_eq!(report.metrics.total_operations, 600);
        assert!(report.inconsistent_clients.is_empty());
    }

    #[test]
    fn test_rejects_empty_simulation() {
        let mut config = config(1);
        config.workers = 0;
        assert!(SimulationController::new(config).is_err());
    }
}
