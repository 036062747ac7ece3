//! Simulation scenarios.

/// A named workload shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Probability that an operation is a debit.
    pub debit_ratio: f64,
    /// Probability that an operation is a statement read instead of a write.
    pub read_ratio: f64,
    /// Send every operation to the first client.
    pub hot_client: bool,
}

impl Scenario {
    /// Load a scenario by name.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "balanced" => Ok(Self::balanced()),
            "debit-heavy" => Ok(Self::debit_heavy()),
            "hot-client" => Ok(Self::hot_client()),
            "read-mostly" => Ok(Self::read_mostly()),
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    /// Even mix of credits and debits across all clients.
    pub fn balanced() -> Self {
        Self {
            name: "balanced".to_string(),
            description: "Even credit/debit mix spread across clients".to_string(),
            debit_ratio: 0.5,
            read_ratio: 0.1,
            hot_client: false,
        }
    }

    /// Mostly debits, so balances pile up against their limits.
    fn debit_heavy() -> Self {
        Self {
            name: "debit-heavy".to_string(),
            description: "Debits dominate and hit the credit limit".to_string(),
            debit_ratio: 0.9,
            read_ratio: 0.05,
            hot_client: false,
        }
    }

    /// All workers contend on one client lock.
    fn hot_client() -> Self {
        Self {
            name: "hot-client".to_string(),
            description: "Every worker writes to the same client".to_string(),
            debit_ratio: 0.7,
            read_ratio: 0.1,
            hot_client: true,
        }
    }

    /// Statement reads interleaved with a trickle of writes.
    fn read_mostly() -> Self {
        Self {
            name: "read-mostly".to_string(),
            description: "Statement reads dominate".to_string(),
            debit_ratio: 0.5,
            read_ratio: 0.8,
            hot_client: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_known_scenarios() {
        for name in ["balanced", "debit-heavy", "hot-client", "read-mostly"] {
            let scenario = Scenario::load(name).unwrap();
            assert_eq!(scenario.name, name);
            assert!((0.0..=1.0).contains(&scenario.debit_ratio));
            assert!((0.0..=1.0).contains(&scenario.read_ratio));
        }
    }

    #[test]
    fn test_unknown_scenario() {
        assert!(Scenario::load("meltdown").is_err());
    }
}
