//! Server configuration.

use std::time::Duration;

use creditledger_common::{constants, ClientId};
use creditledger_ledger::{EngineConfig, PgStoreSettings};

/// Which ledger store backs the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// PostgreSQL via `DATABASE_URL`.
    Postgres,
    /// Embedded in-memory store, seeded with the default clients.
    Memory,
}

impl StoreBackend {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Some(StoreBackend::Postgres),
            "memory" => Some(StoreBackend::Memory),
            _ => None,
        }
    }
}

/// Database pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connections kept open.
    pub min_connections: u32,
    /// Upper bound on open connections.
    pub max_connections: u32,
    /// Bound on waiting for a pooled connection.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            acquire_timeout: constants::acquire_timeout(),
        }
    }
}

/// Main server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    /// Store backend.
    pub store: StoreBackend,
    /// Database URL, required for the Postgres backend.
    pub database_url: Option<String>,
    /// Pool configuration.
    pub pool: PoolConfig,
    /// Bound on each engine operation.
    pub operation_timeout: Duration,
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8080,
            store: StoreBackend::Postgres,
            database_url: None,
            pool: PoolConfig::default(),
            operation_timeout: constants::operation_timeout(),
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Ok(port) = std::env::var("LISTEN_PORT") {
            if let Ok(port) = port.parse() {
                config.listen_port = port;
            }
        }

        if let Ok(backend) = std::env::var("LEDGER_STORE") {
            if let Some(backend) = StoreBackend::parse(&backend) {
                config.store = backend;
            }
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = Some(url);
        }

        if let Ok(n) = std::env::var("DB_POOL_MIN") {
            if let Ok(n) = n.parse() {
                config.pool.min_connections = n;
            }
        }

        if let Ok(n) = std::env::var("DB_POOL_MAX") {
            if let Ok(n) = n.parse() {
                config.pool.max_connections = n;
            }
        }

        if let Ok(ms) = std::env::var("DB_ACQUIRE_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.pool.acquire_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(ms) = std::env::var("OPERATION_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.operation_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_port == 0 {
            return Err("Listen port cannot be 0".to_string());
        }

        if self.store == StoreBackend::Postgres
            && self.database_url.as_deref().map_or(true, str::is_empty)
        {
            return Err("DATABASE_URL is required for the postgres store".to_string());
        }

        if self.pool.max_connections == 0 {
            return Err("Pool max connections cannot be 0".to_string());
        }

        if self.pool.min_connections > self.pool.max_connections {
            return Err("Pool min connections cannot exceed max connections".to_string());
        }

        if self.operation_timeout.is_zero() {
            return Err("Operation timeout cannot be zero".to_string());
        }

        Ok(())
    }

    /// Engine settings.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            operation_timeout: self.operation_timeout,
        }
    }

    /// Postgres pool settings. The server-side statement timeout matches the
    /// engine's operation timeout.
    pub fn pg_settings(&self) -> PgStoreSettings {
        PgStoreSettings {
            database_url: self.database_url.clone().unwrap_or_default(),
            min_connections: self.pool.min_connections,
            max_connections: self.pool.max_connections,
            acquire_timeout: self.pool.acquire_timeout,
            statement_timeout: self.operation_timeout,
        }
    }
}

/// Clients seeded into the in-memory store, matching the seed migration.
pub fn default_clients() -> Vec<(ClientId, i64)> {
    [(1, 100_000), (2, 80_000), (3, 1_000_000), (4, 10_000_000), (5, 500_000)]
        .into_iter()
        .filter_map(|(id, limit)| ClientId::new(id).ok().map(|id| (id, limit)))
        .collect()
}
