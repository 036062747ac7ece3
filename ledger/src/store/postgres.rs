//! PostgreSQL-backed ledger store.
//!
//! ## Locking
//!
//! `lock_and_read_client` issues `SELECT ... FOR UPDATE` inside a
//! `sqlx::Transaction`, so the row lock is held until the transaction commits
//! or rolls back. Dropping an uncommitted transaction rolls it back when the
//! connection returns to the pool.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Code | LedgerError |
//! |------------|-----------------|-------------|
//! | PoolTimedOut | N/A | `Timeout` |
//! | Database (query canceled) | `57014` | `Timeout` |
//! | Database (lock not available) | `55P03` | `Timeout` |
//! | anything else | any | `Store` |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info, instrument};

use creditledger_common::{
    constants, Amount, ClientBalance, ClientId, Description, Entry, EntryDraft, EntryKind,
    LedgerError, Result,
};

use crate::store::{AtomicUnit, ClientAudit, LedgerStore};

/// Connection pool settings.
#[derive(Debug, Clone)]
pub struct PgStoreSettings {
    /// Database URL.
    pub database_url: String,
    /// Connections kept open.
    pub min_connections: u32,
    /// Upper bound on open connections.
    pub max_connections: u32,
    /// Bound on waiting for a free connection.
    pub acquire_timeout: Duration,
    /// Server-side `statement_timeout` applied to every connection.
    pub statement_timeout: Duration,
}

impl Default for PgStoreSettings {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/creditledger".to_string(),
            min_connections: 1,
            max_connections: 10,
            acquire_timeout: constants::acquire_timeout(),
            statement_timeout: constants::operation_timeout(),
        }
    }
}

/// Store backed by a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Open the pool.
    #[instrument(skip(settings), fields(max_connections = settings.max_connections))]
    pub async fn connect(settings: &PgStoreSettings) -> Result<Self> {
        let options: PgConnectOptions = settings
            .database_url
            .parse()
            .map_err(|e| map_sqlx_error("parse database url", e))?;
        let options = options.options([(
            "statement_timeout",
            settings.statement_timeout.as_millis().to_string(),
        )]);

        let pool = PgPoolOptions::new()
            .min_connections(settings.min_connections)
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        info!("Postgres pool opened");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply schema and seed migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Store(format!("migrate: {e}")))?;
        info!("Migrations applied");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn AtomicUnit>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(Box::new(PgUnit { tx, locked: None }))
    }

    async fn read_client(&self, client_id: ClientId) -> Result<Option<ClientBalance>> {
        let row = sqlx::query("SELECT limit_cents, balance_cents FROM clients WHERE id = $1")
            .bind(client_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("read_client", e))?;

        row.map(|r| client_balance_from_row(&r)).transpose()
    }

    async fn recent_entries(&self, client_id: ClientId, limit: usize) -> Result<Vec<Entry>> {
        let rows = sqlx::query(
            r#"
            SELECT amount_cents, kind, description, recorded_at
            FROM entries
            WHERE client_id = $1
            ORDER BY recorded_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(client_id.get())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("recent_entries", e))?;

        rows.iter().map(|r| entry_from_row(client_id, r)).collect()
    }

    async fn audit_client(&self, client_id: ClientId) -> Result<Option<ClientAudit>> {
        // One statement, one snapshot.
        let row = sqlx::query(
            r#"
            SELECT
                c.limit_cents,
                c.balance_cents,
                COALESCE(SUM(CASE WHEN e.kind = 'c' THEN e.amount_cents ELSE -e.amount_cents END), 0)::BIGINT AS entries_sum,
                COUNT(e.id) AS entry_count
            FROM clients c
            LEFT JOIN entries e ON e.client_id = c.id
            WHERE c.id = $1
            GROUP BY c.id, c.limit_cents, c.balance_cents
            "#,
        )
        .bind(client_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("audit_client", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(ClientAudit {
            client_id,
            balance: client_balance_from_row(&row)?,
            entries_sum: row
                .try_get("entries_sum")
                .map_err(|e| map_sqlx_error("audit_client", e))?,
            entry_count: row
                .try_get("entry_count")
                .map_err(|e| map_sqlx_error("audit_client", e))?,
        }))
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Postgres pool closed");
    }
}

/// Atomic unit over one PostgreSQL transaction.
pub struct PgUnit {
    tx: Transaction<'static, Postgres>,
    locked: Option<ClientId>,
}

impl PgUnit {
    fn ensure_locked(&self, client_id: ClientId) -> Result<()> {
        if self.locked == Some(client_id) {
            Ok(())
        } else {
            Err(LedgerError::Store(format!(
                "client {client_id} is not locked by this unit"
            )))
        }
    }
}

#[async_trait]
impl AtomicUnit for PgUnit {
    async fn lock_and_read_client(&mut self, client_id: ClientId) -> Result<Option<ClientBalance>> {
        if let Some(held) = self.locked {
            if held != client_id {
                return Err(LedgerError::Store(format!("unit already holds client {held}")));
            }
        }

        let row = sqlx::query(
            "SELECT limit_cents, balance_cents FROM clients WHERE id = $1 FOR UPDATE",
        )
        .bind(client_id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_and_read_client", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        self.locked = Some(client_id);
        client_balance_from_row(&row).map(Some)
    }

    async fn apply_delta(&mut self, client_id: ClientId, delta: i64) -> Result<i64> {
        self.ensure_locked(client_id)?;
        sqlx::query_scalar::<_, i64>(
            "UPDATE clients SET balance_cents = balance_cents + $1 WHERE id = $2 RETURNING balance_cents",
        )
        .bind(delta)
        .bind(client_id.get())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("apply_delta", e))
    }

    async fn append_entry(&mut self, client_id: ClientId, draft: &EntryDraft) -> Result<()> {
        self.ensure_locked(client_id)?;
        // clock_timestamp(), not now(): now() is frozen at transaction start.
        sqlx::query(
            r#"
            INSERT INTO entries (client_id, amount_cents, kind, description, recorded_at)
            VALUES ($1, $2, $3, $4, clock_timestamp())
            "#,
        )
        .bind(client_id.get())
        .bind(draft.amount.get())
        .bind(draft.kind.code())
        .bind(draft.description.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_entry", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let locked = self.locked;
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;
        debug!(client_id = ?locked, "Unit committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let locked = self.locked;
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))?;
        debug!(client_id = ?locked, "Unit rolled back");
        Ok(())
    }
}

fn client_balance_from_row(row: &PgRow) -> Result<ClientBalance> {
    let limit: i64 = row
        .try_get("limit_cents")
        .map_err(|e| map_sqlx_error("decode client", e))?;
    let balance: i64 = row
        .try_get("balance_cents")
        .map_err(|e| map_sqlx_error("decode client", e))?;
    Ok(ClientBalance::new(limit, balance))
}

fn entry_from_row(client_id: ClientId, row: &PgRow) -> Result<Entry> {
    let decode = |e| map_sqlx_error("decode entry", e);
    let amount: i64 = row.try_get("amount_cents").map_err(decode)?;
    let kind: String = row.try_get("kind").map_err(decode)?;
    let description: String = row.try_get("description").map_err(decode)?;
    let recorded_at: DateTime<Utc> = row.try_get("recorded_at").map_err(decode)?;

    // Stored rows that fail validation are corruption, not bad input.
    let corrupt = |e: LedgerError| LedgerError::Store(format!("corrupt entry row: {e}"));
    Ok(Entry {
        client_id,
        amount: Amount::new(amount).map_err(corrupt)?,
        kind: kind.parse::<EntryKind>().map_err(corrupt)?,
        description: Description::new(description).map_err(corrupt)?,
        recorded_at,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match &err {
        sqlx::Error::PoolTimedOut => LedgerError::Timeout(format!("{operation}: pool timed out")),
        sqlx::Error::Database(db)
            if matches!(db.code().as_deref(), Some("57014") | Some("55P03")) =>
        {
            LedgerError::Timeout(format!("{operation}: {db}"))
        }
        _ => LedgerError::Store(format!("{operation}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_maps_to_timeout() {
        let err = map_sqlx_error("begin", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, LedgerError::Timeout(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_errors_map_to_store() {
        let err = map_sqlx_error("read_client", sqlx::Error::RowNotFound);
        assert!(matches!(err, LedgerError::Store(ref m) if m.starts_with("read_client")));
    }

    #[test]
    fn test_default_settings() {
        let settings = PgStoreSettings::default();
        assert_eq!(settings.min_connections, 1);
        assert_eq!(settings.max_connections, 10);
        assert_eq!(settings.statement_timeout, Duration::from_secs(2));
    }
}
