//! Postgres store integration tests.
//!
//! Run only when `DATABASE_URL` points at a disposable database.

use std::sync::Arc;

use creditledger_common::{ClientId, EntryDraft, LedgerError};
use creditledger_ledger::{
    EngineConfig, LedgerStore, PgStoreSettings, PostgresStore, TransactionEngine,
};
use sqlx::PgPool;

async fn setup(limit: i64) -> Option<(PgPool, ClientId, TransactionEngine)> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };

    let pool = PgPool::connect(&url).await.unwrap();
    let store = PostgresStore::from_pool(pool.clone());
    store.migrate().await.unwrap();
    let raw_id: i32 = sqlx::query_scalar(
        "INSERT INTO clients (id, limit_cents) SELECT COALESCE(MAX(id), 0) + 1, $1 FROM clients RETURNING id",
    )
    .bind(limit)
    .fetch_one(&pool)
    .await
    .unwrap();

    let engine = TransactionEngine::new(Arc::new(store), EngineConfig::default());
    Some((pool, ClientId::new(raw_id).unwrap(), engine))
}

async fn teardown(pool: &PgPool, client_id: ClientId) {
    sqlx::query("DELETE FROM entries WHERE client_id = $1")
        .bind(client_id.get())
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("DELETE FROM clients WHERE id = $1")
        .bind(client_id.get())
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_postgres_worked_example() {
    let Some((pool, client, engine)) = setup(1000).await else {
        return;
    };

    let after = engine
        .submit_entry(client, &EntryDraft::parse(500, "d", "rent").unwrap())
        .await
        .unwrap();
    assert_eq!(after.balance, -500);

    let err = engine
        .submit_entry(client, &EntryDraft::parse(600, "d", "too much").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::LimitExceeded { .. }));

    engine
        .submit_entry(client, &EntryDraft::parse(300, "c", "salary").unwrap())
        .await
        .unwrap();

    let statement = engine.get_statement(client).await.unwrap();
    assert_eq!(statement.balance.total, -200);
    assert_eq!(statement.entries.len(), 2);
    assert_eq!(statement.entries[0].description.as_str(), "salary");

    let audit = engine.verify_client(client).await.unwrap();
    assert!(audit.is_consistent());

    teardown(&pool, client).await;
    engine.store().close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_postgres_concurrent_debits_serialized() {
    let Some((pool, client, engine)) = setup(1000).await else {
        return;
    };
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .submit_entry(client, &EntryDraft::parse(300, "d", "race").unwrap())
                    .await
            })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 3);

    let audit = engine.verify_client(client).await.unwrap();
    assert_eq!(audit.balance.balance, -900);
    assert!(audit.is_consistent());

    teardown(&pool, client).await;
}

#[tokio::test]
async fn test_postgres_connect_with_settings() {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let settings = PgStoreSettings {
        database_url: url,
        ..PgStoreSettings::default()
    };
    let store = PostgresStore::connect(&settings).await.unwrap();
    store.migrate().await.unwrap();

    let missing = ClientId::new(i32::MAX).unwrap();
    assert!(store.read_client(missing).await.unwrap().is_none());
    assert!(store.audit_client(missing).await.unwrap().is_none());
    store.close().await;
}
