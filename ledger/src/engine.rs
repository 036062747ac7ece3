//! Transaction engine: limit-checked entry submission and statements.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use creditledger_common::{
    constants, now, BalanceSnapshot, ClientBalance, ClientId, EntryDraft, EntryKind, LedgerError,
    Result, Statement, STATEMENT_ENTRY_LIMIT,
};

use crate::store::{AtomicUnit, ClientAudit, LedgerStore};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bound on one operation: lock wait and store I/O up to, but not
    /// including, the commit of a submission.
    pub operation_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operation_timeout: constants::operation_timeout(),
        }
    }
}

/// Orchestrates the atomic unit around every submission and assembles
/// statements from committed reads.
///
/// Submissions on the same client serialize on the store's per-client lock.
/// Submissions on different clients never wait on each other. Nothing is
/// retried; resubmitting an identical draft records a second entry.
pub struct TransactionEngine {
    store: Arc<dyn LedgerStore>,
    config: EngineConfig,
}

impl TransactionEngine {
    /// Create an engine over an already opened store.
    pub fn new(store: Arc<dyn LedgerStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// The underlying store, for lifecycle management.
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Record a credit or debit and return the client's limit and new balance.
    ///
    /// A debit that would take the balance below `-limit` is rejected with
    /// [`LedgerError::LimitExceeded`] and leaves no trace. A debit landing
    /// exactly on `-limit` is accepted.
    ///
    /// The operation timeout covers staging only. Once `commit` starts, its
    /// outcome is the store's, so a [`LedgerError::Timeout`] always means
    /// nothing was recorded.
    #[instrument(
        skip(self, draft),
        fields(client_id = %client_id, amount = %draft.amount, kind = %draft.kind)
    )]
    pub async fn submit_entry(
        &self,
        client_id: ClientId,
        draft: &EntryDraft,
    ) -> Result<ClientBalance> {
        let result = self.run_submission(client_id, draft).await;

        match &result {
            Ok(after) => info!(balance = after.balance, limit = after.limit, "Entry committed"),
            Err(LedgerError::LimitExceeded { balance, limit, .. }) => {
                info!(balance, limit, "Entry rejected, limit exceeded")
            }
            Err(e) => warn!(error = %e, "Entry not recorded"),
        }
        result
    }

    /// Current balance plus up to ten most recent entries.
    ///
    /// Balance and entries come from two independent committed reads, so
    /// under concurrent writes they can reflect slightly different moments.
    /// The statement is best-effort "latest known".
    #[instrument(skip(self), fields(client_id = %client_id))]
    pub async fn get_statement(&self, client_id: ClientId) -> Result<Statement> {
        self.bounded("get_statement", client_id, async {
            let client = self
                .store
                .read_client(client_id)
                .await?
                .ok_or(LedgerError::ClientNotFound(client_id))?;

            let mut entries = self
                .store
                .recent_entries(client_id, STATEMENT_ENTRY_LIMIT)
                .await?;
            entries.truncate(STATEMENT_ENTRY_LIMIT);

            Ok(Statement {
                balance: BalanceSnapshot {
                    total: client.balance,
                    limit: client.limit,
                    as_of: now(),
                },
                entries,
            })
        })
        .await
    }

    /// Compare the running balance with the entry log of a client.
    #[instrument(skip(self), fields(client_id = %client_id))]
    pub async fn verify_client(&self, client_id: ClientId) -> Result<ClientAudit> {
        let audit = self
            .bounded("verify_client", client_id, self.store.audit_client(client_id))
            .await?
            .ok_or(LedgerError::ClientNotFound(client_id))?;

        if !audit.is_consistent() {
            warn!(
                balance = audit.balance.balance,
                entries_sum = audit.entries_sum,
                limit = audit.balance.limit,
                "Ledger inconsistency detected"
            );
        }
        Ok(audit)
    }

    /// One atomic unit: staged under the deadline, committed outside it.
    async fn run_submission(&self, client_id: ClientId, draft: &EntryDraft) -> Result<ClientBalance> {
        let (unit, after) = self
            .bounded("submit_entry", client_id, self.open_and_stage(client_id, draft))
            .await?;

        // Unbounded: the pool and server-side statement timeout cover it.
        unit.commit().await?;
        Ok(after)
    }

    /// Begin a unit and stage the submission in it. On failure the unit is
    /// rolled back; on success it is handed back uncommitted.
    async fn open_and_stage(
        &self,
        client_id: ClientId,
        draft: &EntryDraft,
    ) -> Result<(Box<dyn AtomicUnit>, ClientBalance)> {
        let mut unit = self.store.begin().await?;

        match Self::stage(unit.as_mut(), client_id, draft).await {
            Ok(after) => Ok((unit, after)),
            Err(e) => {
                if let Err(rollback_err) = unit.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed, unit dropped");
                }
                Err(e)
            }
        }
    }

    /// Lock the client, check the limit, apply the delta and append the entry.
    ///
    /// Structural validation happened when the draft was built. A credit whose
    /// result would overflow the balance depends on the locked balance, so it
    /// is the one [`LedgerError::Validation`] raised here, under the lock,
    /// before anything is mutated.
    async fn stage(
        unit: &mut dyn AtomicUnit,
        client_id: ClientId,
        draft: &EntryDraft,
    ) -> Result<ClientBalance> {
        let current = unit
            .lock_and_read_client(client_id)
            .await?
            .ok_or(LedgerError::ClientNotFound(client_id))?;

        let delta = draft.delta();
        if draft.kind == EntryKind::Debit && !current.admits(delta) {
            return Err(LedgerError::LimitExceeded {
                client_id,
                balance: current.balance,
                limit: current.limit,
                amount: draft.amount.get(),
            });
        }
        if current.projected(delta).is_none() {
            return Err(LedgerError::validation("value", "value would overflow the balance"));
        }

        let balance = unit.apply_delta(client_id, delta).await?;
        unit.append_entry(client_id, draft).await?;

        Ok(ClientBalance::new(current.limit, balance))
    }

    /// Run `op` under the operation timeout. On expiry the future is dropped,
    /// which rolls back any open unit and releases its lock.
    async fn bounded<T>(
        &self,
        operation: &str,
        client_id: ClientId,
        op: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.operation_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout(format!(
                "{operation} for client {client_id} exceeded {:?}",
                self.config.operation_timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use creditledger_common::{Amount, Description, Entry};
    use proptest::prelude::*;

    fn id(n: i32) -> ClientId {
        ClientId::new(n).unwrap()
    }

    fn debit(amount: i64) -> EntryDraft {
        EntryDraft::debit(Amount::new(amount).unwrap(), Description::new("debit").unwrap())
    }

    fn credit(amount: i64) -> EntryDraft {
        EntryDraft::credit(Amount::new(amount).unwrap(), Description::new("credit").unwrap())
    }

    fn engine_with(store: MemoryStore) -> TransactionEngine {
        TransactionEngine::new(Arc::new(store), EngineConfig::default())
    }

    fn create_test_engine() -> (MemoryStore, TransactionEngine) {
        let store = MemoryStore::with_clients([(id(1), 1000), (id(2), 500)]).unwrap();
        (store.clone(), engine_with(store))
    }

    #[tokio::test]
    async fn test_worked_example() {
        let (_, engine) = create_test_engine();

        let after = engine.submit_entry(id(1), &debit(500)).await.unwrap();
        assert_eq!(after, ClientBalance::new(1000, -500));

        let err = engine.submit_entry(id(1), &debit(600)).await.unwrap_err();
        assert!(matches!(err, LedgerError::LimitExceeded { balance: -500, limit: 1000, .. }));

        let after = engine.submit_entry(id(1), &credit(300)).await.unwrap();
        assert_eq!(after.balance, -200);

        let statement = engine.get_statement(id(1)).await.unwrap();
        assert_eq!(statement.balance.total, -200);
        assert_eq!(statement.balance.limit, 1000);
        assert_eq!(statement.entries.len(), 2);
        assert_eq!(statement.entries[0].kind, EntryKind::Credit);
        assert_eq!(statement.entries[0].amount.get(), 300);
        assert_eq!(statement.entries[1].kind, EntryKind::Debit);
        assert_eq!(statement.entries[1].amount.get(), 500);
    }

    #[tokio::test]
    async fn test_debit_exactly_to_floor_accepted() {
        let (_, engine) = create_test_engine();

        let after = engine.submit_entry(id(1), &debit(1000)).await.unwrap();
        assert_eq!(after.balance, -1000);

        let err = engine.submit_entry(id(1), &debit(1)).await.unwrap_err();
        assert_eq!(err.error_code(), "LIMIT_EXCEEDED");
    }

    #[tokio::test]
    async fn test_one_unit_beyond_floor_rejected_without_change() {
        let (store, engine) = create_test_engine();

        assert!(engine.submit_entry(id(1), &debit(1001)).await.is_err());

        let audit = store.audit_client(id(1)).await.unwrap().unwrap();
        assert_eq!(audit.balance.balance, 0);
        assert_eq!(audit.entry_count, 0);
    }

    #[tokio::test]
    async fn test_credit_never_limited() {
        let (_, engine) = create_test_engine();
        engine.submit_entry(id(2), &debit(500)).await.unwrap();

        let after = engine.submit_entry(id(2), &credit(10_000)).await.unwrap();
        assert_eq!(after.balance, 9_500);
    }

    #[tokio::test]
    async fn test_unknown_client() {
        let (store, engine) = create_test_engine();

        let err = engine.submit_entry(id(42), &credit(10)).await.unwrap_err();
        assert_eq!(err, LedgerError::ClientNotFound(id(42)));

        let err = engine.get_statement(id(42)).await.unwrap_err();
        assert_eq!(err, LedgerError::ClientNotFound(id(42)));

        assert_eq!(store.client_count(), 2);
        assert!(store.read_client(id(42)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_statement_capped_and_ordered() {
        let (_, engine) = create_test_engine();
        for amount in 1..=15 {
            engine.submit_entry(id(1), &credit(amount)).await.unwrap();
        }

        let statement = engine.get_statement(id(1)).await.unwrap();
        assert_eq!(statement.entries.len(), STATEMENT_ENTRY_LIMIT);
        let amounts: Vec<i64> = statement.entries.iter().map(|e| e.amount.get()).collect();
        assert_eq!(amounts, (6..=15).rev().collect::<Vec<_>>());
        assert!(statement
            .entries
            .windows(2)
            .all(|w| w[0].recorded_at >= w[1].recorded_at));
        assert_eq!(statement.balance.total, (1..=15).sum::<i64>());
    }

    #[tokio::test]
    async fn test_concurrent_debits_never_breach_limit() {
        let (_, engine) = create_test_engine();
        let engine = Arc::new(engine);

        // 20 debits of 100 against a limit of 1000: exactly 10 can succeed.
        let handles: Vec<_> = (0..20)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.submit_entry(id(1), &debit(100)).await })
            })
            .collect();

        let mut accepted = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(LedgerError::LimitExceeded { .. }) => rejected += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(accepted, 10);
        assert_eq!(rejected, 10);

        let audit = engine.verify_client(id(1)).await.unwrap();
        assert_eq!(audit.balance.balance, -1000);
        assert_eq!(audit.entry_count, 10);
        assert!(audit.is_consistent());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mixed_keeps_balance_equal_to_entries() {
        let (_, engine) = create_test_engine();
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..200)
            .map(|i| {
                let engine = engine.clone();
                let client = id(1 + (i % 2));
                let draft = if i % 3 == 0 { credit(70) } else { debit(45) };
                tokio::spawn(async move { engine.submit_entry(client, &draft).await })
            })
            .collect();
        for handle in handles {
            let _ = handle.await.unwrap();
        }

        for client in [id(1), id(2)] {
            let audit = engine.verify_client(client).await.unwrap();
            assert!(audit.is_consistent(), "{audit:?}");
        }
    }

    #[tokio::test]
    async fn test_timeout_releases_lock_and_leaves_no_effect() {
        let store = MemoryStore::with_clients([(id(1), 1000), (id(2), 1000)]).unwrap();
        let engine = TransactionEngine::new(
            Arc::new(store.clone()),
            EngineConfig {
                operation_timeout: Duration::from_millis(50),
            },
        );

        let mut holder = store.begin().await.unwrap();
        holder.lock_and_read_client(id(1)).await.unwrap();

        let err = engine.submit_entry(id(1), &debit(100)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Timeout(_)));
        assert!(err.is_retryable());

        // Another client is unaffected by the held lock.
        assert_eq!(engine.submit_entry(id(2), &debit(100)).await.unwrap().balance, -100);

        // Statements do not wait on the held lock either.
        assert_eq!(engine.get_statement(id(1)).await.unwrap().balance.total, 0);

        holder.rollback().await.unwrap();
        assert_eq!(engine.submit_entry(id(1), &debit(100)).await.unwrap().balance, -100);

        let audit = engine.verify_client(id(1)).await.unwrap();
        assert_eq!(audit.entry_count, 1);
    }

    /// Delegates to a memory store but fails every `append_entry`.
    struct FailingAppendStore(MemoryStore);

    struct FailingAppendUnit(Box<dyn AtomicUnit>);

    #[async_trait]
    impl LedgerStore for FailingAppendStore {
        async fn begin(&self) -> Result<Box<dyn AtomicUnit>> {
            Ok(Box::new(FailingAppendUnit(self.0.begin().await?)))
        }
        async fn read_client(&self, client_id: ClientId) -> Result<Option<ClientBalance>> {
            self.0.read_client(client_id).await
        }
        async fn recent_entries(&self, client_id: ClientId, limit: usize) -> Result<Vec<Entry>> {
            self.0.recent_entries(client_id, limit).await
        }
        async fn audit_client(&self, client_id: ClientId) -> Result<Option<ClientAudit>> {
            self.0.audit_client(client_id).await
        }
        async fn close(&self) {}
    }

    #[async_trait]
    impl AtomicUnit for FailingAppendUnit {
        async fn lock_and_read_client(&mut self, client_id: ClientId) -> Result<Option<ClientBalance>> {
            self.0.lock_and_read_client(client_id).await
        }
        async fn apply_delta(&mut self, client_id: ClientId, delta: i64) -> Result<i64> {
            self.0.apply_delta(client_id, delta).await
        }
        async fn append_entry(&mut self, _: ClientId, _: &EntryDraft) -> Result<()> {
            Err(LedgerError::Store("disk full".to_string()))
        }
        async fn commit(self: Box<Self>) -> Result<()> {
            self.0.commit().await
        }
        async fn rollback(self: Box<Self>) -> Result<()> {
            self.0.rollback().await
        }
    }

    #[tokio::test]
    async fn test_store_failure_rolls_back_delta() {
        let memory = MemoryStore::with_clients([(id(1), 1000)]).unwrap();
        let engine = TransactionEngine::new(
            Arc::new(FailingAppendStore(memory.clone())),
            EngineConfig::default(),
        );

        let err = engine.submit_entry(id(1), &credit(250)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Store(_)));

        let audit = memory.audit_client(id(1)).await.unwrap().unwrap();
        assert_eq!(audit.balance.balance, 0);
        assert_eq!(audit.entry_count, 0);

        // Lock was released by the rollback.
        let mut unit = memory.begin().await.unwrap();
        let read = tokio::time::timeout(
            Duration::from_millis(50),
            unit.lock_and_read_client(id(1)),
        )
        .await;
        assert!(read.is_ok());
    }

    /// Delegates to a memory store, but acknowledges commits only after the
    /// data is already visible.
    struct SlowCommitStore {
        inner: MemoryStore,
        ack_delay: Duration,
    }

    struct SlowCommitUnit {
        inner: Box<dyn AtomicUnit>,
        ack_delay: Duration,
    }

    #[async_trait]
    impl LedgerStore for SlowCommitStore {
        async fn begin(&self) -> Result<Box<dyn AtomicUnit>> {
            Ok(Box::new(SlowCommitUnit {
                inner: self.inner.begin().await?,
                ack_delay: self.ack_delay,
            }))
        }
        async fn read_client(&self, client_id: ClientId) -> Result<Option<ClientBalance>> {
            self.inner.read_client(client_id).await
        }
        async fn recent_entries(&self, client_id: ClientId, limit: usize) -> Result<Vec<Entry>> {
            self.inner.recent_entries(client_id, limit).await
        }
        async fn audit_client(&self, client_id: ClientId) -> Result<Option<ClientAudit>> {
            self.inner.audit_client(client_id).await
        }
        async fn close(&self) {}
    }

    #[async_trait]
    impl AtomicUnit for SlowCommitUnit {
        async fn lock_and_read_client(&mut self, client_id: ClientId) -> Result<Option<ClientBalance>> {
            self.inner.lock_and_read_client(client_id).await
        }
        async fn apply_delta(&mut self, client_id: ClientId, delta: i64) -> Result<i64> {
            self.inner.apply_delta(client_id, delta).await
        }
        async fn append_entry(&mut self, client_id: ClientId, draft: &EntryDraft) -> Result<()> {
            self.inner.append_entry(client_id, draft).await
        }
        async fn commit(self: Box<Self>) -> Result<()> {
            let ack_delay = self.ack_delay;
            self.inner.commit().await?;
            tokio::time::sleep(ack_delay).await;
            Ok(())
        }
        async fn rollback(self: Box<Self>) -> Result<()> {
            self.inner.rollback().await
        }
    }

    #[tokio::test]
    async fn test_slow_commit_ack_reports_success() {
        let memory = MemoryStore::with_clients([(id(1), 1000)]).unwrap();
        let engine = TransactionEngine::new(
            Arc::new(SlowCommitStore {
                inner: memory.clone(),
                ack_delay: Duration::from_millis(200),
            }),
            EngineConfig {
                operation_timeout: Duration::from_millis(50),
            },
        );

        let after = engine.submit_entry(id(1), &debit(100)).await.unwrap();
        assert_eq!(after.balance, -100);

        let audit = memory.audit_client(id(1)).await.unwrap().unwrap();
        assert_eq!(audit.balance.balance, -100);
        assert_eq!(audit.entry_count, 1);
    }

    #[tokio::test]
    async fn test_credit_overflow_rejected_without_change() {
        let store = MemoryStore::with_clients([(id(1), 0)]).unwrap();
        let engine = engine_with(store.clone());
        engine.submit_entry(id(1), &credit(i64::MAX)).await.unwrap();

        let err = engine.submit_entry(id(1), &credit(1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation { .. }));

        let audit = store.audit_client(id(1)).await.unwrap().unwrap();
        assert_eq!(audit.balance.balance, i64::MAX);
        assert_eq!(audit.entry_count, 1);

        // The lock was released by the rollback.
        assert_eq!(engine.submit_entry(id(1), &debit(1)).await.unwrap().balance, i64::MAX - 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn debit_accepted_iff_within_floor(
            limit in 0i64..10_000,
            credits in 0i64..5_000,
            amount in 1i64..20_000,
        ) {
            tokio_test::block_on(async {
                let store = MemoryStore::with_clients([(id(1), limit)]).unwrap();
                let engine = engine_with(store);
                if credits > 0 {
                    engine.submit_entry(id(1), &credit(credits)).await.unwrap();
                }

                let result = engine.submit_entry(id(1), &debit(amount)).await;
                let expected_ok = credits - amount >= -limit;
                prop_assert_eq!(result.is_ok(), expected_ok);

                let audit = engine.verify_client(id(1)).await.unwrap();
                prop_assert!(audit.is_consistent());
                let expected_balance = if expected_ok { credits - amount } else { credits };
                prop_assert_eq!(audit.balance.balance, expected_balance);
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
