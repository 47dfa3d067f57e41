//! Distribution state machine.
//!
//! Watches the distribution store and walks each record through its phases:
//! balance snapshot, distributor build, and claim batch execution. Handlers
//! are idempotent: observing a record in any status other than the expected
//! entry status is a no-op, so redelivered or self-triggered notifications
//! never duplicate work.

use crate::collaborators::{BalanceUpdater, DistributorBuilder};
use crate::config::EngineConfig;
use crate::retry::with_retry;
use crate::submitter::ClaimBatchSubmitter;
use anyhow::{Context, Result};
use rewards_core::{DistributionRecord, DistributionStatus};
use rewards_store::{DistributionEvent, DistributionStore};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

/// Reacts to distribution records being created and changed.
pub struct DistributionListener {
    store: Arc<dyn DistributionStore>,
    balances: Arc<dyn BalanceUpdater>,
    builder: Arc<dyn DistributorBuilder>,
    submitter: ClaimBatchSubmitter,
    config: EngineConfig,
}

impl DistributionListener {
    pub fn new(
        store: Arc<dyn DistributionStore>,
        balances: Arc<dyn BalanceUpdater>,
        builder: Arc<dyn DistributorBuilder>,
        submitter: ClaimBatchSubmitter,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            balances,
            builder,
            submitter,
            config,
        }
    }

    /// Run forever: reconcile existing records once, then dispatch store
    /// notifications as they arrive. Handler and delivery errors are logged
    /// and the subscription stays live; returns only when the store's event
    /// channel closes.
    pub async fn run(&self) {
        let mut events = self.store.subscribe();

        if let Err(err) = self.reconcile().await {
            error!("startup reconciliation failed: {err:#}");
        }

        loop {
            match events.recv().await {
                Ok(DistributionEvent::Added { key, record }) => {
                    debug!("new distribution record {key}");
                    if let Err(err) = self.handle_record_added(&key, &record).await {
                        error!("error processing new distribution {key}: {err:#}");
                    }
                }
                Ok(DistributionEvent::Changed { key, record }) => {
                    if let Err(err) = self.handle_record_changed(&key, &record).await {
                        error!("error processing distribution change {key}: {err:#}");
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("distribution events lagged by {missed}, rescanning the store");
                    if let Err(err) = self.reconcile().await {
                        error!("rescan after lag failed: {err:#}");
                    }
                }
                Err(RecvError::Closed) => {
                    info!("distribution event stream closed");
                    break;
                }
            }
        }
    }

    /// One pass over every stored record. `Pending` and `StartDistribution`
    /// re-enter their handlers (both idempotent); records interrupted
    /// mid-phase are surfaced for the operator and left alone.
    pub async fn reconcile(&self) -> Result<()> {
        let records = self
            .store
            .list()
            .await
            .context("listing distribution records")?;

        for (key, record) in records {
            match record.status {
                DistributionStatus::Pending => {
                    if let Err(err) = self.handle_record_added(&key, &record).await {
                        error!("error processing pending distribution {key}: {err:#}");
                    }
                }
                DistributionStatus::StartDistribution => {
                    if let Err(err) = self.handle_record_changed(&key, &record).await {
                        error!("error executing distribution {key}: {err:#}");
                    }
                }
                status if status.is_in_progress() => {
                    warn!("distribution {key} is stuck in {status} and needs operator attention");
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// React to a newly created record.
    ///
    /// Precondition failures log and return without touching the record.
    /// Collaborator failures propagate once retries are exhausted, leaving
    /// the persisted status wherever the phase sequence got to.
    pub async fn handle_record_added(
        &self,
        key: &str,
        record: &DistributionRecord,
    ) -> Result<()> {
        if record.status != DistributionStatus::Pending {
            debug!("skipping distribution {key} with status {}", record.status);
            return Ok(());
        }
        let (from_block, to_block) = match (record.from_block, record.to_block) {
            (Some(from), Some(to)) if to > 0 => (from, to),
            _ => {
                error!("fromBlock and toBlock are mandatory to create distribution {key}");
                return Ok(());
            }
        };
        let watermark = self
            .balances
            .latest_updated_block()
            .await
            .context("reading balance watermark")?;
        if from_block <= watermark {
            error!(
                "fromBlock {from_block} of {key} must be greater than the balance watermark {watermark}"
            );
            return Ok(());
        }
        if !self
            .store
            .transition_status(
                key,
                DistributionStatus::Pending,
                DistributionStatus::UpdatingBalances,
            )
            .await?
        {
            debug!("distribution {key} was already picked up elsewhere");
            return Ok(());
        }

        let balances = Arc::clone(&self.balances);
        with_retry(&self.config.retry, "balance update", move || {
            let balances = Arc::clone(&balances);
            async move { balances.update_partial_balances(watermark, from_block).await }
        })
        .await
        .with_context(|| format!("updating partial balances for {key}"))?;

        if record.skip_distribution {
            self.store
                .set_status(key, DistributionStatus::Done)
                .await?;
            info!("distribution {key} done, on-chain distribution skipped");
            return Ok(());
        }

        self.store
            .set_status(key, DistributionStatus::CalculatingRewards)
            .await?;

        let builder = Arc::clone(&self.builder);
        let distribution_info = with_retry(&self.config.retry, "distributor build", move || {
            let builder = Arc::clone(&builder);
            async move { builder.create_and_deploy(from_block, to_block).await }
        })
        .await
        .with_context(|| format!("building merkle distributor for {key}"))?;

        info!(
            "distribution info ready for {key}: contract {}, document {}",
            distribution_info.contract_address, distribution_info.merkle_tree
        );
        self.store.merge_info(key, &distribution_info).await?;
        Ok(())
    }

    /// React to a record change. Only `StartDistribution` (the operator's
    /// go signal) is acted upon; the batch runs and the record is marked
    /// `Done` whatever the per-claim outcomes were.
    pub async fn handle_record_changed(
        &self,
        key: &str,
        record: &DistributionRecord,
    ) -> Result<()> {
        if record.status != DistributionStatus::StartDistribution {
            return Ok(());
        }
        let (contract_address, merkle_tree) = match (&record.contract_address, &record.merkle_tree)
        {
            (Some(address), Some(tree)) => (address.clone(), tree.clone()),
            _ => {
                error!(
                    "contractAddress and merkleTree are mandatory to distribute rewards for {key}"
                );
                return Ok(());
            }
        };
        if !self
            .store
            .transition_status(
                key,
                DistributionStatus::StartDistribution,
                DistributionStatus::Distributing,
            )
            .await?
        {
            debug!("distribution {key} is already being executed elsewhere");
            return Ok(());
        }

        let submitter = &self.submitter;
        let summary = with_retry(&self.config.retry, "claim batch", move || {
            let contract_address = contract_address.clone();
            let merkle_tree = merkle_tree.clone();
            async move { submitter.submit(&contract_address, &merkle_tree).await }
        })
        .await
        .with_context(|| format!("distributing rewards for {key}"))?;

        self.store
            .set_status(key, DistributionStatus::Done)
            .await?;
        info!(
            "distribution {key} done: {} claims submitted, {} already claimed, {} failed",
            summary.submitted, summary.skipped, summary.failed
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::mock::{MockBalanceUpdater, MockDistributorBuilder};
    use rewards_chain::mock::{InMemoryDocumentStore, MockDistributor, MockDistributorProvider};
    use rewards_core::{ClaimEntry, DistributionInfo, MerkleDocument};
    use rewards_store::MemoryDistributionStore;

    struct Harness {
        store: Arc<MemoryDistributionStore>,
        balances: Arc<MockBalanceUpdater>,
        builder: Arc<MockDistributorBuilder>,
        documents: Arc<InMemoryDocumentStore>,
        distributors: Arc<MockDistributorProvider>,
        listener: DistributionListener,
    }

    fn harness(watermark: u64) -> Harness {
        let store = Arc::new(MemoryDistributionStore::new());
        let balances = Arc::new(MockBalanceUpdater::new(watermark));
        let builder = Arc::new(MockDistributorBuilder::returning("0xA", "doc.json"));
        let documents = Arc::new(InMemoryDocumentStore::new());
        let distributors = Arc::new(MockDistributorProvider::new());

        let submitter = ClaimBatchSubmitter::new(
            Arc::clone(&documents) as _,
            Arc::clone(&distributors) as _,
            10,
        );
        let config = EngineConfig {
            max_in_flight: 10,
            retry: RetryConfig {
                max_attempts: 2,
                backoff: std::time::Duration::ZERO,
            },
        };
        let listener = DistributionListener::new(
            Arc::clone(&store) as _,
            Arc::clone(&balances) as _,
            Arc::clone(&builder) as _,
            submitter,
            config,
        );

        Harness {
            store,
            balances,
            builder,
            documents,
            distributors,
            listener,
        }
    }

    fn one_claim_document(root: &str) -> MerkleDocument {
        let mut claims = std::collections::HashMap::new();
        claims.insert(
            "0xabc".to_string(),
            ClaimEntry {
                index: 0,
                amount: "0x64".to_string(),
                proof: vec!["0x01".to_string()],
            },
        );
        MerkleDocument {
            merkle_root: root.to_string(),
            claims,
        }
    }

    #[tokio::test]
    async fn test_non_pending_record_is_a_no_op() {
        let h = harness(50);
        let mut record = DistributionRecord::pending(100, 200);
        record.status = DistributionStatus::Distributing;
        h.store.insert("d1", record.clone()).await.unwrap();

        h.listener.handle_record_added("d1", &record).await.unwrap();

        let stored = h.store.get("d1").await.unwrap().unwrap();
        assert_eq!(stored.status, DistributionStatus::Distributing);
        assert!(h.balances.calls().is_empty());
        assert!(h.builder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_block_range_is_rejected() {
        let h = harness(0);
        let mut record = DistributionRecord::pending(100, 200);
        record.to_block = None;
        h.store.insert("d1", record.clone()).await.unwrap();

        h.listener.handle_record_added("d1", &record).await.unwrap();

        let stored = h.store.get("d1").await.unwrap().unwrap();
        assert_eq!(stored.status, DistributionStatus::Pending);
        assert!(h.balances.calls().is_empty());
    }

    #[tokio::test]
    async fn test_zero_to_block_is_rejected_but_zero_from_block_passes_field_check() {
        let h = harness(50);

        // toBlock of zero is treated as missing.
        let record = DistributionRecord::pending(100, 0);
        h.store.insert("d1", record.clone()).await.unwrap();
        h.listener.handle_record_added("d1", &record).await.unwrap();
        assert!(h.balances.calls().is_empty());

        // fromBlock of zero passes the field check and then trips the
        // watermark guard instead.
        let record = DistributionRecord::pending(0, 200);
        h.store.insert("d2", record.clone()).await.unwrap();
        h.listener.handle_record_added("d2", &record).await.unwrap();
        let stored = h.store.get("d2").await.unwrap().unwrap();
        assert_eq!(stored.status, DistributionStatus::Pending);
        assert!(h.balances.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stale_from_block_aborts_before_balance_update() {
        let h = harness(150);
        let record = DistributionRecord::pending(100, 200);
        h.store.insert("d1", record.clone()).await.unwrap();

        h.listener.handle_record_added("d1", &record).await.unwrap();

        let stored = h.store.get("d1").await.unwrap().unwrap();
        assert_eq!(stored.status, DistributionStatus::Pending);
        assert!(h.balances.calls().is_empty());
        assert!(h.builder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_from_block_equal_to_watermark_aborts() {
        let h = harness(100);
        let record = DistributionRecord::pending(100, 200);
        h.store.insert("d1", record.clone()).await.unwrap();

        h.listener.handle_record_added("d1", &record).await.unwrap();

        assert!(h.balances.calls().is_empty());
    }

    #[tokio::test]
    async fn test_skip_distribution_ends_done_without_builder() {
        let h = harness(50);
        let mut record = DistributionRecord::pending(100, 200);
        record.skip_distribution = true;
        h.store.insert("d1", record.clone()).await.unwrap();

        h.listener.handle_record_added("d1", &record).await.unwrap();

        let stored = h.store.get("d1").await.unwrap().unwrap();
        assert_eq!(stored.status, DistributionStatus::Done);
        assert_eq!(h.balances.calls(), vec![(50, 100)]);
        assert!(h.builder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_full_creation_sequence() {
        let h = harness(50);
        let record = DistributionRecord::pending(100, 200);
        h.store.insert("d1", record.clone()).await.unwrap();

        h.listener.handle_record_added("d1", &record).await.unwrap();

        let stored = h.store.get("d1").await.unwrap().unwrap();
        assert_eq!(stored.status, DistributionStatus::DistributionCreated);
        assert_eq!(stored.contract_address.as_deref(), Some("0xA"));
        assert_eq!(stored.merkle_tree.as_deref(), Some("doc.json"));
        assert_eq!(h.balances.calls(), vec![(50, 100)]);
        assert_eq!(h.builder.calls(), vec![(100, 200)]);
    }

    #[tokio::test]
    async fn test_balance_update_retries_then_succeeds() {
        let h = harness(50);
        h.balances.fail_next(1);
        let record = DistributionRecord::pending(100, 200);
        h.store.insert("d1", record.clone()).await.unwrap();

        h.listener.handle_record_added("d1", &record).await.unwrap();

        let stored = h.store.get("d1").await.unwrap().unwrap();
        assert_eq!(stored.status, DistributionStatus::DistributionCreated);
        assert_eq!(h.balances.calls(), vec![(50, 100)]);
    }

    #[tokio::test]
    async fn test_balance_update_failure_leaves_record_in_progress() {
        let h = harness(50);
        h.balances.fail_next(5); // more than the configured attempts
        let record = DistributionRecord::pending(100, 200);
        h.store.insert("d1", record.clone()).await.unwrap();

        let err = h
            .listener
            .handle_record_added("d1", &record)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("updating partial balances"));

        // Observable, resumable status for the operator.
        let stored = h.store.get("d1").await.unwrap().unwrap();
        assert_eq!(stored.status, DistributionStatus::UpdatingBalances);
        assert!(h.builder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_changed_handler_ignores_other_statuses() {
        let h = harness(50);
        let mut record = DistributionRecord::pending(100, 200);
        record.status = DistributionStatus::DistributionCreated;
        record.contract_address = Some("0xA".to_string());
        record.merkle_tree = Some("doc.json".to_string());
        h.store.insert("d1", record.clone()).await.unwrap();

        h.listener
            .handle_record_changed("d1", &record)
            .await
            .unwrap();

        let stored = h.store.get("d1").await.unwrap().unwrap();
        assert_eq!(stored.status, DistributionStatus::DistributionCreated);
    }

    #[tokio::test]
    async fn test_changed_handler_requires_contract_and_tree() {
        let h = harness(50);
        let mut record = DistributionRecord::pending(100, 200);
        record.status = DistributionStatus::StartDistribution;
        h.store.insert("d1", record.clone()).await.unwrap();

        h.listener
            .handle_record_changed("d1", &record)
            .await
            .unwrap();

        let stored = h.store.get("d1").await.unwrap().unwrap();
        assert_eq!(stored.status, DistributionStatus::StartDistribution);
    }

    #[tokio::test]
    async fn test_start_distribution_runs_batch_and_finishes() {
        let h = harness(50);
        h.documents.put("doc.json", one_claim_document("0xR1"));
        let distributor = Arc::new(MockDistributor::new("0xR1"));
        h.distributors.register("0xA", Arc::clone(&distributor));

        let mut record = DistributionRecord::pending(100, 200);
        record.status = DistributionStatus::StartDistribution;
        record.contract_address = Some("0xA".to_string());
        record.merkle_tree = Some("doc.json".to_string());
        h.store.insert("d1", record.clone()).await.unwrap();

        h.listener
            .handle_record_changed("d1", &record)
            .await
            .unwrap();

        let stored = h.store.get("d1").await.unwrap().unwrap();
        assert_eq!(stored.status, DistributionStatus::Done);
        assert_eq!(distributor.submissions(), vec![("0xabc".to_string(), 0)]);
    }

    #[tokio::test]
    async fn test_failed_claims_still_finish_the_distribution() {
        let h = harness(50);
        h.documents.put("doc.json", one_claim_document("0xR1"));
        let distributor = Arc::new(MockDistributor::new("0xR1"));
        distributor.fail_account("0xabc");
        h.distributors.register("0xA", Arc::clone(&distributor));

        let mut record = DistributionRecord::pending(100, 200);
        record.status = DistributionStatus::StartDistribution;
        record.contract_address = Some("0xA".to_string());
        record.merkle_tree = Some("doc.json".to_string());
        h.store.insert("d1", record.clone()).await.unwrap();

        h.listener
            .handle_record_changed("d1", &record)
            .await
            .unwrap();

        // Per-claim failures never block Done.
        let stored = h.store.get("d1").await.unwrap().unwrap();
        assert_eq!(stored.status, DistributionStatus::Done);
        assert!(distributor.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_missing_document_leaves_record_distributing() {
        let h = harness(50);
        h.distributors
            .register("0xA", Arc::new(MockDistributor::new("0xR1")));

        let mut record = DistributionRecord::pending(100, 200);
        record.status = DistributionStatus::StartDistribution;
        record.contract_address = Some("0xA".to_string());
        record.merkle_tree = Some("missing.json".to_string());
        h.store.insert("d1", record.clone()).await.unwrap();

        let err = h
            .listener
            .handle_record_changed("d1", &record)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("distributing rewards"));

        let stored = h.store.get("d1").await.unwrap().unwrap();
        assert_eq!(stored.status, DistributionStatus::Distributing);
    }

    #[tokio::test]
    async fn test_reconcile_dispatches_entry_statuses_only() {
        let h = harness(50);
        h.documents.put("doc.json", one_claim_document("0xR1"));
        let distributor = Arc::new(MockDistributor::new("0xR1"));
        h.distributors.register("0xA", Arc::clone(&distributor));

        // A pending record, a startable record, and one stuck mid-phase.
        h.store
            .insert("pending", DistributionRecord::pending(100, 200))
            .await
            .unwrap();

        let mut startable = DistributionRecord::pending(100, 200);
        startable.status = DistributionStatus::StartDistribution;
        startable.contract_address = Some("0xA".to_string());
        startable.merkle_tree = Some("doc.json".to_string());
        h.store.insert("startable", startable).await.unwrap();

        let mut stuck = DistributionRecord::pending(300, 400);
        stuck.status = DistributionStatus::CalculatingRewards;
        h.store.insert("stuck", stuck).await.unwrap();

        h.listener.reconcile().await.unwrap();

        let pending = h.store.get("pending").await.unwrap().unwrap();
        assert_eq!(pending.status, DistributionStatus::DistributionCreated);

        let startable = h.store.get("startable").await.unwrap().unwrap();
        assert_eq!(startable.status, DistributionStatus::Done);

        // Stuck records are only reported, never advanced.
        let stuck = h.store.get("stuck").await.unwrap().unwrap();
        assert_eq!(stuck.status, DistributionStatus::CalculatingRewards);
    }

    #[tokio::test]
    async fn test_lost_cas_race_is_a_no_op() {
        let h = harness(50);
        let record = DistributionRecord::pending(100, 200);
        h.store.insert("d1", record.clone()).await.unwrap();

        // Another watcher advanced the record between the snapshot this
        // handler received and its own CAS.
        h.store
            .set_status("d1", DistributionStatus::UpdatingBalances)
            .await
            .unwrap();

        h.listener.handle_record_added("d1", &record).await.unwrap();

        assert!(h.balances.calls().is_empty());
        assert!(h.builder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_builder_extra_fields_are_persisted() {
        let h = harness(50);
        let mut info = DistributionInfo::new("0xA", "doc.json");
        info.extra.insert(
            "totalRewards".to_string(),
            serde_json::json!("651776179135450996764"),
        );
        let builder = Arc::new(MockDistributorBuilder::new(info));

        let submitter = ClaimBatchSubmitter::new(
            Arc::clone(&h.documents) as _,
            Arc::clone(&h.distributors) as _,
            10,
        );
        let listener = DistributionListener::new(
            Arc::clone(&h.store) as _,
            Arc::clone(&h.balances) as _,
            builder,
            submitter,
            EngineConfig {
                max_in_flight: 10,
                retry: RetryConfig::none(),
            },
        );

        let record = DistributionRecord::pending(100, 200);
        h.store.insert("d1", record.clone()).await.unwrap();
        listener.handle_record_added("d1", &record).await.unwrap();

        let stored = h.store.get("d1").await.unwrap().unwrap();
        assert_eq!(
            stored.extra["totalRewards"],
            serde_json::json!("651776179135450996764")
        );
    }
}
