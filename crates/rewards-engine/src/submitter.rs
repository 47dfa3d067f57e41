//! Claim batch submission.
//!
//! Submits every unclaimed claim of a Merkle document to the deployed
//! distributor, at most `max_in_flight` operations at a time. Individual
//! claim failures are logged and tallied, never raised: one bad claim must
//! not abort the batch.

use anyhow::{Context, Result};
use rewards_chain::{DistributorProvider, DocumentStore, MerkleDistributor};
use rewards_core::ClaimEntry;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Per-claim resolution within a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ClaimOutcome {
    Submitted,
    AlreadyClaimed,
    Failed,
}

/// Tally of a completed batch. Informational; per-claim failures are
/// already logged by the time the batch returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub submitted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    /// Number of accounts the batch resolved, whatever the outcome.
    pub fn total(&self) -> usize {
        self.submitted + self.skipped + self.failed
    }

    fn record(&mut self, outcome: ClaimOutcome) {
        match outcome {
            ClaimOutcome::Submitted => self.submitted += 1,
            ClaimOutcome::AlreadyClaimed => self.skipped += 1,
            ClaimOutcome::Failed => self.failed += 1,
        }
    }
}

/// Submits the claims of a Merkle document with bounded concurrency.
pub struct ClaimBatchSubmitter {
    documents: Arc<dyn DocumentStore>,
    distributors: Arc<dyn DistributorProvider>,
    max_in_flight: usize,
}

impl ClaimBatchSubmitter {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        distributors: Arc<dyn DistributorProvider>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            documents,
            distributors,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Submit every unclaimed claim in the referenced document to the
    /// distributor at `contract_address`.
    ///
    /// Returns once every account has resolved (submitted, skipped, or
    /// failed). Only failures to load the document or reach the contract
    /// surface as errors.
    pub async fn submit(
        &self,
        contract_address: &str,
        merkle_tree_path: &str,
    ) -> Result<BatchSummary> {
        info!("starting claim batch for {contract_address} from {merkle_tree_path}");

        let document = self
            .documents
            .load_merkle_document(merkle_tree_path)
            .await?;
        let distributor = self.distributors.distributor_at(contract_address).await?;

        let contract_root = distributor.merkle_root().await?;
        if document.merkle_root != contract_root {
            // The contract root is authoritative and reconciliation happens
            // out of band, so a mismatch does not stop the batch.
            error!(
                "merkle root {} does not match contract root {contract_root} at {contract_address}",
                document.merkle_root
            );
        }

        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks: JoinSet<ClaimOutcome> = JoinSet::new();
        for (account, entry) in document.claims {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .context("claim pool closed")?;
            let distributor = Arc::clone(&distributor);
            tasks.spawn(async move {
                let _permit = permit;
                process_claim(distributor.as_ref(), &account, &entry).await
            });
        }

        let mut summary = BatchSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => summary.record(outcome),
                Err(err) => {
                    error!("claim task failed to run: {err}");
                    summary.failed += 1;
                }
            }
        }

        info!(
            "claim batch for {contract_address} done: {} submitted, {} already claimed, {} failed",
            summary.submitted, summary.skipped, summary.failed
        );
        Ok(summary)
    }
}

async fn process_claim(
    distributor: &dyn MerkleDistributor,
    account: &str,
    entry: &ClaimEntry,
) -> ClaimOutcome {
    match distributor.is_claimed(entry.index).await {
        Ok(true) => {
            debug!("claim {} for {account} already redeemed, skipping", entry.index);
            return ClaimOutcome::AlreadyClaimed;
        }
        Ok(false) => {}
        Err(err) => {
            error!("failed to query claim status for {account}: {err:#}");
            return ClaimOutcome::Failed;
        }
    }

    match distributor.claim(account, entry).await {
        Ok(receipt) => {
            info!(
                event = "ClaimRewardSuccess",
                account,
                transaction_hash = %receipt.transaction_hash,
                "reward claim submitted"
            );
            ClaimOutcome::Submitted
        }
        Err(err) => {
            error!("error with claim for {account}: {err:#}");
            ClaimOutcome::Failed
        }
    }
}
