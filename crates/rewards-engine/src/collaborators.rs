//! External collaborators consumed by the state machine.
//!
//! Both are opaque asynchronous operations; their internals live outside
//! this pipeline.

use anyhow::Result;
use async_trait::async_trait;
use rewards_core::DistributionInfo;

/// Computes per-account partial balances over block ranges and owns the
/// balance watermark.
#[async_trait]
pub trait BalanceUpdater: Send + Sync {
    /// Highest block already covered by a balance snapshot.
    async fn latest_updated_block(&self) -> Result<u64>;

    /// Extend the balance snapshots from `previous_watermark` up to
    /// `new_watermark`.
    async fn update_partial_balances(
        &self,
        previous_watermark: u64,
        new_watermark: u64,
    ) -> Result<()>;
}

/// Computes the Merkle tree for a block range and deploys the on-chain
/// distributor contract.
#[async_trait]
pub trait DistributorBuilder: Send + Sync {
    async fn create_and_deploy(&self, from_block: u64, to_block: u64) -> Result<DistributionInfo>;
}
