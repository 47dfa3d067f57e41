//! The on-chain Merkle distributor surface consumed by the pipeline.

use anyhow::Result;
use async_trait::async_trait;
use rewards_core::ClaimEntry;
use std::sync::Arc;

/// Receipt of a mined claim transaction.
#[derive(Clone, Debug)]
pub struct ClaimReceipt {
    pub transaction_hash: String,
}

/// A deployed Merkle distributor contract.
///
/// Claim state held by the contract is the sole source of truth for
/// idempotence; nothing is cached across invocations.
#[async_trait]
pub trait MerkleDistributor: Send + Sync {
    /// The Merkle root the contract was deployed with.
    async fn merkle_root(&self) -> Result<String>;

    /// Whether the claim at this leaf index has already been redeemed.
    async fn is_claimed(&self, index: u64) -> Result<bool>;

    /// Submit a claim from the operator account and wait for its receipt.
    async fn claim(&self, account: &str, entry: &ClaimEntry) -> Result<ClaimReceipt>;
}

/// Resolves a distributor handle for a deployed contract address.
#[async_trait]
pub trait DistributorProvider: Send + Sync {
    async fn distributor_at(&self, contract_address: &str) -> Result<Arc<dyn MerkleDistributor>>;
}
