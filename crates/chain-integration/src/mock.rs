//! Mock chain and document implementations for tests.
//!
//! These simulate the distributor contract and the document bucket without
//! any network access, tracking claim state in memory.

use crate::{ClaimReceipt, DistributorProvider, DocumentStore, MerkleDistributor};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use rewards_core::{ClaimEntry, MerkleDocument};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Distributor backed by in-memory claim state.
pub struct MockDistributor {
    root: String,
    claimed: RwLock<HashSet<u64>>,
    failing_accounts: RwLock<HashSet<String>>,
    submissions: RwLock<Vec<(String, u64)>>,
}

impl MockDistributor {
    /// A distributor deployed with the given Merkle root.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            claimed: RwLock::new(HashSet::new()),
            failing_accounts: RwLock::new(HashSet::new()),
            submissions: RwLock::new(Vec::new()),
        }
    }

    /// Mark a leaf index as already redeemed on chain.
    pub fn mark_claimed(&self, index: u64) {
        self.claimed.write().insert(index);
    }

    /// Make every claim from this account revert.
    pub fn fail_account(&self, account: impl Into<String>) {
        self.failing_accounts.write().insert(account.into());
    }

    /// Successfully submitted claims, as `(account, index)` pairs.
    pub fn submissions(&self) -> Vec<(String, u64)> {
        self.submissions.read().clone()
    }
}

#[async_trait]
impl MerkleDistributor for MockDistributor {
    async fn merkle_root(&self) -> Result<String> {
        Ok(self.root.clone())
    }

    async fn is_claimed(&self, index: u64) -> Result<bool> {
        Ok(self.claimed.read().contains(&index))
    }

    async fn claim(&self, account: &str, entry: &ClaimEntry) -> Result<ClaimReceipt> {
        if self.failing_accounts.read().contains(account) {
            return Err(anyhow!("transaction reverted for {account}"));
        }
        self.claimed.write().insert(entry.index);
        self.submissions
            .write()
            .push((account.to_string(), entry.index));
        Ok(ClaimReceipt {
            transaction_hash: format!("0x{:064x}", entry.index),
        })
    }
}

/// Provider with a fixed address-to-distributor table.
#[derive(Default)]
pub struct MockDistributorProvider {
    distributors: RwLock<HashMap<String, Arc<MockDistributor>>>,
}

impl MockDistributorProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, address: impl Into<String>, distributor: Arc<MockDistributor>) {
        self.distributors
            .write()
            .insert(address.into(), distributor);
    }
}

#[async_trait]
impl DistributorProvider for MockDistributorProvider {
    async fn distributor_at(&self, contract_address: &str) -> Result<Arc<dyn MerkleDistributor>> {
        self.distributors
            .read()
            .get(contract_address)
            .cloned()
            .map(|distributor| distributor as Arc<dyn MerkleDistributor>)
            .ok_or_else(|| anyhow!("no distributor deployed at {contract_address}"))
    }
}

/// Document store backed by a map.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<String, MerkleDocument>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: impl Into<String>, document: MerkleDocument) {
        self.documents.write().insert(path.into(), document);
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn load_merkle_document(&self, path: &str) -> Result<MerkleDocument> {
        self.documents
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("merkle document not found: {path}"))
    }
}
