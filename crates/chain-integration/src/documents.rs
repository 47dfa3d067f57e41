//! Access to generated Merkle documents.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rewards_core::MerkleDocument;
use std::path::PathBuf;
use tracing::debug;

/// Read-only access to the documents the distributor builder writes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load the Merkle document stored under the given relative path.
    async fn load_merkle_document(&self, path: &str) -> Result<MerkleDocument>;
}

/// Loads Merkle documents from a directory tree, e.g. a synced copy of the
/// bucket the builder uploads into.
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn load_merkle_document(&self, path: &str) -> Result<MerkleDocument> {
        let full = self.root.join(path);
        debug!("loading merkle document from {}", full.display());
        let bytes = tokio::fs::read(&full)
            .await
            .with_context(|| format!("reading merkle document {}", full.display()))?;
        let document: MerkleDocument = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing merkle document {}", full.display()))?;
        Ok(document)
    }
}
