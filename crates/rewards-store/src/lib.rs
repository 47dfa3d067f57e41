//! Watchable store of distribution records.
//!
//! Records are keyed by an opaque distribution identifier. Consumers
//! subscribe to added/changed notifications on the collection and react to
//! them; the store is the single shared mutable resource of the pipeline,
//! so status advances go through a compare-and-swap to keep concurrent
//! watchers from executing the same phase twice.

mod error;
mod memory;
mod sled_store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryDistributionStore;
pub use sled_store::SledDistributionStore;

use async_trait::async_trait;
use rewards_core::{DistributionInfo, DistributionRecord, DistributionStatus};
use tokio::sync::broadcast;

/// Notification emitted when the record collection changes.
#[derive(Clone, Debug)]
pub enum DistributionEvent {
    /// A record was inserted.
    Added {
        key: String,
        record: DistributionRecord,
    },
    /// An existing record was updated.
    Changed {
        key: String,
        record: DistributionRecord,
    },
}

impl DistributionEvent {
    /// The distribution identifier the event is about.
    pub fn key(&self) -> &str {
        match self {
            DistributionEvent::Added { key, .. } | DistributionEvent::Changed { key, .. } => key,
        }
    }
}

/// Store of distribution records.
#[async_trait]
pub trait DistributionStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<DistributionRecord>>;

    /// Insert a record, replacing any existing record under the key.
    /// Emits [`DistributionEvent::Added`].
    async fn insert(&self, key: &str, record: DistributionRecord) -> StoreResult<()>;

    /// All records, in no particular order.
    async fn list(&self) -> StoreResult<Vec<(String, DistributionRecord)>>;

    /// Unconditionally set the status of an existing record.
    /// Emits [`DistributionEvent::Changed`].
    async fn set_status(&self, key: &str, status: DistributionStatus) -> StoreResult<()>;

    /// Advance the status only if the record is currently at `expected`.
    /// Returns `false` (writing and emitting nothing) when another writer
    /// got there first.
    async fn transition_status(
        &self,
        key: &str,
        expected: DistributionStatus,
        next: DistributionStatus,
    ) -> StoreResult<bool>;

    /// Merge a builder result into the record and mark it
    /// `DistributionCreated`, as one atomic update.
    /// Emits [`DistributionEvent::Changed`].
    async fn merge_info(&self, key: &str, info: &DistributionInfo) -> StoreResult<()>;

    /// Subscribe to added/changed notifications.
    fn subscribe(&self) -> broadcast::Receiver<DistributionEvent>;
}
