//! In-memory store, for tests and embedded use.

use crate::{DistributionEvent, DistributionStore, StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use rewards_core::{DistributionInfo, DistributionRecord, DistributionStatus};
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Distribution store backed by a map.
pub struct MemoryDistributionStore {
    records: RwLock<HashMap<String, DistributionRecord>>,
    events: broadcast::Sender<DistributionEvent>,
}

impl MemoryDistributionStore {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Create a store with the given event channel capacity.
    pub fn with_capacity(channel_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(channel_capacity);
        Self {
            records: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn emit(&self, event: DistributionEvent) {
        // A send error only means nobody is subscribed right now.
        let _ = self.events.send(event);
    }
}

impl Default for MemoryDistributionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DistributionStore for MemoryDistributionStore {
    async fn get(&self, key: &str) -> StoreResult<Option<DistributionRecord>> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn insert(&self, key: &str, record: DistributionRecord) -> StoreResult<()> {
        self.records
            .write()
            .insert(key.to_string(), record.clone());
        self.emit(DistributionEvent::Added {
            key: key.to_string(),
            record,
        });
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<(String, DistributionRecord)>> {
        Ok(self
            .records
            .read()
            .iter()
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect())
    }

    async fn set_status(&self, key: &str, status: DistributionStatus) -> StoreResult<()> {
        let record = {
            let mut records = self.records.write();
            let record = records
                .get_mut(key)
                .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
            record.status = status;
            record.clone()
        };
        self.emit(DistributionEvent::Changed {
            key: key.to_string(),
            record,
        });
        Ok(())
    }

    async fn transition_status(
        &self,
        key: &str,
        expected: DistributionStatus,
        next: DistributionStatus,
    ) -> StoreResult<bool> {
        let record = {
            let mut records = self.records.write();
            let record = records
                .get_mut(key)
                .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
            if record.status != expected {
                return Ok(false);
            }
            record.status = next;
            record.clone()
        };
        self.emit(DistributionEvent::Changed {
            key: key.to_string(),
            record,
        });
        Ok(true)
    }

    async fn merge_info(&self, key: &str, info: &DistributionInfo) -> StoreResult<()> {
        let record = {
            let mut records = self.records.write();
            let record = records
                .get_mut(key)
                .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
            record.apply_info(info);
            record.clone()
        };
        self.emit(DistributionEvent::Changed {
            key: key.to_string(),
            record,
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<DistributionEvent> {
        self.events.subscribe()
    }
}
