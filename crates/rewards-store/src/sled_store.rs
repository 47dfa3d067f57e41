//! Durable sled-backed store.
//!
//! Records are stored JSON-encoded in a `distributions` tree so the on-disk
//! layout matches the external record format. Read-modify-write operations
//! are serialized by an in-process lock; notifications are emitted after the
//! write has landed in the tree.

use crate::{DistributionEvent, DistributionStore, StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use rewards_core::{DistributionInfo, DistributionRecord, DistributionStatus};
use sled::Tree;
use std::path::Path;
use tokio::sync::broadcast;

/// Distribution store persisted in a sled database.
pub struct SledDistributionStore {
    db: sled::Db,
    tree: Tree,
    write_lock: Mutex<()>,
    events: broadcast::Sender<DistributionEvent>,
}

impl SledDistributionStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::with_db(db)
    }

    /// In-memory sled database, for tests.
    pub fn temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::with_db(db)
    }

    fn with_db(db: sled::Db) -> StoreResult<Self> {
        let tree = db.open_tree("distributions")?;
        let (events, _) = broadcast::channel(256);
        Ok(Self {
            db,
            tree,
            write_lock: Mutex::new(()),
            events,
        })
    }

    /// Flush dirty buffers to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn read(&self, key: &str) -> StoreResult<Option<DistributionRecord>> {
        match self.tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write(&self, key: &str, record: &DistributionRecord) -> StoreResult<()> {
        let bytes = serde_json::to_vec(record)?;
        self.tree.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    /// Read-modify-write an existing record under the write lock.
    fn update<F>(&self, key: &str, apply: F) -> StoreResult<DistributionRecord>
    where
        F: FnOnce(&mut DistributionRecord),
    {
        let _guard = self.write_lock.lock();
        let mut record = self
            .read(key)?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        apply(&mut record);
        self.write(key, &record)?;
        Ok(record)
    }

    fn emit(&self, event: DistributionEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl DistributionStore for SledDistributionStore {
    async fn get(&self, key: &str) -> StoreResult<Option<DistributionRecord>> {
        self.read(key)
    }

    async fn insert(&self, key: &str, record: DistributionRecord) -> StoreResult<()> {
        {
            let _guard = self.write_lock.lock();
            self.write(key, &record)?;
        }
        self.emit(DistributionEvent::Added {
            key: key.to_string(),
            record,
        });
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<(String, DistributionRecord)>> {
        let mut records = Vec::new();
        for entry in self.tree.iter() {
            let (key, bytes) = entry?;
            let key = String::from_utf8_lossy(&key).into_owned();
            let record: DistributionRecord = serde_json::from_slice(&bytes)?;
            records.push((key, record));
        }
        Ok(records)
    }

    async fn set_status(&self, key: &str, status: DistributionStatus) -> StoreResult<()> {
        let record = self.update(key, |record| record.status = status)?;
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
            let _guard = self.write_lock.lock();
            let mut record = self
                .read(key)?
                .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
            if record.status != expected {
                return Ok(false);
            }
            record.status = next;
            self.write(key, &record)?;
            record
        };
        self.emit(DistributionEvent::Changed {
            key: key.to_string(),
            record,
        });
        Ok(true)
    }

    async fn merge_info(&self, key: &str, info: &DistributionInfo) -> StoreResult<()> {
        let record = self.update(key, |record| record.apply_info(info))?;
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
