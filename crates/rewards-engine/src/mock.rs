//! Mock collaborators for tests.

use crate::collaborators::{BalanceUpdater, DistributorBuilder};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rewards_core::DistributionInfo;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Balance updater with an in-memory watermark that records every
/// invocation and can be told to fail a number of times first.
pub struct MockBalanceUpdater {
    watermark: AtomicU64,
    calls: Mutex<Vec<(u64, u64)>>,
    failures_remaining: AtomicU32,
}

impl MockBalanceUpdater {
    pub fn new(watermark: u64) -> Self {
        Self {
            watermark: AtomicU64::new(watermark),
            calls: Mutex::new(Vec::new()),
            failures_remaining: AtomicU32::new(0),
        }
    }

    /// Make the next `times` update calls fail.
    pub fn fail_next(&self, times: u32) {
        self.failures_remaining.store(times, Ordering::SeqCst);
    }

    /// Successful invocations, as `(previous_watermark, new_watermark)`.
    pub fn calls(&self) -> Vec<(u64, u64)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl BalanceUpdater for MockBalanceUpdater {
    async fn latest_updated_block(&self) -> Result<u64> {
        Ok(self.watermark.load(Ordering::SeqCst))
    }

    async fn update_partial_balances(
        &self,
        previous_watermark: u64,
        new_watermark: u64,
    ) -> Result<()> {
        if self.failures_remaining.load(Ordering::SeqCst) > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(anyhow!("balance backend unavailable"));
        }
        self.calls.lock().push((previous_watermark, new_watermark));
        self.watermark.store(new_watermark, Ordering::SeqCst);
        Ok(())
    }
}

/// Distributor builder returning a fixed result.
pub struct MockDistributorBuilder {
    info: DistributionInfo,
    calls: Mutex<Vec<(u64, u64)>>,
}

impl MockDistributorBuilder {
    pub fn new(info: DistributionInfo) -> Self {
        Self {
            info,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Builder that deploys to `contract_address` and writes `merkle_tree`.
    pub fn returning(contract_address: &str, merkle_tree: &str) -> Self {
        Self::new(DistributionInfo::new(contract_address, merkle_tree))
    }

    /// Invocations, as `(from_block, to_block)`.
    pub fn calls(&self) -> Vec<(u64, u64)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl DistributorBuilder for MockDistributorBuilder {
    async fn create_and_deploy(&self, from_block: u64, to_block: u64) -> Result<DistributionInfo> {
        self.calls.lock().push((from_block, to_block));
        Ok(self.info.clone())
    }
}
