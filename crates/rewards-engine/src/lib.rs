//! Reward distribution engine.
//!
//! Drives distribution records through their phase sequence (balance
//! snapshot, distributor build, claim batch execution) in reaction to
//! store notifications, and submits claim batches against the on-chain
//! distributor with bounded concurrency.

mod collaborators;
mod config;
mod listener;
pub mod mock;
mod retry;
mod submitter;

pub use collaborators::{BalanceUpdater, DistributorBuilder};
pub use config::{EngineConfig, RetryConfig, DEFAULT_CLAIM_POOL_WIDTH};
pub use listener::DistributionListener;
pub use submitter::{BatchSummary, ClaimBatchSubmitter};
