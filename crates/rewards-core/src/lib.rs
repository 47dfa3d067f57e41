//! Shared types for the reward distribution pipeline.

mod types;

pub use types::{
    ClaimEntry, DistributionInfo, DistributionRecord, DistributionStatus, MerkleDocument,
};
