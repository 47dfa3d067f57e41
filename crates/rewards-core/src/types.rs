//! Distribution records, Merkle documents, and claim entries.
//!
//! Field names serialize in camelCase to match the persisted record layout
//! and the Merkle document format produced by the distributor builder.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Lifecycle phase of a reward distribution.
///
/// A record only ever advances forward through these phases; `Done` is
/// terminal. `StartDistribution` is set by an operator, never by the
/// pipeline itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistributionStatus {
    Pending,
    UpdatingBalances,
    CalculatingRewards,
    DistributionCreated,
    StartDistribution,
    Distributing,
    Done,
}

impl DistributionStatus {
    /// Whether the pipeline is finished with this distribution.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DistributionStatus::Done)
    }

    /// Whether this status marks a phase that was executing when the record
    /// was last persisted. A record observed in one of these at startup was
    /// interrupted mid-phase.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            DistributionStatus::UpdatingBalances
                | DistributionStatus::CalculatingRewards
                | DistributionStatus::Distributing
        )
    }
}

impl fmt::Display for DistributionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// One reward-distribution run as persisted in the distribution store.
///
/// Records are created externally in `Pending` and never deleted by the
/// pipeline; the pipeline mutates `status` and merges the builder result
/// fields, nothing else.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionRecord {
    pub status: DistributionStatus,

    /// First block of the balance snapshot range. Zero is a valid value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_block: Option<u64>,

    /// Last block of the balance snapshot range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_block: Option<u64>,

    /// Terminate at `Done` after the balance update, with no on-chain
    /// distributor ever built.
    #[serde(default)]
    pub skip_distribution: bool,

    /// Address of the deployed distributor contract, set by the builder
    /// result merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,

    /// Reference to the generated Merkle document, set by the builder
    /// result merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_tree: Option<String>,

    /// Any other fields carried by the record (token address, totals, ...),
    /// persisted verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DistributionRecord {
    /// A fresh record covering the given block range.
    pub fn pending(from_block: u64, to_block: u64) -> Self {
        Self {
            status: DistributionStatus::Pending,
            from_block: Some(from_block),
            to_block: Some(to_block),
            skip_distribution: false,
            contract_address: None,
            merkle_tree: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Merge a builder result into the record and mark it created.
    pub fn apply_info(&mut self, info: &DistributionInfo) {
        self.status = DistributionStatus::DistributionCreated;
        self.contract_address = Some(info.contract_address.clone());
        self.merkle_tree = Some(info.merkle_tree.clone());
        for (field, value) in &info.extra {
            self.extra.insert(field.clone(), value.clone());
        }
    }
}

/// Result of the Merkle Distributor Builder collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionInfo {
    pub contract_address: String,
    pub merkle_tree: String,

    /// Anything else the builder reports; merged into the record verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DistributionInfo {
    pub fn new(contract_address: impl Into<String>, merkle_tree: impl Into<String>) -> Self {
        Self {
            contract_address: contract_address.into(),
            merkle_tree: merkle_tree.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// A generated Merkle document: the root plus the claim leaf for every
/// eligible account. Read-only input to the claim batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleDocument {
    pub merkle_root: String,
    pub claims: HashMap<String, ClaimEntry>,
}

/// One claim leaf. `amount` and `proof` are opaque values passed to the
/// contract verbatim; `index` is the unique leaf position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimEntry {
    pub index: u64,
    pub amount: String,
    pub proof: Vec<String>,
}
