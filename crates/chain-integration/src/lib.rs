//! On-chain distributor surface and Merkle document access.
//!
//! The distributor contract and the document storage are external
//! collaborators. This crate defines the traits the pipeline consumes,
//! a filesystem-backed document store, and mock implementations for tests.

mod distributor;
mod documents;
pub mod mock;

pub use distributor::{ClaimReceipt, DistributorProvider, MerkleDistributor};
pub use documents::{DocumentStore, FsDocumentStore};
