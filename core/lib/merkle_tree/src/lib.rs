//! Sparse binary Merkle tree committing the rollup account state.
//!
//! Leaves hash as `Poseidon([key, value, 1])`, internal nodes as
//! `Poseidon([left, right])`, and empty subtrees as zero, so the empty tree
//! root is zero. A leaf sits at the shallowest depth at which its key's
//! little-endian bit path is unique; every update returns the witness the
//! circuit's tree processor consumes (siblings, displaced leaf, flags).
//!
//! Nodes are content-addressed in a pluggable [`Db`], which makes any
//! historical root readable as long as its nodes are retained — the
//! mechanism the StateDB layers checkpointing on.

use thiserror::Error;

mod db;
mod tree;

pub use self::{
    db::{Db, MemoryDb, Node, NodeHash},
    tree::{verify_proof, MerkleProof, MerkleTree, TreeUpdate},
};

/// All kinds of Merkle tree errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeError {
    #[error("key not present in the tree")]
    KeyNotFound,
    #[error("key collides through all {0} levels")]
    MaxLevelReached(u32),
    #[error("node {0} referenced but not stored")]
    MissingNode(String),
    #[error(transparent)]
    Crypto(#[from] rollup_crypto::CryptoError),
}
