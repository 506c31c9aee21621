//! Content-addressed node storage behind the tree.

use std::collections::HashMap;

use ff::{PrimeField, PrimeFieldRepr};
use rollup_crypto::Fr;

/// Little-endian field bytes keying a stored node.
pub type NodeHash = [u8; 32];

/// One stored tree node. Children and leaf fields are field elements; a zero
/// child denotes an empty subtree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    Middle { left: Fr, right: Fr },
    Leaf { key: Fr, value: Fr },
}

const TAG_MIDDLE: u8 = 0;
const TAG_LEAF: u8 = 1;

impl Node {
    /// 65-byte record: tag byte plus two little-endian field elements.
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        let (tag, a, b) = match self {
            Node::Middle { left, right } => (TAG_MIDDLE, left, right),
            Node::Leaf { key, value } => (TAG_LEAF, key, value),
        };
        out[0] = tag;
        out[1..33].copy_from_slice(&fr_bytes(a));
        out[33..65].copy_from_slice(&fr_bytes(b));
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Node> {
        if bytes.len() != 65 {
            return None;
        }
        let a = fr_from_bytes(&bytes[1..33])?;
        let b = fr_from_bytes(&bytes[33..65])?;
        match bytes[0] {
            TAG_MIDDLE => Some(Node::Middle { left: a, right: b }),
            TAG_LEAF => Some(Node::Leaf { key: a, value: b }),
            _ => None,
        }
    }
}

pub(crate) fn fr_bytes(value: &Fr) -> NodeHash {
    let mut out = [0u8; 32];
    value
        .into_repr()
        .write_le(&mut out[..])
        .expect("32 bytes hold any field element");
    out
}

fn fr_from_bytes(bytes: &[u8]) -> Option<Fr> {
    rollup_crypto::fr_from_bytes_le(bytes).ok()
}

/// Node store interface; implementations must return exactly what was put.
pub trait Db {
    fn get(&self, key: &NodeHash) -> Option<Node>;
    fn put(&mut self, key: NodeHash, node: Node);
}

/// In-memory node store. Tracks which nodes were written since the last
/// drain, so a persistent layer can flush increments.
#[derive(Debug, Clone, Default)]
pub struct MemoryDb {
    nodes: HashMap<NodeHash, Node>,
    dirty: Vec<NodeHash>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashes written since the last call, in write order.
    pub fn drain_dirty(&mut self) -> Vec<(NodeHash, Node)> {
        let dirty = std::mem::take(&mut self.dirty);
        dirty
            .into_iter()
            .filter_map(|hash| self.nodes.get(&hash).map(|node| (hash, *node)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Db for MemoryDb {
    fn get(&self, key: &NodeHash) -> Option<Node> {
        self.nodes.get(key).copied()
    }

    fn put(&mut self, key: NodeHash, node: Node) {
        if self.nodes.insert(key, node).is_none() {
            self.dirty.push(key);
        }
    }
}
