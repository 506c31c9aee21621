use ff::Field;
use num_bigint::BigUint;
use rollup_crypto::{fr_from_u64, fr_to_biguint, poseidon, Fr};

use crate::{
    db::{fr_bytes, Db, Node, NodeHash},
    TreeError,
};

/// Witness of one `put`, in the shape the circuit's tree processor expects.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeUpdate {
    pub old_root: Fr,
    pub new_root: Fr,
    /// Top-down sibling path, padded with zeros to `n_levels + 1` entries.
    pub siblings: Vec<Fr>,
    /// Leaf displaced by a diverging insertion; zero otherwise.
    pub old_key: Fr,
    pub old_value: Fr,
    /// True when the written slot was empty (plain insertion).
    pub is_old0: bool,
}

/// Membership proof of a single leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct MerkleProof {
    pub root: Fr,
    pub key: Fr,
    pub value: Fr,
    pub siblings: Vec<Fr>,
}

impl MerkleProof {
    pub fn siblings_biguint(&self) -> Vec<BigUint> {
        self.siblings.iter().map(fr_to_biguint).collect()
    }
}

#[derive(Debug)]
enum Slot {
    Empty { depth: u32 },
    Leaf { depth: u32, key: Fr, value: Fr },
}

/// The sparse Merkle tree over a node store.
#[derive(Debug)]
pub struct MerkleTree<D> {
    db: D,
    root: Fr,
    n_levels: u32,
}

impl<D: Db> MerkleTree<D> {
    pub fn new(db: D, n_levels: u32) -> Self {
        assert!(n_levels >= 8 && n_levels <= 32, "unsupported tree depth");
        MerkleTree {
            db,
            root: Fr::zero(),
            n_levels,
        }
    }

    /// Re-opens a tree at a known root (all roots remain readable as long as
    /// their nodes are retained in `db`).
    pub fn with_root(db: D, n_levels: u32, root: Fr) -> Self {
        let mut tree = Self::new(db, n_levels);
        tree.root = root;
        tree
    }

    pub fn root(&self) -> Fr {
        self.root
    }

    pub fn root_biguint(&self) -> BigUint {
        fr_to_biguint(&self.root)
    }

    pub fn n_levels(&self) -> u32 {
        self.n_levels
    }

    pub fn db_mut(&mut self) -> &mut D {
        &mut self.db
    }

    /// Inserts or updates the leaf at `key`, returning the circuit witness.
    pub fn put(&mut self, key: u64, value: Fr) -> Result<TreeUpdate, TreeError> {
        let old_root = self.root;
        let key_fr = fr_from_u64(key);
        let (slot, mut siblings) = self.descend(key)?;

        let leaf_hash = self.store_leaf(key_fr, value)?;
        let (mut hash, from_depth, old_key, old_value, is_old0) = match slot {
            Slot::Empty { depth } => (leaf_hash, depth, Fr::zero(), Fr::zero(), true),
            Slot::Leaf {
                depth,
                key: found_key,
                value: found_value,
            } if found_key == key_fr => (leaf_hash, depth, found_key, found_value, false),
            Slot::Leaf {
                depth,
                key: found_key,
                value: found_value,
            } => {
                // Diverging keys: push both leaves down to the first bit
                // where their paths differ.
                let found_key_bits = biguint_low_u64(&fr_to_biguint(&found_key));
                let mut split = depth;
                while bit(key, split) == bit(found_key_bits, split) {
                    split += 1;
                    if split >= self.n_levels {
                        return Err(TreeError::MaxLevelReached(self.n_levels));
                    }
                }
                let found_leaf_hash = self.store_leaf(found_key, found_value)?;
                let mut hash = if bit(key, split) {
                    self.store_middle(found_leaf_hash, leaf_hash)?
                } else {
                    self.store_middle(leaf_hash, found_leaf_hash)?
                };
                for d in (depth..split).rev() {
                    hash = if bit(key, d) {
                        self.store_middle(Fr::zero(), hash)?
                    } else {
                        self.store_middle(hash, Fr::zero())?
                    };
                }
                (hash, depth, found_key, found_value, false)
            }
        };

        for d in (0..from_depth).rev() {
            let sibling = siblings[d as usize];
            hash = if bit(key, d) {
                self.store_middle(sibling, hash)?
            } else {
                self.store_middle(hash, sibling)?
            };
        }
        self.root = hash;

        siblings.resize(self.n_levels as usize + 1, Fr::zero());
        Ok(TreeUpdate {
            old_root,
            new_root: self.root,
            siblings,
            old_key,
            old_value,
            is_old0,
        })
    }

    /// Value and sibling path of the leaf at `key`. The path is unpadded:
    /// its length is the depth the leaf actually sits at.
    pub fn get(&self, key: u64) -> Result<(Fr, Vec<Fr>), TreeError> {
        let key_fr = fr_from_u64(key);
        let (slot, siblings) = self.descend(key)?;
        match slot {
            Slot::Leaf { key: found, value, .. } if found == key_fr => Ok((value, siblings)),
            _ => Err(TreeError::KeyNotFound),
        }
    }

    pub fn contains(&self, key: u64) -> Result<bool, TreeError> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(TreeError::KeyNotFound) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Membership proof against the current root.
    pub fn get_proof(&self, key: u64) -> Result<MerkleProof, TreeError> {
        let (value, siblings) = self.get(key)?;
        Ok(MerkleProof {
            root: self.root,
            key: fr_from_u64(key),
            value,
            siblings,
        })
    }

    /// Walks from the root along the key's bit path until an empty slot or a
    /// leaf, recording the sibling at every traversed level.
    fn descend(&self, key: u64) -> Result<(Slot, Vec<Fr>), TreeError> {
        let mut siblings = Vec::with_capacity(self.n_levels as usize);
        let mut current = self.root;
        let mut depth = 0u32;
        loop {
            if current.is_zero() {
                return Ok((Slot::Empty { depth }, siblings));
            }
            let node = self
                .db
                .get(&fr_bytes(&current))
                .ok_or_else(|| TreeError::MissingNode(format!("{current}")))?;
            match node {
                Node::Leaf { key, value } => {
                    return Ok((Slot::Leaf { depth, key, value }, siblings));
                }
                Node::Middle { left, right } => {
                    if depth >= self.n_levels {
                        return Err(TreeError::MaxLevelReached(self.n_levels));
                    }
                    if bit(key, depth) {
                        siblings.push(left);
                        current = right;
                    } else {
                        siblings.push(right);
                        current = left;
                    }
                    depth += 1;
                }
            }
        }
    }

    fn store_leaf(&mut self, key: Fr, value: Fr) -> Result<Fr, TreeError> {
        let hash = leaf_hash(key, value)?;
        self.db.put(fr_bytes(&hash), Node::Leaf { key, value });
        Ok(hash)
    }

    fn store_middle(&mut self, left: Fr, right: Fr) -> Result<Fr, TreeError> {
        let hash = middle_hash(left, right)?;
        self.db.put(fr_bytes(&hash), Node::Middle { left, right });
        Ok(hash)
    }
}

fn bit(key: u64, depth: u32) -> bool {
    (key >> depth) & 1 == 1
}

fn biguint_low_u64(value: &BigUint) -> u64 {
    let digits = value.to_u64_digits();
    digits.first().copied().unwrap_or(0)
}

fn leaf_hash(key: Fr, value: Fr) -> Result<Fr, TreeError> {
    let one = fr_from_u64(1);
    Ok(poseidon::hash(&[key, value, one])?)
}

fn middle_hash(left: Fr, right: Fr) -> Result<Fr, TreeError> {
    Ok(poseidon::hash(&[left, right])?)
}

/// Recomputes a membership proof bottom-up; `siblings` is the top-down,
/// unpadded path returned by [`MerkleTree::get_proof`], so its length is the
/// leaf's depth.
pub fn verify_proof(proof: &MerkleProof) -> bool {
    let key_bits = biguint_low_u64(&fr_to_biguint(&proof.key));
    let Ok(mut hash) = leaf_hash(proof.key, proof.value) else {
        return false;
    };
    for (d, sibling) in proof.siblings.iter().enumerate().rev() {
        let combined = if bit(key_bits, d as u32) {
            middle_hash(*sibling, hash)
        } else {
            middle_hash(hash, *sibling)
        };
        match combined {
            Ok(h) => hash = h,
            Err(_) => return false,
        }
    }
    hash == proof.root
}
