//! Merkle Tree for Note Commitments
//!
//! Sparse, append-only Poseidon tree over note commitments. The pool side
//! (chain gateway) owns one; wallets only ever hold `MerklePath`s handed out
//! by it.
//!
//! ```text
//!                    Root
//!                   /    \
//!                 H01    H23
//!                /  \   /   \
//!               H0  H1 H2   H3
//!               |   |   |    |
//!              C0  C1  C2   C3  (Note Commitments)
//! ```

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::commitment::{Commitment, Digest};
use crate::poseidon::{self, DOMAIN_EMPTY_LEAF, DOMAIN_NODE};

/// Tree depth (supports 2^32 notes)
pub const TREE_DEPTH: usize = 32;

/// A Merkle path proving inclusion of a note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    /// Sibling hashes from leaf to root
    pub siblings: Vec<Digest>,
    /// Position bits (false = left, true = right)
    pub path_bits: Vec<bool>,
    /// The leaf position
    pub position: u64,
}

impl MerklePath {
    /// Verify that this path proves inclusion of `leaf` under `root`
    pub fn verify(&self, leaf: &Commitment, root: &Digest) -> bool {
        if self.siblings.len() != TREE_DEPTH || self.path_bits.len() != TREE_DEPTH {
            return false;
        }
        // path bits must spell out the claimed position
        let encoded = self
            .path_bits
            .iter()
            .enumerate()
            .all(|(level, bit)| ((self.position >> level) & 1 == 1) == *bit);
        if !encoded {
            return false;
        }

        &self.root(leaf) == root
    }

    /// Root this path implies for `leaf`
    pub fn root(&self, leaf: &Commitment) -> Digest {
        root_from_path(&leaf.0, &self.siblings, &self.path_bits)
    }
}

/// Hash two children to get parent
pub fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    poseidon::hash(
        DOMAIN_NODE,
        &[poseidon::from_bytes(left), poseidon::from_bytes(right)],
    )
}

fn root_from_path(leaf: &Digest, siblings: &[Digest], path_bits: &[bool]) -> Digest {
    siblings
        .iter()
        .zip(path_bits)
        .fold(*leaf, |current, (sibling, is_right)| {
            if *is_right {
                hash_pair(sibling, &current)
            } else {
                hash_pair(&current, sibling)
            }
        })
}

/// Roots of empty subtrees, index = height
fn empty_roots() -> Vec<Digest> {
    let mut roots = Vec::with_capacity(TREE_DEPTH + 1);
    let mut current = poseidon::hash(DOMAIN_EMPTY_LEAF, &[]);
    roots.push(current);
    for _ in 0..TREE_DEPTH {
        current = hash_pair(&current, &current);
        roots.push(current);
    }
    roots
}

/// Sparse Merkle Tree for note commitments
///
/// Only non-empty nodes are stored.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// Non-empty nodes: (level, index) -> hash
    nodes: HashMap<(usize, u64), Digest>,
    /// Next available leaf position
    next_index: u64,
    empty: Vec<Digest>,
    root: Digest,
}

impl MerkleTree {
    /// Create a new empty tree
    pub fn new() -> Self {
        let empty = empty_roots();
        let root = empty[TREE_DEPTH];

        Self {
            nodes: HashMap::new(),
            next_index: 0,
            empty,
            root,
        }
    }

    /// Get current root
    pub fn root(&self) -> Digest {
        self.root
    }

    /// Root of a tree with no leaves
    pub fn empty_root(&self) -> Digest {
        self.empty[TREE_DEPTH]
    }

    /// Number of leaves appended so far
    pub fn len(&self) -> u64 {
        self.next_index
    }

    pub fn is_empty(&self) -> bool {
        self.next_index == 0
    }

    /// Append a commitment and return its position
    pub fn append(&mut self, commitment: &Commitment) -> u64 {
        let position = self.next_index;
        self.nodes.insert((0, position), commitment.0);

        let mut index = position;
        let mut current = commitment.0;
        for level in 0..TREE_DEPTH {
            let sibling = self.node(level, index ^ 1);
            current = if index & 1 == 1 {
                hash_pair(&sibling, &current)
            } else {
                hash_pair(&current, &sibling)
            };
            index >>= 1;
            self.nodes.insert((level + 1, index), current);
        }

        self.root = current;
        self.next_index += 1;
        position
    }

    /// Get Merkle path for a position
    pub fn path(&self, position: u64) -> Option<MerklePath> {
        if position >= self.next_index {
            return None;
        }

        let mut siblings = Vec::with_capacity(TREE_DEPTH);
        let mut path_bits = Vec::with_capacity(TREE_DEPTH);
        let mut index = position;

        for level in 0..TREE_DEPTH {
            path_bits.push(index & 1 == 1);
            siblings.push(self.node(level, index ^ 1));
            index >>= 1;
        }

        Some(MerklePath {
            siblings,
            path_bits,
            position,
        })
    }

    /// Get commitment at position
    pub fn get(&self, position: u64) -> Option<Commitment> {
        self.nodes.get(&(0, position)).map(|h| Commitment(*h))
    }

    fn node(&self, level: usize, index: u64) -> Digest {
        self.nodes
            .get(&(level, index))
            .copied()
            .unwrap_or(self.empty[level])
    }
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Recent roots, so proofs built against a slightly stale root still land.
#[derive(Debug, Clone, Default)]
pub struct RootHistory {
    /// Most recent at the back
    roots: VecDeque<Digest>,
    max_size: usize,
}

impl RootHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            roots: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    pub fn push(&mut self, root: Digest) {
        self.roots.push_back(root);
        while self.roots.len() > self.max_size {
            self.roots.pop_front();
        }
    }

    /// Check if a root is current or recent
    pub fn is_valid(&self, root: &Digest) -> bool {
        self.roots.contains(root)
    }

    pub fn current(&self) -> Option<&Digest> {
        self.roots.back()
    }
}
