//! Append-only, fixed-depth Merkle tree over identity commitments.
//!
//! Empty positions hold the zero field element, so the root of a tree with
//! `n` leaves is well defined for any `n <= 2^depth`. Internal nodes are
//! `poseidon(left, right)`. Nodes that differ from the all-zero subtree are
//! cached per level, which keeps insertion at `O(depth)`.

use crate::error::TreeError;
use crate::identity::IdentityCommitment;
use crate::utils::{field_to_hex, poseidon_hash, FieldElement};
use log::debug;
use pasta_curves::pallas;
use std::fmt;

/// Deepest tree the crate will build (`2^32` leaves).
pub const MAX_TREE_DEPTH: usize = 32;

/// Inclusion proof for one leaf.
///
/// `path_indices[i] == 1` means the running node is the right child at
/// level `i`, i.e. `path_elements[i]` is hashed on the left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    pub leaf: IdentityCommitment,
    pub path_elements: Vec<FieldElement>,
    pub path_indices: Vec<u8>,
    pub root: FieldElement,
}

impl MerkleProof {
    #[must_use]
    pub fn depth(&self) -> usize {
        self.path_elements.len()
    }

    /// Leaf position encoded by `path_indices`, or `None` if any index is
    /// not a bit or the path is too deep to fit in `usize`.
    #[must_use]
    pub fn leaf_index(&self) -> Option<usize> {
        if self.path_indices.len() > usize::BITS as usize {
            return None;
        }
        self.path_indices
            .iter()
            .enumerate()
            .try_fold(0usize, |acc, (level, bit)| match bit {
                0 => Some(acc),
                1 => Some(acc | (1 << level)),
                _ => None,
            })
    }

    /// Folds `leaf` up the path. Needs no access to the tree.
    ///
    /// Returns `None` if the path is malformed.
    #[must_use]
    pub fn compute_root(&self) -> Option<FieldElement> {
        if self.path_elements.len() != self.path_indices.len() {
            return None;
        }

        let mut current = self.leaf;
        for (sibling, bit) in self.path_elements.iter().zip(&self.path_indices) {
            current = match bit {
                0 => poseidon_hash(current, *sibling),
                1 => poseidon_hash(*sibling, current),
                _ => return None,
            };
        }
        Some(current)
    }

    /// True if the path folds to `self.root`.
    #[must_use]
    pub fn verify(&self) -> bool {
        self.compute_root() == Some(self.root)
    }
}

impl fmt::Display for MerkleProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MerkleProof:\n  Leaf: {}\n  Root: {}\n  Index: {}\n  Depth: {}",
            field_to_hex(self.leaf),
            field_to_hex(self.root),
            self.leaf_index()
                .map_or_else(|| "invalid".to_string(), |i| i.to_string()),
            self.depth()
        )
    }
}

/// The group's membership tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipTree {
    depth: usize,
    /// `zeros[l]` is the root of an empty subtree of height `l`.
    zeros: Vec<FieldElement>,
    /// `levels[0]` are the leaves; `levels[l][i]` is node `i` at height `l`.
    levels: Vec<Vec<FieldElement>>,
    root: FieldElement,
}

impl MembershipTree {
    /// Creates an empty tree of the given depth.
    ///
    /// # Errors
    /// Returns [`TreeError::InvalidDepth`] unless `1 <= depth <= MAX_TREE_DEPTH`.
    pub fn new(depth: usize) -> Result<Self, TreeError> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(TreeError::InvalidDepth {
                depth,
                max: MAX_TREE_DEPTH,
            });
        }

        let mut zeros = Vec::with_capacity(depth + 1);
        zeros.push(pallas::Base::zero());
        for level in 0..depth {
            let below = zeros[level];
            zeros.push(poseidon_hash(below, below));
        }

        Ok(Self {
            depth,
            root: zeros[depth],
            zeros,
            levels: vec![Vec::new(); depth + 1],
        })
    }

    /// Builds a tree from an ordered leaf list, such as the published
    /// commitment feed.
    ///
    /// # Errors
    /// Fails on an invalid depth or if the list exceeds the capacity.
    pub fn from_leaves<I>(depth: usize, leaves: I) -> Result<Self, TreeError>
    where
        I: IntoIterator<Item = IdentityCommitment>,
    {
        let mut tree = Self::new(depth)?;
        for leaf in leaves {
            tree.insert(leaf)?;
        }
        debug!(
            "Built membership tree: depth={}, leaves={}, root={}",
            depth,
            tree.len(),
            field_to_hex(tree.root)
        );
        Ok(tree)
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    #[must_use]
    pub fn current_root(&self) -> FieldElement {
        self.root
    }

    /// Position of the first leaf equal to `commitment`.
    #[must_use]
    pub fn index_of(&self, commitment: IdentityCommitment) -> Option<usize> {
        self.levels[0].iter().position(|leaf| *leaf == commitment)
    }

    fn node(&self, level: usize, index: usize) -> FieldElement {
        self.levels[level]
            .get(index)
            .copied()
            .unwrap_or(self.zeros[level])
    }

    /// Appends a commitment and returns its leaf index.
    ///
    /// # Errors
    /// Returns [`TreeError::CapacityExceeded`] once `2^depth` leaves are present.
    pub fn insert(&mut self, commitment: IdentityCommitment) -> Result<usize, TreeError> {
        let leaf_index = self.len();
        if leaf_index as u64 >= self.capacity() {
            return Err(TreeError::CapacityExceeded {
                capacity: self.capacity(),
            });
        }

        self.levels[0].push(commitment);

        let mut index = leaf_index;
        for level in 0..self.depth {
            let left = self.node(level, index & !1);
            let right = self.node(level, index | 1);
            let parent = poseidon_hash(left, right);

            let parent_index = index >> 1;
            let parents = &mut self.levels[level + 1];
            if parent_index < parents.len() {
                parents[parent_index] = parent;
            } else {
                parents.push(parent);
            }
            index = parent_index;
        }
        self.root = self.levels[self.depth][0];

        Ok(leaf_index)
    }

    /// Builds the inclusion proof for the leaf at `leaf_index` against the
    /// current root.
    ///
    /// # Errors
    /// Returns [`TreeError::UnknownLeaf`] if no leaf is stored at that index.
    pub fn prove_membership(&self, leaf_index: usize) -> Result<MerkleProof, TreeError> {
        if leaf_index >= self.len() {
            return Err(TreeError::UnknownLeaf {
                index: leaf_index,
                len: self.len(),
            });
        }

        let mut path_elements = Vec::with_capacity(self.depth);
        let mut path_indices = Vec::with_capacity(self.depth);
        let mut index = leaf_index;
        for level in 0..self.depth {
            path_elements.push(self.node(level, index ^ 1));
            path_indices.push((index & 1) as u8);
            index >>= 1;
        }

        Ok(MerkleProof {
            leaf: self.levels[0][leaf_index],
            path_elements,
            path_indices,
            root: self.root,
        })
    }
}
