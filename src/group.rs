//! Group state: the membership tree plus the window of roots a verifier
//! still honors.

use crate::error::TreeError;
use crate::identity::IdentityCommitment;
use crate::merkle::{MembershipTree, MerkleProof};
use crate::utils::{field_to_hex, FieldElement};
use log::{debug, info};
use std::collections::VecDeque;

/// Default number of recent roots accepted by the relay.
pub const DEFAULT_ROOT_HISTORY_WINDOW: usize = 30;

/// The last `window` roots, newest first.
///
/// A window of 1 accepts only the current root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootHistory {
    window: usize,
    roots: VecDeque<FieldElement>,
}

impl RootHistory {
    /// A history seeded with `initial`. A `window` of zero is treated as 1.
    #[must_use]
    pub fn new(window: usize, initial: FieldElement) -> Self {
        let window = window.max(1);
        let mut roots = VecDeque::with_capacity(window);
        roots.push_front(initial);
        Self { window, roots }
    }

    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    pub fn push(&mut self, root: FieldElement) {
        self.roots.push_front(root);
        self.roots.truncate(self.window);
    }

    #[must_use]
    pub fn contains(&self, root: &FieldElement) -> bool {
        self.roots.contains(root)
    }

    #[must_use]
    pub fn latest(&self) -> FieldElement {
        // never empty: seeded in `new`, `truncate` keeps at least one
        self.roots[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldElement> {
        self.roots.iter()
    }
}

/// Tree and root history, kept in step on every insertion.
#[derive(Debug, Clone)]
pub struct GroupState {
    tree: MembershipTree,
    history: RootHistory,
}

impl GroupState {
    /// Empty group.
    ///
    /// # Errors
    /// Fails on an invalid depth.
    pub fn new(depth: usize, root_window: usize) -> Result<Self, TreeError> {
        let tree = MembershipTree::new(depth)?;
        let history = RootHistory::new(root_window, tree.current_root());
        Ok(Self { tree, history })
    }

    /// Group built from the published commitment list. Every intermediate
    /// root enters the history, so proofs made against a recent snapshot of
    /// the feed are still accepted.
    ///
    /// # Errors
    /// Fails on an invalid depth or if the list exceeds the capacity.
    pub fn from_commitments<I>(depth: usize, root_window: usize, commitments: I) -> Result<Self, TreeError>
    where
        I: IntoIterator<Item = IdentityCommitment>,
    {
        let mut group = Self::new(depth, root_window)?;
        for commitment in commitments {
            group.add_member(commitment)?;
        }
        info!(
            "Loaded group with {} members, root {}",
            group.tree.len(),
            field_to_hex(group.current_root())
        );
        Ok(group)
    }

    /// Appends a member and records the new root.
    ///
    /// # Errors
    /// Returns [`TreeError::CapacityExceeded`] when the tree is full.
    pub fn add_member(&mut self, commitment: IdentityCommitment) -> Result<usize, TreeError> {
        let index = self.tree.insert(commitment)?;
        self.history.push(self.tree.current_root());
        debug!(
            "Added member {} at index {}, root {}",
            field_to_hex(commitment),
            index,
            field_to_hex(self.tree.current_root())
        );
        Ok(index)
    }

    /// # Errors
    /// Returns [`TreeError::UnknownLeaf`] for an absent index.
    pub fn prove_membership(&self, leaf_index: usize) -> Result<MerkleProof, TreeError> {
        self.tree.prove_membership(leaf_index)
    }

    #[must_use]
    pub fn current_root(&self) -> FieldElement {
        self.tree.current_root()
    }

    #[must_use]
    pub fn is_root_accepted(&self, root: &FieldElement) -> bool {
        self.history.contains(root)
    }

    #[must_use]
    pub fn tree(&self) -> &MembershipTree {
        &self.tree
    }

    #[must_use]
    pub fn history(&self) -> &RootHistory {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pasta_curves::pallas;

    #[test]
    fn test_history_keeps_newest_roots() {
        let mut history = RootHistory::new(2, pallas::Base::from(1));
        history.push(pallas::Base::from(2));
        history.push(pallas::Base::from(3));
        assert!(!history.contains(&pallas::Base::from(1)));
        assert!(history.contains(&pallas::Base::from(2)));
        assert!(history.contains(&pallas::Base::from(3)));
        assert_eq!(history.latest(), pallas::Base::from(3));
        assert_eq!(history.iter().count(), 2);
    }

    #[test]
    fn test_zero_window_behaves_as_latest_only() {
        let mut history = RootHistory::new(0, pallas::Base::from(1));
        assert_eq!(history.window(), 1);
        history.push(pallas::Base::from(2));
        assert!(!history.contains(&pallas::Base::from(1)));
        assert!(history.contains(&pallas::Base::from(2)));
    }

    #[test]
    fn test_group_tracks_roots_on_insert() {
        let mut group = GroupState::new(3, 2).unwrap();
        let empty_root = group.current_root();
        group.add_member(pallas::Base::from(10)).unwrap();
        let first_root = group.current_root();
        assert!(group.is_root_accepted(&empty_root));
        assert!(group.is_root_accepted(&first_root));

        group.add_member(pallas::Base::from(11)).unwrap();
        assert!(!group.is_root_accepted(&empty_root));
        assert!(group.is_root_accepted(&first_root));
        assert!(group.is_root_accepted(&group.current_root()));
    }

    #[test]
    fn test_from_commitments_matches_tree() {
        let commitments: Vec<_> = (1..=4u64).map(pallas::Base::from).collect();
        let group = GroupState::from_commitments(3, 5, commitments.clone()).unwrap();
        let tree = MembershipTree::from_leaves(3, commitments).unwrap();
        assert_eq!(group.current_root(), tree.current_root());
        assert_eq!(group.tree().len(), 4);
        assert!(group.prove_membership(3).unwrap().verify());
    }
}
