//! Key-indexed node collection for one tree under construction.
//!
//! A [`TreeBuilder`] owns its nodes in an insertion-ordered map keyed by
//! caller-chosen [`NodeKey`]s. Nodes are configured through the keyed
//! mutators (or a [`NodeMut`] handle); every mutator requires the key to be
//! registered first.
//!
//! # Example
//!
//! ```
//! use treeforge::builder::{Operator, TreeBuilder};
//!
//! let mut tree = TreeBuilder::new();
//! let mut root = tree.get_or_create(0);
//! root.set_numerical_test(2, Operator::Lt, 0.5, true, 1, 2).unwrap();
//! root.set_root().unwrap();
//!
//! // Children were created implicitly.
//! tree.set_leaf(1, 0.3f32).unwrap();
//! tree.set_leaf(2, -0.3f32).unwrap();
//! assert_eq!(tree.len(), 3);
//! assert_eq!(tree.root(), Some(0));
//! ```

use indexmap::IndexMap;

use super::categories::CategoryMask;
use super::node::{CategoricalSplit, LeafValue, Node, NodeState, NumericalSplit, Operator};
use super::NodeKey;
use crate::error::{Error, Result};

/// One decision tree under construction.
#[derive(Debug, Clone, Default)]
pub struct TreeBuilder {
    nodes: IndexMap<NodeKey, Node>,
    root: Option<NodeKey>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Map interface
    // =========================================================================

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    /// Look up a node without side effects.
    #[inline]
    pub fn get(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(&key)
    }

    /// Look up a node, inserting a fresh empty node if `key` is missing.
    pub fn get_or_create(&mut self, key: NodeKey) -> NodeMut<'_> {
        self.nodes.entry(key).or_default();
        NodeMut { tree: self, key }
    }

    /// Handle to an existing node.
    pub fn node_mut(&mut self, key: NodeKey) -> Result<NodeMut<'_>> {
        if !self.contains(key) {
            return Err(Error::UnregisteredNode { key });
        }
        Ok(NodeMut { tree: self, key })
    }

    /// Register `node` under `key`.
    ///
    /// Fails with [`Error::DuplicateKey`] if the key is taken (whatever the
    /// state of `node`) and with [`Error::NonEmptyInsertion`] if `node` is
    /// already configured.
    ///
    /// A test node that still names `key` as a child becomes the parent of the
    /// inserted node.
    pub fn insert(&mut self, key: NodeKey, node: Node) -> Result<()> {
        if self.contains(key) {
            return Err(Error::DuplicateKey { key });
        }
        if !node.is_empty() {
            return Err(Error::NonEmptyInsertion { key });
        }
        let parent = self.nodes.iter().find_map(|(&k, n)| match n.children() {
            Some((left, right)) if left == key || right == key => Some(k),
            _ => None,
        });
        self.nodes.insert(
            key,
            Node {
                is_root: false,
                parent,
                ..node
            },
        );
        Ok(())
    }

    /// Remove the node at `key` and return it.
    ///
    /// The node is unlinked from its children and, if it was the root, the tree
    /// is left without a root. A parent test node keeps naming `key` as its
    /// child; committing such a tree fails until a node is inserted under
    /// `key` again.
    pub fn remove(&mut self, key: NodeKey) -> Option<Node> {
        let mut node = self.nodes.shift_remove(&key)?;
        if let Some((left, right)) = node.children() {
            for child in [left, right] {
                if let Some(c) = self.nodes.get_mut(&child) {
                    if c.parent == Some(key) {
                        c.parent = None;
                    }
                }
            }
        }
        if self.root == Some(key) {
            self.root = None;
        }
        node.is_root = false;
        node.parent = None;
        Some(node)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl DoubleEndedIterator<Item = NodeKey> + ExactSizeIterator + '_ {
        self.nodes.keys().copied()
    }

    /// Nodes in insertion order.
    pub fn values(&self) -> impl DoubleEndedIterator<Item = &Node> + ExactSizeIterator {
        self.nodes.values()
    }

    /// `(key, node)` pairs in insertion order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (NodeKey, &Node)> + ExactSizeIterator {
        self.nodes.iter().map(|(&k, n)| (k, n))
    }

    /// Key of the node designated as root.
    #[inline]
    pub fn root(&self) -> Option<NodeKey> {
        self.root
    }

    // =========================================================================
    // Node mutators
    // =========================================================================

    /// Designate `key` as the root of this tree.
    ///
    /// Any previous root loses the designation. A node that is already some
    /// test node's child cannot become root.
    pub fn set_root(&mut self, key: NodeKey) -> Result<()> {
        let node = self.nodes.get(&key).ok_or(Error::UnregisteredNode { key })?;
        if let Some(parent) = node.parent {
            return Err(Error::validation(format!(
                "node {key} is a child of node {parent}; a root node cannot have a parent"
            )));
        }
        if let Some(old) = self.root.take() {
            if let Some(n) = self.nodes.get_mut(&old) {
                n.is_root = false;
            }
        }
        if let Some(n) = self.nodes.get_mut(&key) {
            n.is_root = true;
        }
        self.root = Some(key);
        Ok(())
    }

    /// Configure `key` as a leaf.
    pub fn set_leaf(&mut self, key: NodeKey, value: impl Into<LeafValue>) -> Result<()> {
        self.check_configurable(key)?;
        if let Some(node) = self.nodes.get_mut(&key) {
            node.state = NodeState::Leaf(value.into());
        }
        Ok(())
    }

    /// Configure `key` as a numerical test `[feature] op threshold`.
    ///
    /// Child keys that are not in the tree yet are inserted as empty nodes.
    #[allow(clippy::too_many_arguments)]
    pub fn set_numerical_test(
        &mut self,
        key: NodeKey,
        feature: u32,
        op: Operator,
        threshold: f32,
        default_left: bool,
        left: NodeKey,
        right: NodeKey,
    ) -> Result<()> {
        self.check_configurable(key)?;
        self.check_children(key, left, right)?;
        self.link_children(key, left, right);
        if let Some(node) = self.nodes.get_mut(&key) {
            node.state = NodeState::NumericalTest(NumericalSplit {
                feature,
                op,
                threshold,
                default_left,
                left,
                right,
            });
        }
        Ok(())
    }

    /// Configure `key` as a categorical test.
    ///
    /// Values in `left_categories` (each at most 63) go to the left child.
    /// Child keys that are not in the tree yet are inserted as empty nodes.
    pub fn set_categorical_test(
        &mut self,
        key: NodeKey,
        feature: u32,
        left_categories: &[u32],
        default_left: bool,
        left: NodeKey,
        right: NodeKey,
    ) -> Result<()> {
        self.check_configurable(key)?;
        let mask = CategoryMask::from_categories(left_categories)?;
        self.check_children(key, left, right)?;
        self.link_children(key, left, right);
        if let Some(node) = self.nodes.get_mut(&key) {
            node.state = NodeState::CategoricalTest(CategoricalSplit {
                feature,
                left_categories: mask,
                default_left,
                left,
                right,
            });
        }
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn check_configurable(&self, key: NodeKey) -> Result<()> {
        let node = self.nodes.get(&key).ok_or(Error::UnregisteredNode { key })?;
        if !node.is_empty() {
            return Err(Error::NodeAlreadyConfigured { key });
        }
        Ok(())
    }

    fn check_children(&self, key: NodeKey, left: NodeKey, right: NodeKey) -> Result<()> {
        if left == right {
            return Err(Error::validation(format!(
                "node {key}: left and right child must be different nodes (both are {left})"
            )));
        }
        for child in [left, right] {
            if child == key {
                return Err(Error::validation(format!("node {key} cannot be its own child")));
            }
            if self.root == Some(child) {
                return Err(Error::validation(format!(
                    "node {child} is the root and cannot be a child of node {key}"
                )));
            }
            if let Some(parent) = self.nodes.get(&child).and_then(|n| n.parent) {
                return Err(Error::validation(format!(
                    "node {child} designated as a child of node {key} already has parent {parent}"
                )));
            }
        }
        Ok(())
    }

    fn link_children(&mut self, key: NodeKey, left: NodeKey, right: NodeKey) {
        for child in [left, right] {
            self.nodes.entry(child).or_default().parent = Some(key);
        }
    }
}

/// Mutable handle to a node registered in a [`TreeBuilder`].
///
/// The handle borrows the tree so that test-node mutators can create missing
/// children in the same tree.
#[derive(Debug)]
pub struct NodeMut<'a> {
    tree: &'a mut TreeBuilder,
    key: NodeKey,
}

impl NodeMut<'_> {
    #[inline]
    pub fn key(&self) -> NodeKey {
        self.key
    }

    /// Current state of the node.
    pub fn node(&self) -> Option<&Node> {
        self.tree.get(self.key)
    }

    pub fn set_root(&mut self) -> Result<()> {
        self.tree.set_root(self.key)
    }

    pub fn set_leaf(&mut self, value: impl Into<LeafValue>) -> Result<()> {
        self.tree.set_leaf(self.key, value)
    }

    pub fn set_numerical_test(
        &mut self,
        feature: u32,
        op: Operator,
        threshold: f32,
        default_left: bool,
        left: NodeKey,
        right: NodeKey,
    ) -> Result<()> {
        self.tree
            .set_numerical_test(self.key, feature, op, threshold, default_left, left, right)
    }

    pub fn set_categorical_test(
        &mut self,
        feature: u32,
        left_categories: &[u32],
        default_left: bool,
        left: NodeKey,
        right: NodeKey,
    ) -> Result<()> {
        self.tree
            .set_categorical_test(self.key, feature, left_categories, default_left, left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::EnsembleBuilder;

    fn stump() -> TreeBuilder {
        let mut tree = TreeBuilder::new();
        tree.get_or_create(0)
            .set_numerical_test(0, Operator::Lt, 1.0, false, 1, 2)
            .unwrap();
        tree.set_root(0).unwrap();
        tree
    }

    #[test]
    fn get_or_create_inserts_empty_node() {
        let mut tree = TreeBuilder::new();
        assert!(!tree.contains(7));
        let handle = tree.get_or_create(7);
        assert!(handle.node().unwrap().is_empty());
        assert!(tree.contains(7));
        assert_eq!(tree.len(), 1);

        // Second lookup does not add anything.
        tree.get_or_create(7);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn plain_get_does_not_create() {
        let tree = TreeBuilder::new();
        assert!(tree.get(3).is_none());
        assert!(tree.is_empty());
    }

    #[test]
    fn insert_rejects_duplicate_key_regardless_of_state() {
        let mut tree = TreeBuilder::new();
        tree.insert(1, Node::new()).unwrap();
        let err = tree.insert(1, Node::new()).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { key: 1 }), "got: {err:?}");
    }

    #[test]
    fn insert_rejects_configured_node() {
        let mut tree = TreeBuilder::new();
        tree.insert(1, Node::new()).unwrap();
        tree.set_leaf(1, 2.0f32).unwrap();
        let leaf = tree.remove(1).unwrap();
        assert!(leaf.is_leaf());

        let err = tree.insert(1, leaf).unwrap_err();
        assert!(matches!(err, Error::NonEmptyInsertion { key: 1 }), "got: {err:?}");
        assert!(tree.is_empty());
    }

    #[test]
    fn mutators_require_registered_node() {
        let mut tree = TreeBuilder::new();
        assert!(matches!(tree.set_root(4), Err(Error::UnregisteredNode { key: 4 })));
        assert!(matches!(tree.set_leaf(4, 1.0f32), Err(Error::UnregisteredNode { key: 4 })));
        assert!(matches!(
            tree.set_numerical_test(4, 0, Operator::Lt, 0.0, true, 5, 6),
            Err(Error::UnregisteredNode { key: 4 })
        ));
        assert!(matches!(
            tree.set_categorical_test(4, 0, &[1], true, 5, 6),
            Err(Error::UnregisteredNode { key: 4 })
        ));
        assert!(matches!(tree.node_mut(4), Err(Error::UnregisteredNode { key: 4 })));
        // Failed calls leave no trace.
        assert!(tree.is_empty());
    }

    #[test]
    fn numerical_test_creates_missing_children() {
        let mut tree = TreeBuilder::new();
        tree.insert(0, Node::new()).unwrap();
        tree.insert(2, Node::new()).unwrap();
        tree.set_numerical_test(0, 3, Operator::Ge, 0.25, true, 1, 2)
            .unwrap();

        assert_eq!(tree.len(), 3);
        assert!(tree.get(1).unwrap().is_empty());
        assert_eq!(tree.get(1).unwrap().parent(), Some(0));
        assert_eq!(tree.get(2).unwrap().parent(), Some(0));
        assert_eq!(tree.keys().collect::<Vec<_>>(), vec![0, 2, 1]);

        match tree.get(0).unwrap().state() {
            NodeState::NumericalTest(split) => {
                assert_eq!(split.feature, 3);
                assert_eq!(split.op, Operator::Ge);
                assert_eq!(split.threshold, 0.25);
                assert!(split.default_left);
            }
            other => panic!("expected numerical test, got {other:?}"),
        }
    }

    #[test]
    fn categorical_test_stores_mask() {
        let mut tree = TreeBuilder::new();
        tree.get_or_create(0)
            .set_categorical_test(1, &[0, 5, 63], false, 1, 2)
            .unwrap();
        match tree.get(0).unwrap().state() {
            NodeState::CategoricalTest(split) => {
                assert_eq!(split.left_categories.categories().collect::<Vec<_>>(), vec![0, 5, 63]);
                assert!(!split.default_left);
            }
            other => panic!("expected categorical test, got {other:?}"),
        }
    }

    #[test]
    fn categorical_test_rejects_large_category_without_side_effects() {
        let mut tree = TreeBuilder::new();
        tree.insert(0, Node::new()).unwrap();
        let err = tree.set_categorical_test(0, 1, &[2, 64], false, 1, 2).unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "got: {err:?}");
        assert_eq!(tree.len(), 1);
        assert!(tree.get(0).unwrap().is_empty());
    }

    #[test]
    fn configured_node_cannot_be_reconfigured() {
        let mut tree = TreeBuilder::new();
        tree.insert(0, Node::new()).unwrap();
        tree.set_leaf(0, 1.0f32).unwrap();
        let err = tree.set_leaf(0, 2.0f32).unwrap_err();
        assert!(matches!(err, Error::NodeAlreadyConfigured { key: 0 }), "got: {err:?}");
        assert_eq!(tree.get(0).unwrap().leaf_value(), Some(&LeafValue::Scalar(1.0)));

        let err = tree.set_numerical_test(0, 0, Operator::Lt, 0.0, true, 1, 2).unwrap_err();
        assert!(matches!(err, Error::NodeAlreadyConfigured { key: 0 }));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn set_root_does_not_change_configuration() {
        let mut tree = TreeBuilder::new();
        tree.insert(3, Node::new()).unwrap();
        tree.set_root(3).unwrap();
        assert!(tree.get(3).unwrap().is_root());
        assert!(tree.get(3).unwrap().is_empty());
        tree.set_leaf(3, 1.0f32).unwrap();
        assert!(tree.get(3).unwrap().is_root());
    }

    #[test]
    fn set_root_moves_designation() {
        let mut tree = TreeBuilder::new();
        tree.insert(0, Node::new()).unwrap();
        tree.insert(10, Node::new()).unwrap();
        tree.set_root(0).unwrap();
        tree.set_root(10).unwrap();
        assert!(!tree.get(0).unwrap().is_root());
        assert!(tree.get(10).unwrap().is_root());
        assert_eq!(tree.root(), Some(10));
    }

    #[test]
    fn child_cannot_become_root() {
        let mut tree = stump();
        let err = tree.set_root(1).unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "got: {err:?}");
        assert_eq!(tree.root(), Some(0));
    }

    #[test]
    fn root_cannot_become_child() {
        let mut tree = stump();
        let err = tree
            .set_numerical_test(1, 0, Operator::Lt, 0.0, true, 0, 5)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "got: {err:?}");
        assert!(!tree.contains(5));
    }

    #[test]
    fn child_with_parent_cannot_be_reused() {
        let mut tree = stump();
        let err = tree
            .set_numerical_test(2, 0, Operator::Lt, 0.0, true, 1, 3)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "got: {err:?}");
        assert!(tree.get(2).unwrap().is_empty());
    }

    #[test]
    fn degenerate_children_are_rejected() {
        let mut tree = TreeBuilder::new();
        tree.insert(0, Node::new()).unwrap();
        assert!(tree.set_numerical_test(0, 0, Operator::Lt, 0.0, true, 1, 1).is_err());
        assert!(tree.set_numerical_test(0, 0, Operator::Lt, 0.0, true, 0, 1).is_err());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn remove_unlinks_children_and_root() {
        let mut tree = stump();
        let removed = tree.remove(0).unwrap();
        assert!(removed.is_test());
        assert!(!removed.is_root());
        assert_eq!(tree.root(), None);
        assert_eq!(tree.get(1).unwrap().parent(), None);
        assert_eq!(tree.get(2).unwrap().parent(), None);
        assert!(tree.remove(0).is_none());
    }

    #[test]
    fn removed_key_can_be_reinserted_empty() {
        let mut tree = stump();
        tree.set_leaf(1, 1.0f32).unwrap();
        tree.set_leaf(2, 2.0f32).unwrap();
        tree.remove(1);
        tree.insert(1, Node::new()).unwrap();
        assert!(tree.get(1).unwrap().is_empty());
        assert_eq!(tree.get(1).unwrap().parent(), Some(0));
        tree.set_leaf(1, 5.0f32).unwrap();

        let mut ensemble = EnsembleBuilder::with_features(1).unwrap();
        ensemble.append(tree);
        let model = ensemble.commit().unwrap();
        assert_eq!(model.tree(0).leaf_value(1), &LeafValue::Scalar(5.0));
    }

    #[test]
    fn reinserted_orphan_has_no_parent() {
        let mut tree = TreeBuilder::new();
        tree.insert(4, Node::new()).unwrap();
        tree.remove(4);
        tree.insert(4, Node::new()).unwrap();
        assert_eq!(tree.get(4).unwrap().parent(), None);
        tree.set_root(4).unwrap();
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let mut tree = TreeBuilder::new();
        for key in [5, -1, 3] {
            tree.insert(key, Node::new()).unwrap();
        }
        assert_eq!(tree.keys().collect::<Vec<_>>(), vec![5, -1, 3]);
        assert_eq!(tree.iter().map(|(k, _)| k).rev().collect::<Vec<_>>(), vec![3, -1, 5]);
        assert_eq!(tree.values().count(), 3);

        tree.remove(-1);
        assert_eq!(tree.keys().collect::<Vec<_>>(), vec![5, 3]);
    }
}
