//! Frozen tree storage (SoA).

// Allow many constructor arguments for creating trees with all their fields.
#![allow(clippy::too_many_arguments)]

use crate::builder::{CategoryMask, LeafValue, Operator};

/// Node index inside a frozen [`Tree`]. The root is always 0.
pub type NodeId = u32;

/// Type of split in a test node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SplitType {
    /// `[feature] op threshold` goes left.
    #[default]
    Numeric = 0,
    /// Feature value in the category mask goes left.
    Categorical = 1,
}

/// Structure-of-Arrays tree storage.
///
/// Nodes are stored in breadth-first order starting from the root. Fields of a
/// leaf node other than `is_leaf` and `leaf_value` are placeholders, and vice
/// versa for test nodes.
#[derive(Debug, Clone)]
pub struct Tree {
    split_indices: Box<[u32]>,
    thresholds: Box<[f32]>,
    operators: Box<[Operator]>,
    left_children: Box<[NodeId]>,
    right_children: Box<[NodeId]>,
    default_left: Box<[bool]>,
    is_leaf: Box<[bool]>,
    split_types: Box<[SplitType]>,
    category_masks: Box<[CategoryMask]>,
    leaf_values: Box<[LeafValue]>,
}

impl Tree {
    /// Create a tree from parallel arrays. All arrays must have the same length.
    pub fn new(
        split_indices: Vec<u32>,
        thresholds: Vec<f32>,
        operators: Vec<Operator>,
        left_children: Vec<NodeId>,
        right_children: Vec<NodeId>,
        default_left: Vec<bool>,
        is_leaf: Vec<bool>,
        split_types: Vec<SplitType>,
        category_masks: Vec<CategoryMask>,
        leaf_values: Vec<LeafValue>,
    ) -> Self {
        let n_nodes = split_indices.len();
        debug_assert_eq!(n_nodes, thresholds.len());
        debug_assert_eq!(n_nodes, operators.len());
        debug_assert_eq!(n_nodes, left_children.len());
        debug_assert_eq!(n_nodes, right_children.len());
        debug_assert_eq!(n_nodes, default_left.len());
        debug_assert_eq!(n_nodes, is_leaf.len());
        debug_assert_eq!(n_nodes, split_types.len());
        debug_assert_eq!(n_nodes, category_masks.len());
        debug_assert_eq!(n_nodes, leaf_values.len());

        Self {
            split_indices: split_indices.into_boxed_slice(),
            thresholds: thresholds.into_boxed_slice(),
            operators: operators.into_boxed_slice(),
            left_children: left_children.into_boxed_slice(),
            right_children: right_children.into_boxed_slice(),
            default_left: default_left.into_boxed_slice(),
            is_leaf: is_leaf.into_boxed_slice(),
            split_types: split_types.into_boxed_slice(),
            category_masks: category_masks.into_boxed_slice(),
            leaf_values: leaf_values.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.split_indices.len()
    }

    #[inline]
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.is_leaf[node as usize]
    }

    #[inline]
    pub fn split_index(&self, node: NodeId) -> u32 {
        self.split_indices[node as usize]
    }

    #[inline]
    pub fn threshold(&self, node: NodeId) -> f32 {
        self.thresholds[node as usize]
    }

    #[inline]
    pub fn operator(&self, node: NodeId) -> Operator {
        self.operators[node as usize]
    }

    #[inline]
    pub fn left_child(&self, node: NodeId) -> NodeId {
        self.left_children[node as usize]
    }

    #[inline]
    pub fn right_child(&self, node: NodeId) -> NodeId {
        self.right_children[node as usize]
    }

    #[inline]
    pub fn default_left(&self, node: NodeId) -> bool {
        self.default_left[node as usize]
    }

    #[inline]
    pub fn split_type(&self, node: NodeId) -> SplitType {
        self.split_types[node as usize]
    }

    #[inline]
    pub fn is_categorical(&self, node: NodeId) -> bool {
        self.split_type(node) == SplitType::Categorical
    }

    /// Categories routed left by a categorical test node.
    #[inline]
    pub fn category_mask(&self, node: NodeId) -> CategoryMask {
        self.category_masks[node as usize]
    }

    #[inline]
    pub fn leaf_value(&self, node: NodeId) -> &LeafValue {
        &self.leaf_values[node as usize]
    }

    /// Number of leaves.
    pub fn n_leaves(&self) -> usize {
        self.is_leaf.iter().filter(|&&l| l).count()
    }

    /// Whether any test node is categorical.
    pub fn has_categorical(&self) -> bool {
        self.split_types.contains(&SplitType::Categorical)
    }

    /// Depth of the deepest leaf (a single leaf has depth 0).
    pub fn max_depth(&self) -> usize {
        let mut depth = vec![0usize; self.n_nodes()];
        let mut max = 0;
        // BFS order guarantees parents precede children.
        for node in 0..self.n_nodes() {
            if !self.is_leaf[node] {
                let d = depth[node] + 1;
                depth[self.left_children[node] as usize] = d;
                depth[self.right_children[node] as usize] = d;
                max = max.max(d);
            }
        }
        max
    }
}
