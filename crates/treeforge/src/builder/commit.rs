//! Builder state to [`Model`] conversion.
//!
//! Every failure is reported as [`Error::Engine`] and no partial model is
//! returned.

use indexmap::IndexSet;

use super::categories::CategoryMask;
use super::ensemble::EnsembleConfig;
use super::node::{LeafValue, Node, NodeState, Operator};
use super::tree::TreeBuilder;
use super::NodeKey;
use crate::error::{Error, Result};
use crate::model::{Model, ModelParam, NodeId, SplitType, Tree};

/// Leaf representation seen so far across the ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeafKind {
    Scalar,
    Vector,
}

pub(crate) fn commit(config: &EnsembleConfig, trees: &[TreeBuilder]) -> Result<Model> {
    let param = ModelParam::from_params(&config.params)?;

    let mut leaf_kind = None;
    let mut frozen = Vec::with_capacity(trees.len());
    for (tree_idx, tree) in trees.iter().enumerate() {
        frozen.push(freeze_tree(tree_idx, tree, config, &mut leaf_kind)?);
    }

    let n_groups = config.num_output_group;
    let leaf_vector = leaf_kind == Some(LeafKind::Vector);
    if leaf_vector {
        if n_groups <= 1 {
            return Err(Error::engine(
                "vector leaf output requires num_output_group to be greater than 1",
            ));
        }
        if !config.random_forest {
            return Err(Error::engine(
                "multiclass model with vector leaf output must be a random forest",
            ));
        }
    } else if n_groups > 1 {
        if config.random_forest {
            return Err(Error::engine(
                "multiclass random forest requires vector leaf output (one value per output group)",
            ));
        }
        if frozen.len() % n_groups as usize != 0 {
            return Err(Error::engine(format!(
                "multiclass boosted model with scalar leaves needs a multiple of num_output_group = {n_groups} trees, got {}",
                frozen.len()
            )));
        }
    }

    tracing::debug!(
        n_trees = frozen.len(),
        num_feature = config.num_feature,
        num_output_group = n_groups,
        random_forest = config.random_forest,
        "committed ensemble"
    );

    Ok(Model::from_parts(
        config.num_feature,
        n_groups,
        config.random_forest,
        leaf_vector,
        param,
        frozen,
    ))
}

/// Walk `tree` breadth-first from its root and lay it out as a frozen [`Tree`].
fn freeze_tree(
    tree_idx: usize,
    tree: &TreeBuilder,
    config: &EnsembleConfig,
    leaf_kind: &mut Option<LeafKind>,
) -> Result<Tree> {
    let root = tree
        .root()
        .ok_or_else(|| Error::engine(format!("tree {tree_idx}: root node is not set")))?;
    let root_node = tree.get(root).ok_or_else(|| {
        Error::engine(format!("tree {tree_idx}: root node {root} does not exist"))
    })?;

    let mut order: IndexSet<NodeKey> = IndexSet::new();
    let mut nodes: Vec<&Node> = Vec::with_capacity(tree.len());
    order.insert(root);
    nodes.push(root_node);

    let mut head = 0;
    while head < nodes.len() {
        let key = order[head];
        let node = nodes[head];
        head += 1;

        if node.is_empty() {
            return Err(Error::engine(format!(
                "tree {tree_idx}: node {key} is empty; every reachable node must be a leaf or a test node"
            )));
        }
        let Some((left, right)) = node.children() else {
            continue;
        };
        for child in [left, right] {
            let child_node = tree.get(child).ok_or_else(|| {
                Error::engine(format!(
                    "tree {tree_idx}: node {key} refers to child {child}, which does not exist"
                ))
            })?;
            if child_node.parent() != Some(key) {
                return Err(Error::engine(format!(
                    "tree {tree_idx}: node {child} is not linked as a child of node {key}"
                )));
            }
            if !order.insert(child) {
                return Err(Error::engine(format!(
                    "tree {tree_idx}: node {child} is reachable more than once"
                )));
            }
            nodes.push(child_node);
        }
    }

    let dropped = tree.len() - nodes.len();
    if dropped > 0 {
        tracing::debug!(tree_idx, dropped, "dropping nodes unreachable from the root");
    }

    let index_of = |key: NodeKey| -> NodeId {
        // Children were inserted into `order` during the walk.
        order.get_index_of(&key).unwrap_or_default() as NodeId
    };

    let n_nodes = nodes.len();
    let mut split_indices = Vec::with_capacity(n_nodes);
    let mut thresholds = Vec::with_capacity(n_nodes);
    let mut operators = Vec::with_capacity(n_nodes);
    let mut left_children = Vec::with_capacity(n_nodes);
    let mut right_children = Vec::with_capacity(n_nodes);
    let mut default_left = Vec::with_capacity(n_nodes);
    let mut is_leaf = Vec::with_capacity(n_nodes);
    let mut split_types = Vec::with_capacity(n_nodes);
    let mut category_masks = Vec::with_capacity(n_nodes);
    let mut leaf_values = Vec::with_capacity(n_nodes);

    for (&key, node) in order.iter().zip(&nodes) {
        if let Some(feature) = node.state().feature() {
            if feature >= config.num_feature {
                return Err(Error::engine(format!(
                    "tree {tree_idx}, node {key}: split feature {feature} is out of range for num_feature = {}",
                    config.num_feature
                )));
            }
        }

        match node.state() {
            NodeState::Leaf(value) => {
                check_leaf(tree_idx, key, value, config, leaf_kind)?;
                split_indices.push(0);
                thresholds.push(0.0);
                operators.push(Operator::default());
                left_children.push(0);
                right_children.push(0);
                default_left.push(false);
                is_leaf.push(true);
                split_types.push(SplitType::Numeric);
                category_masks.push(CategoryMask::default());
                leaf_values.push(value.clone());
            }
            NodeState::NumericalTest(split) => {
                split_indices.push(split.feature);
                thresholds.push(split.threshold);
                operators.push(split.op);
                left_children.push(index_of(split.left));
                right_children.push(index_of(split.right));
                default_left.push(split.default_left);
                is_leaf.push(false);
                split_types.push(SplitType::Numeric);
                category_masks.push(CategoryMask::default());
                leaf_values.push(LeafValue::Scalar(0.0));
            }
            NodeState::CategoricalTest(split) => {
                split_indices.push(split.feature);
                thresholds.push(0.0);
                operators.push(Operator::default());
                left_children.push(index_of(split.left));
                right_children.push(index_of(split.right));
                default_left.push(split.default_left);
                is_leaf.push(false);
                split_types.push(SplitType::Categorical);
                category_masks.push(split.left_categories);
                leaf_values.push(LeafValue::Scalar(0.0));
            }
            // Rejected during the walk.
            NodeState::Empty => {}
        }
    }

    Ok(Tree::new(
        split_indices,
        thresholds,
        operators,
        left_children,
        right_children,
        default_left,
        is_leaf,
        split_types,
        category_masks,
        leaf_values,
    ))
}

fn check_leaf(
    tree_idx: usize,
    key: NodeKey,
    value: &LeafValue,
    config: &EnsembleConfig,
    leaf_kind: &mut Option<LeafKind>,
) -> Result<()> {
    let kind = match value {
        LeafValue::Scalar(_) => LeafKind::Scalar,
        LeafValue::Vector(values) => {
            if values.len() != config.num_output_group as usize {
                return Err(Error::engine(format!(
                    "tree {tree_idx}, node {key}: leaf vector has length {}, expected num_output_group = {}",
                    values.len(),
                    config.num_output_group
                )));
            }
            LeafKind::Vector
        }
    };
    match *leaf_kind {
        None => *leaf_kind = Some(kind),
        Some(seen) if seen != kind => {
            return Err(Error::engine(format!(
                "tree {tree_idx}, node {key}: mixing scalar and vector leaf outputs is not allowed"
            )));
        }
        Some(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::EnsembleBuilder;

    fn config(num_output_group: u32, random_forest: bool) -> EnsembleConfig {
        EnsembleConfig::builder()
            .num_feature(4)
            .num_output_group(num_output_group)
            .random_forest(random_forest)
            .build()
            .unwrap()
    }

    fn stump(left: impl Into<LeafValue>, right: impl Into<LeafValue>) -> TreeBuilder {
        let mut tree = TreeBuilder::new();
        tree.get_or_create(10)
            .set_numerical_test(1, Operator::Le, 0.0, false, 20, 30)
            .unwrap();
        tree.set_root(10).unwrap();
        tree.set_leaf(20, left).unwrap();
        tree.set_leaf(30, right).unwrap();
        tree
    }

    fn engine_message(result: Result<Model>) -> String {
        match result {
            Err(Error::Engine(msg)) => msg,
            other => panic!("expected engine error, got {other:?}"),
        }
    }

    #[test]
    fn renumbers_breadth_first() {
        let mut tree = TreeBuilder::new();
        tree.get_or_create(5)
            .set_numerical_test(0, Operator::Lt, 1.0, true, 7, 3)
            .unwrap();
        tree.set_root(5).unwrap();
        tree.set_categorical_test(7, 2, &[1, 3], false, 8, 9).unwrap();
        tree.set_leaf(3, 3.0f32).unwrap();
        tree.set_leaf(8, 8.0f32).unwrap();
        tree.set_leaf(9, 9.0f32).unwrap();

        let model = commit(&config(1, false), &[tree]).unwrap();
        let t = model.tree(0);
        assert_eq!(t.n_nodes(), 5);
        assert_eq!((t.left_child(0), t.right_child(0)), (1, 2));
        assert!(t.is_categorical(1));
        assert_eq!(t.category_mask(1).categories().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!((t.left_child(1), t.right_child(1)), (3, 4));
        assert_eq!(t.leaf_value(2), &LeafValue::Scalar(3.0));
        assert_eq!(t.leaf_value(3), &LeafValue::Scalar(8.0));
        assert_eq!(t.leaf_value(4), &LeafValue::Scalar(9.0));
    }

    #[test]
    fn zero_trees_commit_to_empty_model() {
        let model = commit(&config(3, false), &[]).unwrap();
        assert_eq!(model.num_trees(), 0);
        assert_eq!(model.num_output_group(), 3);
    }

    #[test]
    fn missing_root_fails() {
        let mut tree = TreeBuilder::new();
        tree.insert(0, Node::new()).unwrap();
        tree.set_leaf(0, 1.0f32).unwrap();
        let msg = engine_message(commit(&config(1, false), &[tree]));
        assert!(msg.contains("root"), "{msg}");
    }

    #[test]
    fn empty_reachable_node_fails() {
        let mut tree = stump(1.0f32, 2.0f32);
        tree.get_or_create(40)
            .set_numerical_test(0, Operator::Lt, 0.0, true, 41, 42)
            .unwrap();
        // Unreachable nodes are dropped, even if empty.
        assert!(commit(&config(1, false), &[tree.clone()]).is_ok());

        let mut tree = TreeBuilder::new();
        tree.get_or_create(0)
            .set_numerical_test(0, Operator::Lt, 0.0, true, 1, 2)
            .unwrap();
        tree.set_root(0).unwrap();
        tree.set_leaf(1, 1.0f32).unwrap();
        let msg = engine_message(commit(&config(1, false), &[tree]));
        assert!(msg.contains("node 2 is empty"), "{msg}");
    }

    #[test]
    fn dangling_child_fails() {
        let mut tree = stump(1.0f32, 2.0f32);
        tree.remove(30);
        let msg = engine_message(commit(&config(1, false), &[tree]));
        assert!(msg.contains("does not exist"), "{msg}");
    }

    #[test]
    fn feature_out_of_range_fails() {
        let mut tree = TreeBuilder::new();
        tree.get_or_create(0)
            .set_numerical_test(4, Operator::Lt, 0.0, true, 1, 2)
            .unwrap();
        tree.set_root(0).unwrap();
        tree.set_leaf(1, 0.0f32).unwrap();
        tree.set_leaf(2, 0.0f32).unwrap();
        let msg = engine_message(commit(&config(1, false), &[tree]));
        assert!(msg.contains("split feature 4"), "{msg}");
    }

    #[test]
    fn vector_leaves_require_random_forest_and_matching_length() {
        let trees = [stump([0.1f32, 0.9], [0.8f32, 0.2])];
        let model = commit(&config(2, true), &trees).unwrap();
        assert!(model.has_leaf_vector());
        assert_eq!(model.tree_group(0), 0);

        engine_message(commit(&config(2, false), &trees));
        engine_message(commit(&config(3, true), &trees));
        engine_message(commit(&config(1, true), &[stump([0.1f32], [0.2f32])]));
    }

    #[test]
    fn mixed_leaf_kinds_fail() {
        let msg = engine_message(commit(&config(2, true), &[stump([0.1f32, 0.9], 1.0f32)]));
        assert!(msg.contains("mixing"), "{msg}");
    }

    #[test]
    fn scalar_multiclass_needs_whole_rounds() {
        let trees: Vec<_> = (0..3).map(|_| stump(1.0f32, 2.0f32)).collect();
        let model = commit(&config(3, false), &trees).unwrap();
        assert_eq!(
            (0..3).map(|i| model.tree_group(i)).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        engine_message(commit(&config(2, false), &trees));
        engine_message(commit(&config(3, true), &trees));
    }

    #[test]
    fn bad_model_param_fails_before_trees_are_checked() {
        let mut ensemble = EnsembleBuilder::new(config(1, false)).unwrap();
        ensemble.append(TreeBuilder::new());
        ensemble.set_param("pred_transform", "nope");
        let msg = engine_message(ensemble.commit());
        assert!(msg.contains("pred_transform"), "{msg}");
    }
}
