//! Rebuild a LightGBM model through the ensemble builder.

use crate::builder::{CategoryMask, EnsembleBuilder, EnsembleConfig, NodeKey, Operator, TreeBuilder};
use crate::error::{Error, Result};
use crate::model::{Model, PredTransform};
use crate::params::Params;

use super::text::{DecisionType, LgbModel, LgbObjective, LgbTree, MissingType};

/// Output transform and sigmoid slope for an objective.
fn pred_transform(objective: Option<&LgbObjective>) -> (PredTransform, Option<f64>) {
    match objective {
        Some(LgbObjective::Binary { sigmoid }) => (PredTransform::Sigmoid, Some(*sigmoid)),
        Some(LgbObjective::Multiclass { .. }) => (PredTransform::Softmax, None),
        Some(LgbObjective::MulticlassOva { sigmoid, .. }) => {
            (PredTransform::MulticlassOva, Some(*sigmoid))
        }
        Some(LgbObjective::CrossEntropy) => (PredTransform::Sigmoid, None),
        Some(LgbObjective::CrossEntropyLambda) => (PredTransform::LogarithmOnePlusExp, None),
        Some(LgbObjective::LogLink(_)) => (PredTransform::Exponential, None),
        Some(LgbObjective::Regression) | Some(LgbObjective::Other(_)) | None => {
            (PredTransform::Identity, None)
        }
    }
}

impl LgbModel {
    /// Rebuild as a committed [`Model`].
    ///
    /// LightGBM already stores trees round-robin over output groups, so tree
    /// order is kept. Models written with `average_output` become random
    /// forests.
    pub fn to_model(&self) -> Result<Model> {
        let num_feature = u32::try_from(self.header.num_feature).map_err(|_| {
            Error::engine(format!("feature count {} is out of range", self.header.num_feature))
        })?;
        let num_groups = u32::try_from(self.num_groups())
            .map_err(|_| Error::engine("num_tree_per_iteration is out of range"))?;

        let (transform, sigmoid) = pred_transform(self.header.objective.as_ref());
        let mut params = Params::new()
            .with("pred_transform", transform)
            .with("global_bias", 0.0f32);
        if let Some(alpha) = sigmoid {
            params.set("sigmoid_alpha", alpha as f32);
        }

        let config = EnsembleConfig::builder()
            .num_feature(num_feature)
            .num_output_group(num_groups)
            .random_forest(self.header.average_output)
            .params(params)
            .build()?;
        let mut ensemble = EnsembleBuilder::new(config)?;
        for (tree_idx, lgb_tree) in self.trees.iter().enumerate() {
            ensemble.append(convert_tree(lgb_tree, tree_idx)?);
        }

        tracing::debug!(
            version = %self.header.version,
            n_trees = ensemble.len(),
            num_groups,
            "converted LightGBM model"
        );
        ensemble.commit()
    }
}

/// Node key of a child reference. Leaves are referenced as `!leaf_idx` and
/// are keyed after the internal nodes.
fn child_key(child: i32, num_internal: usize) -> NodeKey {
    if child < 0 {
        num_internal as NodeKey + !child
    } else {
        child
    }
}

/// Rebuild one LightGBM tree. Internal node 0 is the root.
fn convert_tree(lgb_tree: &LgbTree, tree_idx: usize) -> Result<TreeBuilder> {
    if lgb_tree.is_linear {
        return Err(Error::engine(format!(
            "tree {tree_idx}: linear trees are not supported"
        )));
    }
    if lgb_tree.num_leaves == 0 {
        return Err(Error::engine(format!("tree {tree_idx} has no leaves")));
    }
    if lgb_tree.leaf_value.len() != lgb_tree.num_leaves {
        return Err(Error::engine(format!(
            "tree {tree_idx}: leaf_value has {} entries, expected {}",
            lgb_tree.leaf_value.len(),
            lgb_tree.num_leaves
        )));
    }

    let mut tree = TreeBuilder::new();
    let num_internal = lgb_tree.num_leaves - 1;

    for node_idx in 0..num_internal {
        let dt = DecisionType::from_bits(lgb_tree.decision_type[node_idx]);
        let left = child_key(lgb_tree.left_child[node_idx], num_internal);
        let right = child_key(lgb_tree.right_child[node_idx], num_internal);
        let feature = u32::try_from(lgb_tree.split_feature[node_idx]).map_err(|_| {
            Error::engine(format!(
                "tree {tree_idx}, node {node_idx}: negative split feature {}",
                lgb_tree.split_feature[node_idx]
            ))
        })?;
        let mut node = tree.get_or_create(node_idx as NodeKey);

        if dt.is_categorical {
            let categories = left_categories(lgb_tree, tree_idx, node_idx)?;
            // Without a missing type, missing values are read as category 0.
            let default_left = dt.missing_type == MissingType::None && categories.contains(&0);
            node.set_categorical_test(feature, &categories, default_left, left, right)?;
        } else {
            let threshold = lgb_tree.threshold[node_idx] as f32;
            // Without a missing type, missing values are read as zero.
            let default_left = match dt.missing_type {
                MissingType::None => 0.0 <= threshold,
                MissingType::Zero | MissingType::NaN => dt.default_left,
            };
            node.set_numerical_test(feature, Operator::Le, threshold, default_left, left, right)?;
        }
    }

    for (leaf_idx, &value) in lgb_tree.leaf_value.iter().enumerate() {
        tree.get_or_create((num_internal + leaf_idx) as NodeKey)
            .set_leaf(value as f32)?;
    }
    tree.set_root(0)?;
    Ok(tree)
}

/// Categories routed left by a categorical split.
///
/// The split threshold indexes `cat_boundaries`, which delimits the node's
/// 32-bit words in `cat_threshold`. Bit `b` of word `w` covers category
/// `w * 32 + b`.
fn left_categories(lgb_tree: &LgbTree, tree_idx: usize, node_idx: usize) -> Result<Vec<u32>> {
    let out_of_bounds = || {
        Error::engine(format!(
            "tree {tree_idx}, node {node_idx}: categorical bitset is out of bounds"
        ))
    };
    let cat_idx = lgb_tree.threshold[node_idx] as usize;
    let boundary = |i: usize| {
        lgb_tree
            .cat_boundaries
            .get(i)
            .and_then(|&b| usize::try_from(b).ok())
    };
    let (start, end) = match (boundary(cat_idx), boundary(cat_idx + 1)) {
        (Some(start), Some(end)) if start <= end => (start, end),
        _ => return Err(out_of_bounds()),
    };
    let words = lgb_tree.cat_threshold.get(start..end).ok_or_else(out_of_bounds)?;

    let mut categories = Vec::new();
    for (w, &word) in words.iter().enumerate() {
        for bit in 0..32u32 {
            if (word >> bit) & 1 == 1 {
                categories.push(w as u32 * 32 + bit);
            }
        }
    }
    if let Some(&too_large) = categories.iter().find(|&&c| c > CategoryMask::MAX_CATEGORY) {
        return Err(Error::engine(format!(
            "tree {tree_idx}, node {node_idx}: category {too_large} exceeds the maximum of {}",
            CategoryMask::MAX_CATEGORY
        )));
    }
    Ok(categories)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::LeafValue;
    use crate::compat::lightgbm::LgbHeader;
    use crate::model::SplitType;
    use approx::assert_relative_eq;

    fn stump(decision_type: i8, threshold: f64) -> LgbTree {
        LgbTree {
            num_leaves: 2,
            split_feature: vec![1],
            threshold: vec![threshold],
            decision_type: vec![decision_type],
            left_child: vec![-1],
            right_child: vec![-2],
            leaf_value: vec![-0.5, 0.5],
            ..LgbTree::default()
        }
    }

    fn lgb_model(trees: Vec<LgbTree>, objective: &str) -> LgbModel {
        LgbModel {
            header: LgbHeader {
                num_feature: 4,
                objective: Some(LgbObjective::parse(objective)),
                ..Default::default()
            },
            trees,
        }
    }

    #[test]
    fn leaves_are_keyed_after_internal_nodes() {
        assert_eq!(child_key(2, 3), 2);
        assert_eq!(child_key(-1, 3), 3);
        assert_eq!(child_key(-3, 3), 5);
    }

    #[test]
    fn numerical_stump_uses_less_equal() {
        let model = lgb_model(vec![stump(2, 1.5)], "regression").to_model().unwrap();
        assert_eq!(model.num_feature(), 4);
        let tree = model.tree(0);
        assert_eq!(tree.n_nodes(), 3);
        assert_eq!(tree.operator(0), Operator::Le);
        assert_eq!(tree.split_index(0), 1);
        assert_relative_eq!(tree.threshold(0), 1.5f32);
        assert!(tree.default_left(0));
        assert_eq!(model.param().pred_transform, PredTransform::Identity);
    }

    #[test]
    fn missing_none_routes_like_zero() {
        // Missing type None, default_left bit ignored; zero is above the threshold.
        let model = lgb_model(vec![stump(2, -1.0)], "regression").to_model().unwrap();
        assert!(!model.tree(0).default_left(0));

        // Missing type NaN follows the default_left bit.
        let model = lgb_model(vec![stump(8, -1.0)], "regression")
            .to_model()
            .unwrap();
        assert!(!model.tree(0).default_left(0));
        let model = lgb_model(vec![stump(8 | 2, -1.0)], "regression")
            .to_model()
            .unwrap();
        assert!(model.tree(0).default_left(0));
    }

    #[test]
    fn categorical_split_reads_bitset() {
        let mut tree = stump(1, 0.0);
        tree.cat_boundaries = vec![0, 2];
        // Categories 0, 2 and 33.
        tree.cat_threshold = vec![0b101, 0b10];
        let model = lgb_model(vec![tree], "binary sigmoid:2").to_model().unwrap();
        let tree = model.tree(0);
        assert_eq!(tree.split_type(0), SplitType::Categorical);
        assert_eq!(
            tree.category_mask(0).categories().collect::<Vec<_>>(),
            vec![0, 2, 33]
        );
        assert!(tree.default_left(0));
        assert_eq!(model.param().pred_transform, PredTransform::Sigmoid);
        assert_relative_eq!(model.param().sigmoid_alpha, 2.0f32);
    }

    #[test]
    fn oversized_category_is_rejected() {
        let mut tree = stump(1, 0.0);
        tree.cat_boundaries = vec![0, 3];
        tree.cat_threshold = vec![0, 0, 1];
        let err = lgb_model(vec![tree], "regression").to_model().unwrap_err();
        assert!(err.to_string().contains("category 64"), "got: {err}");
    }

    #[test]
    fn single_leaf_tree() {
        let tree = LgbTree {
            num_leaves: 1,
            leaf_value: vec![0.25],
            ..LgbTree::default()
        };
        let model = lgb_model(vec![tree], "regression").to_model().unwrap();
        assert_eq!(model.tree(0).n_nodes(), 1);
        assert_eq!(model.tree(0).leaf_value(0), &LeafValue::Scalar(0.25));
    }

    #[test]
    fn linear_trees_are_rejected() {
        let mut tree = stump(2, 0.0);
        tree.is_linear = true;
        assert!(matches!(
            lgb_model(vec![tree], "regression").to_model(),
            Err(Error::Engine(_))
        ));
    }

    #[test]
    fn multiclass_keeps_round_robin_order() {
        let mut lgb = lgb_model(
            vec![stump(2, 0.0), stump(2, 1.0), stump(2, 2.0)],
            "multiclass num_class:3",
        );
        lgb.header.num_tree_per_iteration = 3;
        let model = lgb.to_model().unwrap();
        assert_eq!(model.num_output_group(), 3);
        assert_eq!(model.param().pred_transform, PredTransform::Softmax);
        for idx in 0..3 {
            assert_eq!(model.tree_group(idx), idx as u32);
            assert_relative_eq!(model.tree(idx).threshold(0), idx as f32);
        }
    }

    #[test]
    fn log_link_objectives_exponentiate() {
        assert_eq!(
            pred_transform(Some(&LgbObjective::parse("poisson"))).0,
            PredTransform::Exponential
        );
        assert_eq!(
            pred_transform(Some(&LgbObjective::parse("xentlambda"))).0,
            PredTransform::LogarithmOnePlusExp
        );
    }
}
