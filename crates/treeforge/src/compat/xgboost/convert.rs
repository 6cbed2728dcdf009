//! Rebuild an XGBoost model through the ensemble builder.

use crate::builder::{CategoryMask, EnsembleBuilder, EnsembleConfig, NodeKey, Operator, TreeBuilder};
use crate::error::{Error, Result};
use crate::model::{Model, PredTransform};
use crate::params::Params;

use super::json::{GradientBooster, XgbModel, XgbTree};

/// Convert base_score from probability space to margin space based on objective.
///
/// XGBoost stores base_score in probability/original space in JSON, but the
/// generated predictor adds it to the margin.
fn prob_to_margin(base_score: f32, objective: &str) -> f32 {
    match objective {
        "binary:logistic" | "reg:logistic" => {
            let p = base_score.clamp(1e-7, 1.0 - 1e-7);
            (p / (1.0 - p)).ln()
        }
        "count:poisson" | "reg:gamma" | "reg:tweedie" | "survival:cox" => {
            base_score.max(1e-7).ln()
        }
        _ => base_score,
    }
}

fn pred_transform(objective: &str) -> PredTransform {
    match objective {
        "binary:logistic" | "reg:logistic" => PredTransform::Sigmoid,
        "multi:softprob" => PredTransform::Softmax,
        "multi:softmax" => PredTransform::MaxIndex,
        "count:poisson" | "reg:gamma" | "reg:tweedie" | "survival:cox" => {
            PredTransform::Exponential
        }
        _ => PredTransform::Identity,
    }
}

impl XgbModel {
    /// Rebuild as a committed [`Model`].
    ///
    /// Trees are reordered so that tree `i` feeds output group
    /// `i % num_output_group`; DART trees have their drop weight folded into
    /// the leaf values.
    pub fn to_model(&self) -> Result<Model> {
        let (model_trees, weights) = match &self.learner.gradient_booster {
            GradientBooster::Gbtree { model } => (model, None),
            GradientBooster::Dart {
                gbtree,
                weight_drop,
            } => (&gbtree.model, Some(weight_drop.as_slice())),
            GradientBooster::Unsupported => {
                return Err(Error::engine(
                    "only tree boosters (gbtree, dart) can be loaded from XGBoost models",
                ))
            }
        };

        let param = &self.learner.learner_model_param;
        if param.num_target > 1 {
            return Err(Error::engine(format!(
                "multi-target XGBoost models are not supported (num_target = {})",
                param.num_target
            )));
        }
        let num_feature = u32::try_from(param.num_feature)
            .map_err(|_| Error::engine(format!("invalid num_feature {}", param.num_feature)))?;
        let num_groups = param.num_class.max(1) as u32;

        let trees = &model_trees.trees;
        if model_trees.tree_info.len() != trees.len() {
            return Err(Error::engine(format!(
                "tree_info has {} entries but the model has {} trees",
                model_trees.tree_info.len(),
                trees.len()
            )));
        }
        if let Some(w) = weights {
            if w.len() != trees.len() {
                return Err(Error::engine(format!(
                    "weight_drop has {} entries but the model has {} trees",
                    w.len(),
                    trees.len()
                )));
            }
        }

        let objective = self.learner.objective.name.as_str();
        let params = Params::new()
            .with("pred_transform", pred_transform(objective))
            .with("global_bias", prob_to_margin(param.base_score, objective));
        let config = EnsembleConfig::builder()
            .num_feature(num_feature)
            .num_output_group(num_groups)
            .params(params)
            .build()?;
        let mut ensemble = EnsembleBuilder::new(config)?;

        for tree_idx in interleave_by_group(&model_trees.tree_info, num_groups)? {
            let weight = weights.map_or(1.0, |w| w[tree_idx]);
            ensemble.append(convert_tree(&trees[tree_idx], tree_idx, weight)?);
        }

        tracing::debug!(
            version = ?self.version,
            objective,
            n_trees = ensemble.len(),
            "converted XGBoost model"
        );
        ensemble.commit()
    }
}

/// Order tree indices round-robin over output groups.
///
/// Every group must own the same number of trees.
fn interleave_by_group(tree_info: &[i32], num_groups: u32) -> Result<Vec<usize>> {
    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); num_groups as usize];
    for (idx, &group) in tree_info.iter().enumerate() {
        let bucket = usize::try_from(group)
            .ok()
            .and_then(|g| buckets.get_mut(g))
            .ok_or_else(|| {
                Error::engine(format!(
                    "tree {idx} belongs to output group {group}, but the model has {num_groups} groups"
                ))
            })?;
        bucket.push(idx);
    }

    let per_group = buckets.first().map_or(0, Vec::len);
    if buckets.iter().any(|b| b.len() != per_group) {
        return Err(Error::engine(
            "output groups own different numbers of trees",
        ));
    }

    Ok((0..per_group)
        .flat_map(|round| buckets.iter().map(move |b| b[round]))
        .collect())
}

fn check_len<T>(tree_idx: usize, field: &str, arr: &[T], expected: usize) -> Result<()> {
    if arr.len() != expected {
        return Err(Error::engine(format!(
            "tree {tree_idx}: {field} has {} entries, expected {expected}",
            arr.len()
        )));
    }
    Ok(())
}

/// Rebuild one XGBoost tree. XGBoost node ids become node keys; node 0 is the root.
fn convert_tree(xgb_tree: &XgbTree, tree_idx: usize, weight: f32) -> Result<TreeBuilder> {
    let num_nodes = usize::try_from(xgb_tree.tree_param.num_nodes).unwrap_or(0);
    if num_nodes == 0 {
        return Err(Error::engine(format!("tree {tree_idx} has no nodes")));
    }
    if xgb_tree.tree_param.size_leaf_vector > 1 {
        return Err(Error::engine(format!(
            "tree {tree_idx}: vector-leaf XGBoost trees are not supported"
        )));
    }
    check_len(tree_idx, "base_weights", &xgb_tree.base_weights, num_nodes)?;
    check_len(tree_idx, "left_children", &xgb_tree.left_children, num_nodes)?;
    check_len(tree_idx, "right_children", &xgb_tree.right_children, num_nodes)?;
    check_len(tree_idx, "split_indices", &xgb_tree.split_indices, num_nodes)?;
    check_len(tree_idx, "split_conditions", &xgb_tree.split_conditions, num_nodes)?;
    check_len(tree_idx, "default_left", &xgb_tree.default_left, num_nodes)?;

    let categories = categories_by_node(xgb_tree, tree_idx)?;

    let mut tree = TreeBuilder::new();
    for nid in 0..num_nodes {
        let key = nid as NodeKey;
        let left = xgb_tree.left_children[nid];
        let mut node = tree.get_or_create(key);

        // A node is a leaf if left_child == -1 (XGBoost convention)
        if left == -1 {
            node.set_leaf(xgb_tree.base_weights[nid] * weight)?;
            continue;
        }

        let right = xgb_tree.right_children[nid];
        let feature = u32::try_from(xgb_tree.split_indices[nid]).map_err(|_| {
            Error::engine(format!(
                "tree {tree_idx}, node {nid}: negative split index {}",
                xgb_tree.split_indices[nid]
            ))
        })?;
        let default_left = xgb_tree.default_left[nid] != 0;
        let is_categorical = xgb_tree.split_type.get(nid).copied().unwrap_or(0) == 1;

        if is_categorical {
            // Listed categories go right; the builder stores the left set.
            let right_set = categories
                .iter()
                .find(|(n, _)| *n == nid)
                .map(|(_, mask)| *mask)
                .unwrap_or_default();
            let left_categories: Vec<u32> = right_set.complement().categories().collect();
            node.set_categorical_test(feature, &left_categories, default_left, left, right)?;
        } else {
            node.set_numerical_test(
                feature,
                Operator::Lt,
                xgb_tree.split_conditions[nid],
                default_left,
                left,
                right,
            )?;
        }
    }
    tree.set_root(0)?;
    Ok(tree)
}

/// Category sets of the categorical nodes of a tree.
///
/// XGBoost JSON format:
/// - categories_nodes: which node indices have categorical splits
/// - categories_segments: start index into categories array for each node
/// - categories_sizes: number of category values for each node
/// - categories: flat array of category integer values
fn categories_by_node(xgb_tree: &XgbTree, tree_idx: usize) -> Result<Vec<(usize, CategoryMask)>> {
    let mut out = Vec::with_capacity(xgb_tree.categories_nodes.len());
    for (i, &node) in xgb_tree.categories_nodes.iter().enumerate() {
        let start = xgb_tree.categories_segments.get(i).copied().unwrap_or(0) as usize;
        let size = xgb_tree.categories_sizes.get(i).copied().unwrap_or(0) as usize;
        let values = xgb_tree
            .categories
            .get(start..start + size)
            .ok_or_else(|| {
                Error::engine(format!(
                    "tree {tree_idx}: category segment of node {node} is out of bounds"
                ))
            })?;
        let values: Vec<u32> = values.iter().map(|&c| c.max(0) as u32).collect();
        let mask = CategoryMask::from_categories(&values).map_err(|e| {
            Error::engine(format!("tree {tree_idx}, node {node}: {e}"))
        })?;
        out.push((node as usize, mask));
    }
    Ok(out)
}
