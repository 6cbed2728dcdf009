//! Ordered tree sequence plus ensemble-level configuration.
//!
//! # Example
//!
//! ```
//! use treeforge::builder::{EnsembleBuilder, EnsembleConfig, Operator, TreeBuilder};
//!
//! let config = EnsembleConfig::builder()
//!     .num_feature(4)
//!     .params([("pred_transform", "sigmoid")])
//!     .build()
//!     .unwrap();
//! let mut ensemble = EnsembleBuilder::new(config).unwrap();
//!
//! let mut tree = TreeBuilder::new();
//! tree.get_or_create(0)
//!     .set_numerical_test(2, Operator::Lt, 0.5, true, 1, 2)
//!     .unwrap();
//! tree.set_leaf(1, 0.3f32).unwrap();
//! tree.set_leaf(2, -0.3f32).unwrap();
//! tree.set_root(0).unwrap();
//!
//! ensemble.append(tree);
//! let model = ensemble.commit().unwrap();
//! assert_eq!(model.num_trees(), 1);
//! ```

use std::fmt::Display;

use bon::Builder;

use super::commit::commit;
use super::tree::TreeBuilder;
use crate::error::{Error, Result};
use crate::model::Model;
use crate::params::Params;

// =============================================================================
// EnsembleConfig
// =============================================================================

/// Ensemble-wide settings fixed at construction.
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct EnsembleConfig {
    /// Number of input features. Split features must be below this.
    pub num_feature: u32,

    /// Number of output groups. Values above 1 mean multiclass. Default: 1.
    #[builder(default = 1)]
    pub num_output_group: u32,

    /// Trees vote independently (averaged) instead of being summed. Default: false.
    #[builder(default)]
    pub random_forest: bool,

    /// Model parameters forwarded to commit (`pred_transform`, `sigmoid_alpha`,
    /// `global_bias`).
    #[builder(default, into)]
    pub params: Params,
}

impl<S: ensemble_config_builder::IsComplete> EnsembleConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `num_feature` or `num_output_group`
    /// is zero.
    pub fn build(self) -> Result<EnsembleConfig> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl EnsembleConfig {
    /// Check that the feature and output-group counts are positive.
    pub fn validate(&self) -> Result<()> {
        if self.num_feature == 0 {
            return Err(Error::validation("num_feature must be a positive integer"));
        }
        if self.num_output_group == 0 {
            return Err(Error::validation("num_output_group must be a positive integer"));
        }
        Ok(())
    }
}

// =============================================================================
// EnsembleBuilder
// =============================================================================

/// Ordered sequence of trees under construction.
///
/// Trees are moved in by [`insert`](Self::insert) or [`append`](Self::append);
/// from then on the ensemble owns them and they are reachable by position only.
#[derive(Debug, Clone)]
pub struct EnsembleBuilder {
    config: EnsembleConfig,
    trees: Vec<TreeBuilder>,
}

impl EnsembleBuilder {
    /// Create an empty ensemble. The configuration is validated again here.
    pub fn new(config: EnsembleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            trees: Vec::new(),
        })
    }

    /// Single-output boosted ensemble over `num_feature` features.
    pub fn with_features(num_feature: u32) -> Result<Self> {
        Self::new(EnsembleConfig::builder().num_feature(num_feature).build()?)
    }

    #[inline]
    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Add or override a model parameter.
    pub fn set_param(&mut self, key: impl Into<String>, value: impl Display) {
        self.config.params.set(key, value);
    }

    // =========================================================================
    // Sequence interface
    // =========================================================================

    #[inline]
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Move `tree` into the ensemble at `index`.
    ///
    /// Trees previously at `index..` shift one position later. `index` may equal
    /// the current length; anything larger fails and leaves the ensemble as is.
    pub fn insert(&mut self, tree: TreeBuilder, index: usize) -> Result<()> {
        let len = self.trees.len();
        if index > len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        tracing::debug!(index, n_nodes = tree.len(), "inserting tree into ensemble");
        self.trees.insert(index, tree);
        Ok(())
    }

    /// Move `tree` to the end of the ensemble.
    pub fn append(&mut self, tree: TreeBuilder) {
        self.trees.push(tree);
    }

    /// Take the tree at `index` out of the ensemble.
    pub fn remove(&mut self, index: usize) -> Result<TreeBuilder> {
        let len = self.trees.len();
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        Ok(self.trees.remove(index))
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&TreeBuilder> {
        self.trees.get(index)
    }

    /// Mutable view of the tree at `index`.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut TreeBuilder> {
        self.trees.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TreeBuilder> {
        self.trees.iter()
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Freeze the current state into an immutable [`Model`].
    ///
    /// The builder is left untouched and can be mutated or committed again.
    pub fn commit(&self) -> Result<Model> {
        commit(&self.config, &self.trees)
    }
}

impl<'a> IntoIterator for &'a EnsembleBuilder {
    type Item = &'a TreeBuilder;
    type IntoIter = std::slice::Iter<'a, TreeBuilder>;

    fn into_iter(self) -> Self::IntoIter {
        self.trees.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(key: i32) -> TreeBuilder {
        let mut tree = TreeBuilder::new();
        tree.get_or_create(key);
        tree
    }

    fn tags(ensemble: &EnsembleBuilder) -> Vec<i32> {
        ensemble
            .iter()
            .map(|t| t.keys().next().unwrap())
            .collect()
    }

    #[test]
    fn config_defaults() {
        let config = EnsembleConfig::builder().num_feature(3).build().unwrap();
        assert_eq!(config.num_output_group, 1);
        assert!(!config.random_forest);
        assert!(config.params.is_empty());
    }

    #[test]
    fn config_rejects_zero_counts() {
        let err = EnsembleConfig::builder().num_feature(0).build().unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "got: {err:?}");

        let err = EnsembleConfig::builder()
            .num_feature(2)
            .num_output_group(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "got: {err:?}");
    }

    #[test]
    fn new_revalidates_hand_built_config() {
        let config = EnsembleConfig {
            num_feature: 0,
            num_output_group: 1,
            random_forest: false,
            params: Params::new(),
        };
        assert!(EnsembleBuilder::new(config).is_err());
    }

    #[test]
    fn insert_shifts_later_trees() {
        let mut ensemble = EnsembleBuilder::with_features(1).unwrap();
        ensemble.append(tagged(0));
        ensemble.append(tagged(1));
        ensemble.insert(tagged(9), 1).unwrap();
        assert_eq!(tags(&ensemble), vec![0, 9, 1]);

        ensemble.insert(tagged(7), 3).unwrap();
        assert_eq!(tags(&ensemble), vec![0, 9, 1, 7]);
    }

    #[test]
    fn insert_out_of_range_leaves_ensemble_unchanged() {
        let mut ensemble = EnsembleBuilder::with_features(1).unwrap();
        ensemble.append(tagged(0));
        let err = ensemble.insert(tagged(1), 2).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { index: 2, len: 1 }), "got: {err:?}");
        assert_eq!(tags(&ensemble), vec![0]);
    }

    #[test]
    fn remove_shifts_earlier() {
        let mut ensemble = EnsembleBuilder::with_features(1).unwrap();
        for k in 0..3 {
            ensemble.append(tagged(k));
        }
        let removed = ensemble.remove(1).unwrap();
        assert!(removed.contains(1));
        assert_eq!(tags(&ensemble), vec![0, 2]);
        assert!(matches!(
            ensemble.remove(2),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn trees_are_mutable_through_their_position() {
        let mut ensemble = EnsembleBuilder::with_features(1).unwrap();
        ensemble.append(TreeBuilder::new());
        ensemble.get_mut(0).unwrap().get_or_create(5);
        assert!(ensemble.get(0).unwrap().contains(5));
        assert!(ensemble.get(1).is_none());
    }

    #[test]
    fn reverse_iteration() {
        let mut ensemble = EnsembleBuilder::with_features(1).unwrap();
        for k in 0..3 {
            ensemble.append(tagged(k));
        }
        let rev: Vec<_> = ensemble.iter().rev().map(|t| t.keys().next().unwrap()).collect();
        assert_eq!(rev, vec![2, 1, 0]);
        assert_eq!((&ensemble).into_iter().count(), 3);
    }

    #[test]
    fn set_param_overrides() {
        let config = EnsembleConfig::builder()
            .num_feature(1)
            .params([("global_bias", "0.5")])
            .build()
            .unwrap();
        let mut ensemble = EnsembleBuilder::new(config).unwrap();
        ensemble.set_param("global_bias", 1.5);
        assert_eq!(ensemble.config().params.get("global_bias"), Some("1.5"));
    }
}
