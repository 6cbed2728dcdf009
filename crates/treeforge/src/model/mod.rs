//! Immutable committed models.
//!
//! A [`Model`] is produced only by [`EnsembleBuilder::commit`] (directly, or
//! through an importer such as [`Model::load`]). It is consumed by the code
//! generator ([`Model::compile`]) and the shared-library exporter
//! ([`Model::export_library`]).
//!
//! [`EnsembleBuilder::commit`]: crate::builder::EnsembleBuilder::commit

mod param;
mod tree;

pub use param::{ModelParam, PredTransform};
pub use tree::{NodeId, SplitType, Tree};

/// Immutable tree ensemble.
#[derive(Debug, Clone)]
pub struct Model {
    num_feature: u32,
    num_output_group: u32,
    random_forest: bool,
    leaf_vector: bool,
    param: ModelParam,
    trees: Vec<Tree>,
}

impl Model {
    pub(crate) fn from_parts(
        num_feature: u32,
        num_output_group: u32,
        random_forest: bool,
        leaf_vector: bool,
        param: ModelParam,
        trees: Vec<Tree>,
    ) -> Self {
        Self {
            num_feature,
            num_output_group,
            random_forest,
            leaf_vector,
            param,
            trees,
        }
    }

    #[inline]
    pub fn num_feature(&self) -> u32 {
        self.num_feature
    }

    #[inline]
    pub fn num_output_group(&self) -> u32 {
        self.num_output_group
    }

    /// Whether tree outputs are averaged rather than summed.
    #[inline]
    pub fn random_forest(&self) -> bool {
        self.random_forest
    }

    /// Whether leaves carry one value per output group.
    #[inline]
    pub fn has_leaf_vector(&self) -> bool {
        self.leaf_vector
    }

    #[inline]
    pub fn param(&self) -> &ModelParam {
        &self.param
    }

    #[inline]
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Get a reference to a specific tree.
    #[inline]
    pub fn tree(&self, idx: usize) -> &Tree {
        &self.trees[idx]
    }

    pub fn trees(&self) -> impl ExactSizeIterator<Item = &Tree> {
        self.trees.iter()
    }

    /// Output group a scalar-leaf tree contributes to.
    ///
    /// Trees are dealt round-robin over the output groups; with a single group
    /// or vector leaves this is always 0.
    #[inline]
    pub fn tree_group(&self, idx: usize) -> u32 {
        if self.leaf_vector {
            0
        } else {
            (idx % self.num_output_group as usize) as u32
        }
    }
}
