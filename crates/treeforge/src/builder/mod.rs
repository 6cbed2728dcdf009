//! Incremental ensemble construction.
//!
//! Build flow: configure nodes inside a [`TreeBuilder`], move each finished
//! tree into an [`EnsembleBuilder`], then [`commit`](EnsembleBuilder::commit)
//! to obtain an immutable [`Model`](crate::Model).

/// Caller-chosen node identifier, unique within one tree.
pub type NodeKey = i32;

mod categories;
mod commit;
mod ensemble;
mod node;
mod tree;

pub use categories::CategoryMask;
pub use ensemble::{EnsembleBuilder, EnsembleConfig, EnsembleConfigBuilder};
pub use node::{CategoricalSplit, LeafValue, Node, NodeState, NumericalSplit, Operator};
pub use tree::{NodeMut, TreeBuilder};
