//! Node construction state.

use std::fmt;
use std::str::FromStr;

use super::categories::CategoryMask;
use super::NodeKey;
use crate::error::Error;

/// Relational operator of a numerical test: `[feature value] OP [threshold]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Operator {
    Eq,
    #[default]
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    /// The operator as written in C source.
    pub const fn symbol(self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(Operator::Eq),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            other => Err(Error::validation(format!(
                "unknown operator '{other}': must be one of ==, <, <=, >, >="
            ))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Output of a leaf node: one value, or one value per output group.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafValue {
    Scalar(f32),
    Vector(Vec<f32>),
}

impl LeafValue {
    #[inline]
    pub fn is_vector(&self) -> bool {
        matches!(self, LeafValue::Vector(_))
    }

    /// Scalar value, if this is a scalar leaf.
    #[inline]
    pub fn as_scalar(&self) -> Option<f32> {
        match self {
            LeafValue::Scalar(v) => Some(*v),
            LeafValue::Vector(_) => None,
        }
    }

    /// All values as a slice (length 1 for scalars).
    pub fn as_slice(&self) -> &[f32] {
        match self {
            LeafValue::Scalar(v) => std::slice::from_ref(v),
            LeafValue::Vector(v) => v,
        }
    }

    /// Multiply every value by `factor`.
    pub fn scale(&mut self, factor: f32) {
        match self {
            LeafValue::Scalar(v) => *v *= factor,
            LeafValue::Vector(vs) => vs.iter_mut().for_each(|v| *v *= factor),
        }
    }
}

impl From<f32> for LeafValue {
    fn from(value: f32) -> Self {
        LeafValue::Scalar(value)
    }
}

impl From<Vec<f32>> for LeafValue {
    fn from(values: Vec<f32>) -> Self {
        LeafValue::Vector(values)
    }
}

impl From<&[f32]> for LeafValue {
    fn from(values: &[f32]) -> Self {
        LeafValue::Vector(values.to_vec())
    }
}

impl<const N: usize> From<[f32; N]> for LeafValue {
    fn from(values: [f32; N]) -> Self {
        LeafValue::Vector(values.to_vec())
    }
}

/// Numerical test payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericalSplit {
    pub feature: u32,
    pub op: Operator,
    pub threshold: f32,
    /// Direction taken when the feature value is missing.
    pub default_left: bool,
    pub left: NodeKey,
    pub right: NodeKey,
}

/// Categorical test payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalSplit {
    pub feature: u32,
    /// Categories routed to the left child; everything else goes right.
    pub left_categories: CategoryMask,
    /// Direction taken when the feature value is missing.
    pub default_left: bool,
    pub left: NodeKey,
    pub right: NodeKey,
}

/// Configuration state of a node.
///
/// A node starts [`Empty`](NodeState::Empty) and moves to exactly one of the
/// other states; configured nodes never change state again.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NodeState {
    #[default]
    Empty,
    Leaf(LeafValue),
    NumericalTest(NumericalSplit),
    CategoricalTest(CategoricalSplit),
}

impl NodeState {
    /// `(left, right)` child keys of a test node.
    pub fn children(&self) -> Option<(NodeKey, NodeKey)> {
        match self {
            NodeState::NumericalTest(s) => Some((s.left, s.right)),
            NodeState::CategoricalTest(s) => Some((s.left, s.right)),
            NodeState::Empty | NodeState::Leaf(_) => None,
        }
    }

    /// Feature tested by a test node.
    pub fn feature(&self) -> Option<u32> {
        match self {
            NodeState::NumericalTest(s) => Some(s.feature),
            NodeState::CategoricalTest(s) => Some(s.feature),
            NodeState::Empty | NodeState::Leaf(_) => None,
        }
    }
}

/// A node under construction.
///
/// `Node::new()` is the only way to create one, so a node obtained outside a
/// tree is always empty unless it was taken back out with
/// [`TreeBuilder::remove`](super::TreeBuilder::remove). The node's key lives
/// in the owning tree's map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub(crate) state: NodeState,
    pub(crate) is_root: bool,
    pub(crate) parent: Option<NodeKey>,
}

impl Node {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> &NodeState {
        &self.state
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self.state, NodeState::Empty)
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.state, NodeState::Leaf(_))
    }

    #[inline]
    pub fn is_test(&self) -> bool {
        self.state.children().is_some()
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Key of the test node that uses this node as a child.
    #[inline]
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> Option<(NodeKey, NodeKey)> {
        self.state.children()
    }

    /// Leaf payload, if this is a leaf.
    pub fn leaf_value(&self) -> Option<&LeafValue> {
        match &self.state {
            NodeState::Leaf(v) => Some(v),
            _ => None,
        }
    }
}
