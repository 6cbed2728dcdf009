//! Test helpers shared by unit and integration tests.
//!
//! [`tree_builder!`](crate::tree_builder) declares a [`TreeBuilder`] node by
//! node. The first node listed becomes the root.
//!
//! ```
//! let tree = treeforge::tree_builder! {
//!     0 => num(2, Lt, 0.5, L) -> 1, 2,
//!     1 => leaf(0.3),
//!     2 => cat(0, [1, 3], R) -> 3, 4,
//!     3 => leaf(-0.1),
//!     4 => vleaf([0.2, 0.8]),
//! };
//! assert_eq!(tree.len(), 5);
//! assert_eq!(tree.root(), Some(0));
//! ```
//!
//! Default directions are written `L` or `R`. Panics on any builder error.
//!
//! [`TreeBuilder`]: crate::builder::TreeBuilder

/// Declare a [`TreeBuilder`](crate::builder::TreeBuilder) node by node.
///
/// See the [`testing`](crate::testing) module for the syntax.
#[macro_export]
macro_rules! tree_builder {
    ($($body:tt)*) => {{
        let mut tree = $crate::builder::TreeBuilder::new();
        let mut root: ::core::option::Option<$crate::builder::NodeKey> = None;
        $crate::__tree_builder_nodes!(tree, root; $($body)*);
        if let Some(key) = root {
            tree.set_root(key).expect("tree_builder!: root");
        }
        tree
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __tree_builder_nodes {
    (@root $root:ident, $key:expr) => {
        if $root.is_none() {
            $root = Some($key);
        }
    };
    (@left L) => { true };
    (@left R) => { false };

    ($tree:ident, $root:ident;) => {};

    ($tree:ident, $root:ident; $key:literal => leaf($v:expr) $(, $($rest:tt)*)?) => {
        $crate::__tree_builder_nodes!(@root $root, $key);
        $tree
            .get_or_create($key)
            .set_leaf($v as f32)
            .expect("tree_builder!: leaf");
        $crate::__tree_builder_nodes!($tree, $root; $($($rest)*)?);
    };

    ($tree:ident, $root:ident; $key:literal => vleaf([$($v:expr),* $(,)?]) $(, $($rest:tt)*)?) => {
        $crate::__tree_builder_nodes!(@root $root, $key);
        $tree
            .get_or_create($key)
            .set_leaf(vec![$($v as f32),*])
            .expect("tree_builder!: vector leaf");
        $crate::__tree_builder_nodes!($tree, $root; $($($rest)*)?);
    };

    ($tree:ident, $root:ident;
        $key:literal => num($feat:expr, $op:ident, $thr:expr, $dir:ident) -> $left:expr, $right:expr
        $(, $($rest:tt)*)?
    ) => {
        $crate::__tree_builder_nodes!(@root $root, $key);
        $tree
            .get_or_create($key)
            .set_numerical_test(
                $feat,
                $crate::builder::Operator::$op,
                $thr as f32,
                $crate::__tree_builder_nodes!(@left $dir),
                $left,
                $right,
            )
            .expect("tree_builder!: numerical test");
        $crate::__tree_builder_nodes!($tree, $root; $($($rest)*)?);
    };

    ($tree:ident, $root:ident;
        $key:literal => cat($feat:expr, [$($c:expr),* $(,)?], $dir:ident) -> $left:expr, $right:expr
        $(, $($rest:tt)*)?
    ) => {
        $crate::__tree_builder_nodes!(@root $root, $key);
        $tree
            .get_or_create($key)
            .set_categorical_test(
                $feat,
                &[$($c),*],
                $crate::__tree_builder_nodes!(@left $dir),
                $left,
                $right,
            )
            .expect("tree_builder!: categorical test");
        $crate::__tree_builder_nodes!($tree, $root; $($($rest)*)?);
    };
}

#[cfg(test)]
mod tests {
    use crate::builder::{NodeState, Operator};

    #[test]
    fn declares_nodes_in_order() {
        let tree = crate::tree_builder! {
            7 => num(1, Ge, 2.5, R) -> 8, 9,
            8 => leaf(1),
            9 => leaf(-1.5),
        };
        assert_eq!(tree.keys().collect::<Vec<_>>(), vec![7, 8, 9]);
        assert_eq!(tree.root(), Some(7));
        match tree.get(7).unwrap().state() {
            NodeState::NumericalTest(split) => {
                assert_eq!(split.op, Operator::Ge);
                assert!(!split.default_left);
            }
            other => panic!("expected numerical test, got {other:?}"),
        }
        assert_eq!(tree.get(8).unwrap().leaf_value().unwrap().as_scalar(), Some(1.0));
    }
}
