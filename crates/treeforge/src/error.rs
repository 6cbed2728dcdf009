//! Crate-wide error type.
//!
//! Every fallible operation in the crate returns [`Result`]. Errors from the
//! in-crate engine layer (commit, code generation, toolchain invocation) are
//! carried verbatim in [`Error::Engine`].

use std::path::PathBuf;

use crate::builder::NodeKey;

/// Errors produced while building, committing, loading, or compiling models.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An argument or constructor value is invalid.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// A node mutator was called for a key that is not registered in the tree.
    #[error(
        "node {key} has never been inserted into a tree; a node must be inserted before it can be configured"
    )]
    UnregisteredNode { key: NodeKey },

    /// A node was already configured as a leaf or test node.
    #[error("node {key} is already configured; delete it and insert an empty node to reconfigure")]
    NodeAlreadyConfigured { key: NodeKey },

    /// A node with this key already exists in the tree.
    #[error(
        "nodes with duplicate keys are not allowed; to replace node {key}, remove it first and insert an empty node with the same key"
    )]
    DuplicateKey { key: NodeKey },

    /// Only empty nodes may be inserted into a tree.
    #[error("can only insert an empty node (key {key})")]
    NonEmptyInsertion { key: NodeKey },

    /// An ensemble position is outside the valid range.
    #[error("index {index} out of range for ensemble of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// The requested model format is not recognized.
    #[error("unknown model format '{0}': must be one of {{xgboost, lightgbm, protobuf}}")]
    UnsupportedFormat(String),

    /// The shared library path does not carry the extension the toolchain produces.
    #[error("library path {path:?} must have extension '{expected}' when using toolchain '{toolchain}'")]
    ExtensionMismatch {
        toolchain: String,
        expected: &'static str,
        path: PathBuf,
    },

    /// An optional component required by the operation is not available.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// The engine layer rejected the request.
    #[error("{0}")]
    Engine(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn engine(message: impl Into<String>) -> Self {
        Error::Engine(message.into())
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
