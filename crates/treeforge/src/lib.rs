//! treeforge: build decision tree ensembles node by node and compile them to
//! native prediction code.
//!
//! Models are either assembled with the [`builder`] API or imported from
//! XGBoost and LightGBM ([`compat`]). A committed [`Model`] can be turned into
//! C99 sources ([`Model::compile`]) or straight into a shared library
//! ([`Model::export_library`]).

pub mod builder;
pub mod codegen;
pub mod compat;
pub mod error;
pub mod model;
pub mod params;
pub mod testing;
pub mod toolchain;
pub mod utils;

mod export;

pub use builder::{EnsembleBuilder, EnsembleConfig, LeafValue, NodeKey, Operator, TreeBuilder};
pub use codegen::GeneratedSources;
pub use compat::ModelFormat;
pub use error::{Error, Result};
pub use export::{ExportOptions, ExportOptionsBuilder};
pub use model::{Model, ModelParam, PredTransform};
pub use params::Params;
pub use toolchain::{create_shared, Toolchain};
