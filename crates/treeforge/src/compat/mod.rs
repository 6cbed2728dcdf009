//! Loaders for models trained by external frameworks.
//!
//! Every importer parses its format into foreign types and then rebuilds the
//! ensemble through [`EnsembleBuilder`](crate::builder::EnsembleBuilder), so an
//! imported model passes the same commit checks as a hand-built one.
//!
//! Each loader is feature-gated; a disabled loader reports
//! [`Error::MissingDependency`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::model::Model;

#[cfg(feature = "lightgbm")]
pub mod lightgbm;
#[cfg(feature = "xgboost")]
pub mod xgboost;

/// On-disk model formats understood by [`Model::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFormat {
    /// XGBoost JSON model (`Booster.save_model("model.json")`).
    XGBoost,
    /// LightGBM text model (`Booster.save_model("model.txt")`).
    LightGBM,
    /// Protocol buffers model.
    Protobuf,
}

impl FromStr for ModelFormat {
    type Err = Error;

    /// Case-insensitive. Non-ASCII input is rejected outright.
    fn from_str(s: &str) -> Result<Self> {
        if !s.is_ascii() {
            return Err(Error::UnsupportedFormat(s.to_string()));
        }
        match s.to_ascii_lowercase().as_str() {
            "xgboost" => Ok(ModelFormat::XGBoost),
            "lightgbm" => Ok(ModelFormat::LightGBM),
            "protobuf" => Ok(ModelFormat::Protobuf),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelFormat::XGBoost => "xgboost",
            ModelFormat::LightGBM => "lightgbm",
            ModelFormat::Protobuf => "protobuf",
        })
    }
}

impl Model {
    /// Load a model file written by an external framework.
    ///
    /// `format` is one of `xgboost`, `lightgbm` or `protobuf` in any letter
    /// case. It is validated before the file is touched. The file is only read.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use treeforge::Model;
    ///
    /// let model = Model::load("model.json", "xgboost")?;
    /// println!("{} trees", model.num_trees());
    /// ```
    pub fn load(path: impl AsRef<Path>, format: &str) -> Result<Model> {
        let format: ModelFormat = format.parse()?;
        Self::load_format(path, format)
    }

    /// [`load`](Self::load) with an already parsed format.
    pub fn load_format(path: impl AsRef<Path>, format: ModelFormat) -> Result<Model> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), %format, "loading model");
        match format {
            ModelFormat::XGBoost => load_xgboost(path),
            ModelFormat::LightGBM => load_lightgbm(path),
            ModelFormat::Protobuf => Err(Error::MissingDependency(
                "protobuf model loading requires a protobuf runtime, which this build does not include"
                    .to_string(),
            )),
        }
    }

    /// Convert an in-memory XGBoost model (the JSON bytes produced by
    /// `Booster.save_raw("json")`).
    pub fn from_xgboost_buffer(buffer: &[u8]) -> Result<Model> {
        #[cfg(feature = "xgboost")]
        {
            xgboost::XgbModel::from_slice(buffer)?.to_model()
        }
        #[cfg(not(feature = "xgboost"))]
        {
            let _ = buffer;
            Err(missing_feature("xgboost"))
        }
    }
}

#[cfg(feature = "xgboost")]
fn load_xgboost(path: &Path) -> Result<Model> {
    xgboost::XgbModel::from_file(path)?.to_model()
}

#[cfg(not(feature = "xgboost"))]
fn load_xgboost(_path: &Path) -> Result<Model> {
    Err(missing_feature("xgboost"))
}

#[cfg(feature = "lightgbm")]
fn load_lightgbm(path: &Path) -> Result<Model> {
    lightgbm::LgbModel::from_file(path)?.to_model()
}

#[cfg(not(feature = "lightgbm"))]
fn load_lightgbm(_path: &Path) -> Result<Model> {
    Err(missing_feature("lightgbm"))
}

#[cfg(any(not(feature = "xgboost"), not(feature = "lightgbm")))]
fn missing_feature(name: &str) -> Error {
    Error::MissingDependency(format!(
        "{name} model loading is disabled; rebuild with the `{name}` feature"
    ))
}
