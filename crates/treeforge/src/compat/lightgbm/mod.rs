//! LightGBM text model format support.
//!
//! Parses LightGBM's text model format and rebuilds it as a committed
//! [`Model`](crate::Model).

mod convert;
mod text;

pub use text::{DecisionType, LgbHeader, LgbModel, LgbObjective, LgbTree, MissingType, ParseError};
