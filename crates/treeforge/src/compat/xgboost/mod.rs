//! XGBoost JSON model format support.
//!
//! Parses XGBoost's JSON model format and rebuilds it as a committed
//! [`Model`](crate::Model). Only tree boosters (`gbtree`, `dart`) are supported.

mod convert;
mod json;

pub use json::*;
