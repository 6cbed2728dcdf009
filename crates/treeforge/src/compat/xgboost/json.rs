//! XGBoost JSON model schema.
//!
//! Foreign types used only for parsing; see `convert.rs` for the rebuild into
//! a committed model. Fields the importer does not need are left out and
//! ignored by serde.

use std::path::Path;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use serde_with::{serde_as, DisplayFromStr};

use crate::error::{Error, Result};

// =============================================================================
// Custom deserializers for XGBoost-specific formats
// =============================================================================

/// `base_score` appears as a number, a string, a bracketed string such as
/// `"[5E-1]"` or an array (multi-target models). The first value is used.
fn deserialize_base_score<'de, D>(deserializer: D) -> std::result::Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as SerdeError;

    let mut cur = Value::deserialize(deserializer)?;
    loop {
        cur = match cur {
            Value::Number(n) => {
                return n
                    .as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| SerdeError::custom("invalid number"));
            }
            Value::String(s) => {
                if let Ok(f) = s.trim().parse::<f32>() {
                    return Ok(f);
                }
                match serde_json::from_str::<Value>(&s) {
                    Ok(parsed @ Value::Array(_)) => parsed,
                    _ => {
                        return Err(SerdeError::custom(format!(
                            "cannot parse base_score from string: {s}"
                        )))
                    }
                }
            }
            Value::Array(arr) => match arr.into_iter().next() {
                Some(first) => first,
                None => return Err(SerdeError::custom("base_score is an empty array")),
            },
            _ => {
                return Err(SerdeError::custom(
                    "base_score must be number, string, or array",
                ))
            }
        };
    }
}

fn default_one() -> i64 {
    1
}

// =============================================================================
// Tree / model level definitions
// =============================================================================

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct TreeParam {
    #[serde_as(as = "DisplayFromStr")]
    pub num_nodes: i64,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "default_one")]
    pub size_leaf_vector: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct XgbTree {
    pub tree_param: TreeParam,
    pub base_weights: Vec<f32>,
    pub left_children: Vec<i32>,
    pub right_children: Vec<i32>,
    pub split_indices: Vec<i32>,
    pub split_conditions: Vec<f32>,
    pub default_left: Vec<i32>,
    /// 0 = numerical, 1 = categorical. Absent in models without categorical data.
    #[serde(default)]
    pub split_type: Vec<i32>,
    #[serde(default)]
    pub categories: Vec<i32>,
    #[serde(default)]
    pub categories_nodes: Vec<i32>,
    #[serde(default)]
    pub categories_segments: Vec<i64>,
    #[serde(default)]
    pub categories_sizes: Vec<i64>,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct GBTreeModelParam {
    #[serde_as(as = "DisplayFromStr")]
    pub num_trees: i64,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "default_one")]
    pub num_parallel_tree: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelTrees {
    pub gbtree_model_param: GBTreeModelParam,
    pub trees: Vec<XgbTree>,
    /// Output group of each tree.
    pub tree_info: Vec<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GBTreeDefinition {
    pub model: ModelTrees,
}

/// Gradient booster variants. Anything but a tree booster is unsupported.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum GradientBooster {
    Gbtree {
        model: ModelTrees,
    },
    Dart {
        gbtree: GBTreeDefinition,
        weight_drop: Vec<f32>,
    },
    #[serde(other)]
    Unsupported,
}

// =============================================================================
// Learner-level definitions
// =============================================================================

/// Training objective; only the name is needed to pick the output transform.
#[derive(Debug, Clone, Deserialize)]
pub struct XgbObjective {
    pub name: String,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct LearnerModelParam {
    /// Global bias in probability space.
    #[serde(deserialize_with = "deserialize_base_score")]
    pub base_score: f32,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default)]
    pub num_class: i64,
    #[serde_as(as = "DisplayFromStr")]
    pub num_feature: i64,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "default_one")]
    pub num_target: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Learner {
    pub gradient_booster: GradientBooster,
    pub objective: XgbObjective,
    pub learner_model_param: LearnerModelParam,
}

// =============================================================================
// Top-level XGBoost model
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct XgbModel {
    #[serde(default)]
    pub version: [u32; 3],
    pub learner: Learner,
}

impl XgbModel {
    /// Read and parse a JSON model file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(parse_error)
    }

    /// Parse a JSON model held in memory.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(parse_error)
    }
}

fn parse_error(err: serde_json::Error) -> Error {
    Error::engine(format!("failed to parse XGBoost JSON model: {err}"))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base_score_parses_number_string_array_and_bracketed() {
        for raw in [json!(1.5), json!("1.5"), json!([1.5]), json!("[1.5E0]")] {
            let v = json!({"base_score": raw, "num_class": "0", "num_feature": "3"});
            let p: LearnerModelParam = serde_json::from_value(v).unwrap();
            assert_eq!(p.base_score, 1.5);
            assert_eq!(p.num_target, 1);
        }
    }

    #[test]
    fn base_score_rejects_garbage() {
        let v = json!({"base_score": "half", "num_class": "0", "num_feature": "3"});
        assert!(serde_json::from_value::<LearnerModelParam>(v).is_err());
    }

    #[test]
    fn linear_booster_is_unsupported() {
        let v = json!({"name": "gblinear", "model": {"weights": [0.1, 0.2]}});
        let booster: GradientBooster = serde_json::from_value(v).unwrap();
        assert!(matches!(booster, GradientBooster::Unsupported));
    }

    #[test]
    fn categorical_arrays_default_to_empty() {
        let v = json!({
            "tree_param": {"num_nodes": "1", "num_feature": "2", "num_deleted": "0", "size_leaf_vector": "1"},
            "base_weights": [0.5],
            "left_children": [-1],
            "right_children": [-1],
            "split_indices": [0],
            "split_conditions": [0.5],
            "default_left": [0]
        });
        let tree: XgbTree = serde_json::from_value(v).unwrap();
        assert_eq!(tree.tree_param.num_nodes, 1);
        assert!(tree.split_type.is_empty());
        assert!(tree.categories_nodes.is_empty());
    }

    #[test]
    fn malformed_buffer_is_engine_error() {
        let err = XgbModel::from_slice(b"{not json").unwrap_err();
        assert!(matches!(err, Error::Engine(_)), "got: {err:?}");
    }
}
