//! Reader for LightGBM's text model dump (`save_model()` output).
//!
//! The dump is a header block followed by one block per tree, each made of
//! `key=value` lines. Everything after `end of trees` (feature importances,
//! training parameters) is ignored.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::error::Error;

/// Error while reading a LightGBM text dump.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
    #[error("{field} has {actual} entries, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::engine(format!("failed to parse LightGBM model: {err}"))
    }
}

// =============================================================================
// Decision type
// =============================================================================

/// How a split treats missing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingType {
    /// Nothing is missing; NaN is read as zero.
    #[default]
    None,
    /// Zero counts as missing.
    Zero,
    /// NaN counts as missing.
    NaN,
}

/// Decoded `decision_type` byte.
///
/// Bit 0 marks a categorical split, bit 1 sends missing values left, and
/// bits 2-3 hold the [`MissingType`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionType {
    pub is_categorical: bool,
    pub default_left: bool,
    pub missing_type: MissingType,
}

impl DecisionType {
    pub fn from_bits(raw: i8) -> Self {
        let bits = raw as u8;
        let missing_type = match (bits >> 2) & 0b11 {
            1 => MissingType::Zero,
            2 => MissingType::NaN,
            _ => MissingType::None,
        };
        Self {
            is_categorical: bits & 0b01 != 0,
            default_left: bits & 0b10 != 0,
            missing_type,
        }
    }
}

// =============================================================================
// Objective
// =============================================================================

/// Objective line of the header, reduced to what decides the output transform.
#[derive(Debug, Clone, PartialEq)]
pub enum LgbObjective {
    Regression,
    Binary { sigmoid: f64 },
    Multiclass { num_class: usize },
    MulticlassOva { num_class: usize, sigmoid: f64 },
    CrossEntropy,
    CrossEntropyLambda,
    /// `poisson`, `gamma` or `tweedie`, all predicting through `exp`.
    LogLink(String),
    /// Anything else; predictions stay raw margins.
    Other(String),
}

impl LgbObjective {
    /// Parse an objective line such as `binary sigmoid:1` or
    /// `multiclass num_class:3`.
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let name = words.next().unwrap_or_default();
        let options: HashMap<&str, &str> = words.filter_map(|w| w.split_once(':')).collect();
        let sigmoid = options
            .get("sigmoid")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1.0);
        let num_class = options
            .get("num_class")
            .and_then(|v| v.parse().ok())
            .unwrap_or(2);

        match name {
            "regression" => Self::Regression,
            "binary" => Self::Binary { sigmoid },
            "multiclass" => Self::Multiclass { num_class },
            "multiclassova" => Self::MulticlassOva { num_class, sigmoid },
            "cross_entropy" | "xentropy" => Self::CrossEntropy,
            "cross_entropy_lambda" | "xentlambda" => Self::CrossEntropyLambda,
            "poisson" | "gamma" | "tweedie" => Self::LogLink(name.to_string()),
            _ => Self::Other(line.to_string()),
        }
    }
}

// =============================================================================
// Parsed model
// =============================================================================

/// Header fields used to rebuild the ensemble.
#[derive(Debug, Clone, Default)]
pub struct LgbHeader {
    pub version: String,
    /// `max_feature_idx + 1`.
    pub num_feature: usize,
    /// Trees per boosting round, one per output group.
    pub num_tree_per_iteration: usize,
    pub objective: Option<LgbObjective>,
    /// Set by a bare `average_output` line (random forest mode).
    pub average_output: bool,
}

/// One tree block. Per-node arrays hold `num_leaves - 1` entries.
#[derive(Debug, Clone, Default)]
pub struct LgbTree {
    pub num_leaves: usize,
    pub split_feature: Vec<i32>,
    /// Split threshold, or for categorical nodes an index into
    /// `cat_boundaries`.
    pub threshold: Vec<f64>,
    pub decision_type: Vec<i8>,
    /// Child references; negative values are `!leaf_index`.
    pub left_child: Vec<i32>,
    pub right_child: Vec<i32>,
    pub leaf_value: Vec<f64>,
    pub is_linear: bool,
    pub cat_boundaries: Vec<i32>,
    /// 32-bit words of all categorical bitsets, back to back.
    pub cat_threshold: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct LgbModel {
    pub header: LgbHeader,
    pub trees: Vec<LgbTree>,
}

impl LgbModel {
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_string(&content)?)
    }

    pub fn from_string(content: &str) -> Result<Self, ParseError> {
        let body = content.split("end of trees").next().unwrap_or_default();
        let mut blocks = body.split("\nTree=");
        let header = parse_header(&Fields::read(blocks.next().unwrap_or_default()))?;
        let trees = blocks
            .map(|block| parse_tree(&Fields::read(block)))
            .collect::<Result<_, _>>()?;
        Ok(Self { header, trees })
    }

    /// Number of output groups.
    pub fn num_groups(&self) -> usize {
        self.header.num_tree_per_iteration.max(1)
    }
}

// =============================================================================
// Field access
// =============================================================================

/// `key=value` lines of one block. Lines without `=` are kept as flags.
struct Fields<'a> {
    values: HashMap<&'a str, &'a str>,
    flags: Vec<&'a str>,
}

impl<'a> Fields<'a> {
    fn read(block: &'a str) -> Self {
        let mut values = HashMap::new();
        let mut flags = Vec::new();
        for line in block.lines().map(str::trim) {
            match line.split_once('=') {
                Some((key, value)) => {
                    values.insert(key, value);
                }
                None if !line.is_empty() => flags.push(line),
                None => {}
            }
        }
        Self { values, flags }
    }

    fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(&flag)
    }

    fn optional<T: FromStr>(&self, field: &'static str) -> Result<Option<T>, ParseError> {
        self.values
            .get(field)
            .map(|raw| {
                raw.trim().parse().map_err(|_| ParseError::InvalidValue {
                    field,
                    message: format!("cannot parse '{raw}'"),
                })
            })
            .transpose()
    }

    fn required<T: FromStr>(&self, field: &'static str) -> Result<T, ParseError> {
        self.optional(field)?.ok_or(ParseError::MissingField(field))
    }

    /// Whitespace-separated array, `None` when the key is absent.
    fn optional_array<T: FromStr>(&self, field: &'static str) -> Result<Option<Vec<T>>, ParseError> {
        self.values
            .get(field)
            .map(|raw| {
                raw.split_whitespace()
                    .map(|v| {
                        v.parse().map_err(|_| ParseError::InvalidValue {
                            field,
                            message: format!("cannot parse '{v}'"),
                        })
                    })
                    .collect()
            })
            .transpose()
    }

    /// Array that must be present with exactly `len` entries.
    fn array<T: FromStr>(&self, field: &'static str, len: usize) -> Result<Vec<T>, ParseError> {
        let values = self
            .optional_array(field)?
            .ok_or(ParseError::MissingField(field))?;
        check_len(field, &values, len)?;
        Ok(values)
    }
}

fn check_len<T>(field: &'static str, values: &[T], expected: usize) -> Result<(), ParseError> {
    if values.len() != expected {
        return Err(ParseError::LengthMismatch {
            field,
            expected,
            actual: values.len(),
        });
    }
    Ok(())
}

fn parse_header(fields: &Fields<'_>) -> Result<LgbHeader, ParseError> {
    let num_class: usize = fields.required("num_class")?;
    let max_feature_idx: usize = fields.required("max_feature_idx")?;
    Ok(LgbHeader {
        version: fields.values.get("version").copied().unwrap_or_default().to_string(),
        num_feature: max_feature_idx + 1,
        num_tree_per_iteration: fields
            .optional("num_tree_per_iteration")?
            .unwrap_or(num_class.max(1)),
        objective: fields.values.get("objective").map(|line| LgbObjective::parse(line)),
        average_output: fields.has_flag("average_output"),
    })
}

fn parse_tree(fields: &Fields<'_>) -> Result<LgbTree, ParseError> {
    let num_leaves: usize = fields.required("num_leaves")?;
    let is_linear = fields.optional::<i32>("is_linear")?.is_some_and(|v| v != 0);

    if num_leaves <= 1 {
        let leaf_value = fields
            .optional_array("leaf_value")?
            .unwrap_or_else(|| vec![0.0; num_leaves]);
        check_len("leaf_value", &leaf_value, num_leaves)?;
        return Ok(LgbTree {
            num_leaves,
            leaf_value,
            is_linear,
            ..LgbTree::default()
        });
    }

    let num_internal = num_leaves - 1;
    let decision_type = fields
        .optional_array("decision_type")?
        .unwrap_or_else(|| vec![0; num_internal]);
    check_len("decision_type", &decision_type, num_internal)?;

    let num_cat: usize = fields.optional("num_cat")?.unwrap_or(0);
    let (cat_boundaries, cat_threshold) = if num_cat > 0 {
        (
            fields.array("cat_boundaries", num_cat + 1)?,
            fields
                .optional_array("cat_threshold")?
                .ok_or(ParseError::MissingField("cat_threshold"))?,
        )
    } else {
        (Vec::new(), Vec::new())
    };

    Ok(LgbTree {
        num_leaves,
        split_feature: fields.array("split_feature", num_internal)?,
        threshold: fields.array("threshold", num_internal)?,
        decision_type,
        left_child: fields.array("left_child", num_internal)?,
        right_child: fields.array("right_child", num_internal)?,
        leaf_value: fields.array("leaf_value", num_leaves)?,
        is_linear,
        cat_boundaries,
        cat_threshold,
    })
}
