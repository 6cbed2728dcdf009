//! Model-level parameters fixed at commit.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::params::Params;

/// Transformation applied to the summed margin to produce a prediction.
///
/// Generated predictors apply it unless the caller asks for raw margins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PredTransform {
    /// Output = margin.
    #[default]
    Identity,
    /// `1 / (1 + exp(-alpha * margin))`. Single output group only.
    Sigmoid,
    /// Normalized exponentials across output groups.
    Softmax,
    /// Sigmoid applied to every output group independently.
    MulticlassOva,
    /// Index of the largest output group.
    MaxIndex,
    /// `exp(margin)`.
    Exponential,
    /// `ln(1 + exp(margin))`.
    LogarithmOnePlusExp,
}

impl PredTransform {
    pub const fn name(self) -> &'static str {
        match self {
            PredTransform::Identity => "identity",
            PredTransform::Sigmoid => "sigmoid",
            PredTransform::Softmax => "softmax",
            PredTransform::MulticlassOva => "multiclass_ova",
            PredTransform::MaxIndex => "max_index",
            PredTransform::Exponential => "exponential",
            PredTransform::LogarithmOnePlusExp => "logarithm_one_plus_exp",
        }
    }

    /// Whether the transform operates across several output groups.
    pub const fn is_multiclass(self) -> bool {
        matches!(
            self,
            PredTransform::Softmax | PredTransform::MulticlassOva | PredTransform::MaxIndex
        )
    }
}

impl FromStr for PredTransform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "identity" => PredTransform::Identity,
            "sigmoid" => PredTransform::Sigmoid,
            "softmax" => PredTransform::Softmax,
            "multiclass_ova" => PredTransform::MulticlassOva,
            "max_index" => PredTransform::MaxIndex,
            "exponential" => PredTransform::Exponential,
            "logarithm_one_plus_exp" => PredTransform::LogarithmOnePlusExp,
            other => {
                return Err(Error::validation(format!("unknown pred_transform '{other}'")))
            }
        })
    }
}

impl fmt::Display for PredTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters carried by a committed model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParam {
    pub pred_transform: PredTransform,
    /// Scaling factor inside the sigmoid. Must be positive. Default: 1.
    pub sigmoid_alpha: f32,
    /// Added to every output group before the transform. Default: 0.
    pub global_bias: f32,
}

impl Default for ModelParam {
    fn default() -> Self {
        Self {
            pred_transform: PredTransform::Identity,
            sigmoid_alpha: 1.0,
            global_bias: 0.0,
        }
    }
}

impl ModelParam {
    /// Keys accepted by [`from_params`](Self::from_params).
    pub const KEYS: [&'static str; 3] = ["pred_transform", "sigmoid_alpha", "global_bias"];

    /// Read model parameters, starting from defaults.
    ///
    /// Unknown keys are logged and ignored. Malformed values fail with
    /// [`Error::Engine`].
    pub fn from_params(params: &Params) -> Result<Self> {
        let mut param = Self::default();
        for key in params.keys().filter(|k| !Self::KEYS.iter().any(|known| known == k)) {
            tracing::warn!(key, "ignoring unknown model parameter");
        }

        if let Some(t) = params.parse::<PredTransform>("pred_transform").map_err(to_engine)? {
            param.pred_transform = t;
        }
        if let Some(alpha) = params.parse::<f32>("sigmoid_alpha").map_err(to_engine)? {
            if alpha.is_nan() || alpha <= 0.0 {
                return Err(Error::engine(format!(
                    "sigmoid_alpha must be strictly positive, got {alpha}"
                )));
            }
            param.sigmoid_alpha = alpha;
        }
        if let Some(bias) = params.parse::<f32>("global_bias").map_err(to_engine)? {
            param.global_bias = bias;
        }
        Ok(param)
    }
}

fn to_engine(err: Error) -> Error {
    match err {
        Error::Validation(msg) => Error::Engine(msg),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case("identity", PredTransform::Identity)]
    #[case("sigmoid", PredTransform::Sigmoid)]
    #[case("softmax", PredTransform::Softmax)]
    #[case("multiclass_ova", PredTransform::MulticlassOva)]
    #[case("max_index", PredTransform::MaxIndex)]
    #[case("exponential", PredTransform::Exponential)]
    #[case("logarithm_one_plus_exp", PredTransform::LogarithmOnePlusExp)]
    fn transform_names(#[case] name: &str, #[case] transform: PredTransform) {
        assert_eq!(name.parse::<PredTransform>().unwrap(), transform);
        assert_eq!(transform.to_string(), name);
    }

    #[test]
    fn defaults_when_empty() {
        assert_eq!(ModelParam::from_params(&Params::new()).unwrap(), ModelParam::default());
    }

    #[test]
    fn reads_known_keys_and_ignores_others() {
        let params = Params::from([
            ("pred_transform", "sigmoid"),
            ("sigmoid_alpha", "2.5"),
            ("global_bias", "-0.5"),
            ("learning_rate", "0.1"),
        ]);
        let param = ModelParam::from_params(&params).unwrap();
        assert_eq!(param.pred_transform, PredTransform::Sigmoid);
        assert_relative_eq!(param.sigmoid_alpha, 2.5);
        assert_relative_eq!(param.global_bias, -0.5);
    }

    #[rstest]
    #[case("pred_transform", "logit")]
    #[case("sigmoid_alpha", "0")]
    #[case("sigmoid_alpha", "-1")]
    #[case("global_bias", "lots")]
    fn malformed_values_are_engine_errors(#[case] key: &str, #[case] value: &str) {
        let err = ModelParam::from_params(&Params::single(key, value)).unwrap_err();
        assert!(matches!(err, Error::Engine(_)), "got: {err:?}");
    }
}
