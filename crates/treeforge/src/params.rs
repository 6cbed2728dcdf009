//! Parameter normalization.
//!
//! Model and compiler parameters arrive in several shapes (maps, lists of
//! pairs, a single key with a value). [`Params`] collapses all of them into one
//! ordered sequence of `(key, string value)` pairs. Keys are not validated
//! here; the component that consumes the parameters decides what it accepts.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use treeforge::Params;
//!
//! let from_pairs = Params::from_iter([("pred_transform", "sigmoid")]);
//! let single = Params::single("parallel_comp", 4);
//!
//! let mut map = BTreeMap::new();
//! map.insert("global_bias", 0.5);
//! let from_map: Params = map.into_iter().collect();
//!
//! assert_eq!(from_pairs.get("pred_transform"), Some("sigmoid"));
//! assert_eq!(single.get("parallel_comp"), Some("4"));
//! assert_eq!(from_map.get("global_bias"), Some("0.5"));
//! ```

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Ordered sequence of string parameters.
///
/// Setting a key that is already present overwrites its value but keeps the
/// position where the key first appeared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// A parameter set holding exactly one entry.
    pub fn single(key: impl Into<String>, value: impl Display) -> Self {
        let mut params = Self::new();
        params.set(key, value);
        params
    }

    /// Set `key` to `value`, replacing any earlier value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Display) {
        let key = key.into();
        let value = value.to_string();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.set(key, value);
        self
    }

    /// Merge `other` into `self`; entries of `other` win on conflicts.
    pub fn extend_from(&mut self, other: &Params) {
        for (k, v) in other.iter() {
            self.set(k, v);
        }
    }

    /// Value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Parse the value for `key`.
    ///
    /// Returns `Ok(None)` when the key is absent and a validation error when the
    /// value does not parse as `T`.
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
                Error::validation(format!("invalid value '{raw}' for parameter '{key}': {e}"))
            }),
        }
    }

    /// Iterate over `(key, value)` pairs in order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &str)> + ExactSizeIterator {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate over keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Display,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Params
where
    K: Into<String>,
    V: Display,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K, V> From<Vec<(K, V)>> for Params
where
    K: Into<String>,
    V: Display,
{
    fn from(pairs: Vec<(K, V)>) -> Self {
        pairs.into_iter().collect()
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Params {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ParamsVisitor;

        impl<'de> Visitor<'de> for ParamsVisitor {
            type Value = Params;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of parameter names to scalar values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Params, A::Error> {
                let mut params = Params::new();
                while let Some((key, value)) = access.next_entry::<String, serde_json::Value>()? {
                    match value {
                        serde_json::Value::String(s) => params.set(key, s),
                        serde_json::Value::Number(n) => params.set(key, n),
                        serde_json::Value::Bool(b) => params.set(key, b),
                        other => {
                            return Err(serde::de::Error::custom(format!(
                                "parameter '{key}' must be a string, number or bool, got {other}"
                            )))
                        }
                    }
                }
                Ok(params)
            }
        }

        deserializer.deserialize_map(ParamsVisitor)
    }
}
