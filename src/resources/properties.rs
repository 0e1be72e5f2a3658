//! Pass Property Bags
//!
//! Every pass is created from a [`Properties`] bag and reports its current
//! configuration back as one. The bag is a thin wrapper around a
//! `serde_json` object so it can be written to and read from scripts or
//! files unchanged; enums travel as their variant names.
//!
//! Reading follows the same pattern in every pass:
//!
//! ```rust,ignore
//! for (key, value) in props.iter() {
//!     match key {
//!         "radius" => pass.set_radius(Properties::parse_f32(key, value)?),
//!         "depthMode" => pass.depth_mode = Properties::parse(key, value)?,
//!         _ => log::warn!("Unknown property '{key}' in a VAO properties"),
//!     }
//! }
//! ```
//!
//! Unknown keys are never fatal; values of the wrong type are
//! ([`AoError::InvalidProperty`]).

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::{AoError, Result};

/// Ordered key/value configuration of a render pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    values: Map<String, Value>,
}

impl Properties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, serializing it through `serde_json`.
    ///
    /// Types used as property values serialize infallibly (numbers, bools,
    /// unit-variant enums); anything else is stored as `null`.
    pub fn set(&mut self, key: &str, value: impl Serialize) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.values.insert(key.to_string(), value);
    }

    /// Builder form of [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        self.set(key, value);
        self
    }

    #[must_use]
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Deserializes a stored value.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.values
            .get(key)
            .map(|v| Self::parse(key, v))
            .transpose()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    // ========================================================================
    // Value parsing
    // ========================================================================

    pub fn parse<T: DeserializeOwned>(key: &str, value: &Value) -> Result<T> {
        serde_json::from_value(value.clone()).map_err(|e| AoError::InvalidProperty {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn parse_f32(key: &str, value: &Value) -> Result<f32> {
        value
            .as_f64()
            .map(|v| v as f32)
            .filter(|v| v.is_finite())
            .ok_or_else(|| AoError::InvalidProperty {
                key: key.to_string(),
                reason: format!("expected a finite number, got {value}"),
            })
    }

    pub fn parse_u32(key: &str, value: &Value) -> Result<u32> {
        value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| AoError::InvalidProperty {
                key: key.to_string(),
                reason: format!("expected an unsigned integer, got {value}"),
            })
    }

    pub fn parse_bool(key: &str, value: &Value) -> Result<bool> {
        value.as_bool().ok_or_else(|| AoError::InvalidProperty {
            key: key.to_string(),
            reason: format!("expected a boolean, got {value}"),
        })
    }

    // ========================================================================
    // Text form
    // ========================================================================

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.values)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let values: Map<String, Value> = serde_json::from_str(text)?;
        Ok(Self { values })
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::DepthMode;

    #[test]
    fn enum_values_travel_by_name() {
        let props = Properties::new().with("depthMode", DepthMode::StochasticDepth);
        assert_eq!(
            props.get_value("depthMode"),
            Some(&Value::String("StochasticDepth".into()))
        );
        let mode: Option<DepthMode> = props.get("depthMode").unwrap();
        assert_eq!(mode, Some(DepthMode::StochasticDepth));
    }

    #[test]
    fn wrong_type_is_an_error() {
        let props = Properties::new().with("radius", "large");
        let value = props.get_value("radius").unwrap();
        assert!(Properties::parse_f32("radius", value).is_err());
    }

    #[test]
    fn json_round_trip() {
        let props = Properties::new()
            .with("radius", 0.5f32)
            .with("dualAO", true)
            .with("stochMapDivisor", 2u32);
        let text = props.to_json().unwrap();
        let back = Properties::from_json(&text).unwrap();
        assert_eq!(props, back);
    }
}
