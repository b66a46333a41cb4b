//! Core domain types for bundle documents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BundleBuilderError, Result};

/// Discriminator field naming the downstream class or function to instantiate.
pub const TARGET_KEY: &str = "_target_";

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// One of the two top-level pipeline subtrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Train,
    Validate,
}

impl Phase {
    /// Section key of this phase in the document.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Validate => "validate",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = BundleBuilderError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "train" => Ok(Self::Train),
            "validate" => Ok(Self::Validate),
            other => Err(BundleBuilderError::validation(format!(
                "unknown phase '{other}': expected 'train' or 'validate'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// TransformPhases
// ---------------------------------------------------------------------------

/// Which phases a deterministic or postprocessing transform applies to.
///
/// `Shared` adds the item to `train` and a positional cross-reference to it in
/// `validate`, so both phases run the exact same transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformPhases {
    #[default]
    Shared,
    TrainOnly,
    ValidateOnly,
}

impl TransformPhases {
    /// Build from the pair of phase flags. Returns `None` when both are false.
    pub fn from_flags(is_train: bool, is_validate: bool) -> Option<Self> {
        match (is_train, is_validate) {
            (true, true) => Some(Self::Shared),
            (true, false) => Some(Self::TrainOnly),
            (false, true) => Some(Self::ValidateOnly),
            (false, false) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// MetricSlot
// ---------------------------------------------------------------------------

/// Metric container within a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSlot {
    /// `key_metric`: drives checkpoint selection.
    Key,
    /// `additional_metrics`: reported only.
    Additional,
}

impl MetricSlot {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Key => "key_metric",
            Self::Additional => "additional_metrics",
        }
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// A downstream framework construct: a target name plus keyword arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Class or function name written to [`TARGET_KEY`].
    pub target: String,
    /// Keyword arguments, in insertion order.
    pub args: Map<String, Value>,
}

impl Item {
    /// Create an item with no arguments.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            args: Map::new(),
        }
    }

    /// Create an item from a kwargs value, which must be a mapping or null.
    pub fn from_kwargs(target: impl Into<String>, kwargs: Value) -> Result<Self> {
        let target = target.into();
        let args = match kwargs {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(BundleBuilderError::validation(format!(
                    "kwargs for '{target}' must be a mapping, got {}",
                    value_kind(&other)
                )));
            }
        };
        Ok(Self { target, args })
    }

    /// Add a keyword argument.
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Render as a mapping with the discriminator first.
    pub fn into_map(self) -> Map<String, Value> {
        let mut map = Map::with_capacity(self.args.len() + 1);
        map.insert(TARGET_KEY.to_string(), Value::String(self.target));
        for (key, value) in self.args {
            // A `_target_` passed in kwargs would silently replace the name.
            if key != TARGET_KEY {
                map.insert(key, value);
            }
        }
        map
    }
}

impl From<Item> for Value {
    fn from(item: Item) -> Self {
        Value::Object(item.into_map())
    }
}

/// Short name of a JSON value's kind, for error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn item_renders_target_first() {
        let item = Item::from_kwargs("DiceCELoss", json!({"to_onehot_y": true, "softmax": true}))
            .expect("mapping kwargs");
        let value = Value::from(item);
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["_target_", "to_onehot_y", "softmax"]);
        assert_eq!(value["_target_"], "DiceCELoss");
    }

    #[test]
    fn item_rejects_scalar_kwargs() {
        let err = Item::from_kwargs("Dataset", json!(3)).unwrap_err();
        assert!(err.to_string().contains("must be a mapping, got number"));
    }

    #[test]
    fn null_kwargs_mean_no_arguments() {
        let item = Item::from_kwargs("SimpleInferer", Value::Null).unwrap();
        assert!(item.args.is_empty());
        assert_eq!(Value::from(item), json!({"_target_": "SimpleInferer"}));
    }

    #[test]
    fn builder_style_args() {
        let item = Item::new("Compose").arg("transforms", "$@train#deterministic_transforms");
        assert_eq!(
            Value::from(item),
            json!({"_target_": "Compose", "transforms": "$@train#deterministic_transforms"})
        );
    }

    #[test]
    fn phase_parse_and_display() {
        assert_eq!("train".parse::<Phase>().unwrap(), Phase::Train);
        assert_eq!(Phase::Validate.to_string(), "validate");
        assert!("test".parse::<Phase>().is_err());
    }

    #[test]
    fn transform_phases_from_flags() {
        assert_eq!(TransformPhases::from_flags(true, true), Some(TransformPhases::Shared));
        assert_eq!(TransformPhases::from_flags(true, false), Some(TransformPhases::TrainOnly));
        assert_eq!(TransformPhases::from_flags(false, true), Some(TransformPhases::ValidateOnly));
        assert_eq!(TransformPhases::from_flags(false, false), None);
        assert_eq!(TransformPhases::default(), TransformPhases::Shared);
    }
}
