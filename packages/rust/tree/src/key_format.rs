//! Key casing policy applied when a document is serialized.

use serde_json::{Map, Value};

use bundlebuilder_shared::{BundleBuilderError, Result};

/// Global key casing policy of a [`TreeBuilder`](crate::TreeBuilder).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyFormat {
    /// Rewrite every key to `snake_case`.
    pub underscore_keys: bool,
}

impl KeyFormat {
    /// Policy that rewrites every key to `snake_case`.
    pub fn underscore() -> Self {
        Self {
            underscore_keys: true,
        }
    }

    /// Apply the policy to a single key.
    pub fn format_key(&self, key: &str) -> String {
        if self.underscore_keys {
            to_underscore_case(key)
        } else {
            key.to_string()
        }
    }

    /// Apply the policy to every key of `value`, recursing through arrays and
    /// mappings. Values are left untouched.
    ///
    /// Fails with [`BundleBuilderError::Validation`] when two keys of one
    /// mapping format to the same key.
    pub fn apply(&self, value: Value) -> Result<Value> {
        if !self.underscore_keys {
            return Ok(value);
        }
        match value {
            Value::Object(map) => self.apply_map(map).map(Value::Object),
            Value::Array(items) => items
                .into_iter()
                .map(|v| self.apply(v))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => Ok(other),
        }
    }

    fn apply_map(&self, map: Map<String, Value>) -> Result<Map<String, Value>> {
        let mut out = Map::with_capacity(map.len());
        let mut sources: Vec<String> = Vec::with_capacity(map.len());

        for (key, value) in map {
            let formatted = self.format_key(&key);
            if let Some(pos) = out.keys().position(|k| k == &formatted) {
                return Err(BundleBuilderError::validation(format!(
                    "keys '{}' and '{key}' both render as '{formatted}'",
                    sources[pos]
                )));
            }
            out.insert(formatted, self.apply(value)?);
            sources.push(key);
        }

        Ok(out)
    }
}

/// Convert `camelCase`, `PascalCase`, `kebab-case` and spaced keys to `snake_case`.
///
/// Keys already in snake case, including ones with leading or trailing
/// underscores such as `_target_`, come back unchanged.
pub fn to_underscore_case(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == ' ' {
            out.push('_');
            continue;
        }
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let word_break = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                // End of an acronym: "HTTPServer" -> "http_server"
                Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                _ => false,
            };
            if word_break && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_common_casings() {
        assert_eq!(to_underscore_case("trainDataLoader"), "train_data_loader");
        assert_eq!(to_underscore_case("KeyMetric"), "key_metric");
        assert_eq!(to_underscore_case("key-metric"), "key_metric");
        assert_eq!(to_underscore_case("val interval"), "val_interval");
        assert_eq!(to_underscore_case("HTTPServer"), "http_server");
        assert_eq!(to_underscore_case("layer2Norm"), "layer2_norm");
    }

    #[test]
    fn leaves_snake_case_alone() {
        assert_eq!(to_underscore_case("_target_"), "_target_");
        assert_eq!(to_underscore_case("deterministic_transforms"), "deterministic_transforms");
        assert_eq!(to_underscore_case("train/accuracy"), "train/accuracy");
        assert_eq!(to_underscore_case("bundle_Root"), "bundle_root");
    }

    #[test]
    fn apply_rewrites_nested_keys_only() {
        let doc = json!({
            "networkDef": {"_target_": "SegResNet", "inChannels": "@inputChannels"},
            "handlers": [{"tagName": "train/loss"}]
        });
        let out = KeyFormat::underscore().apply(doc).unwrap();
        assert_eq!(
            out,
            json!({
                "network_def": {"_target_": "SegResNet", "in_channels": "@inputChannels"},
                "handlers": [{"tag_name": "train/loss"}]
            })
        );
    }

    #[test]
    fn default_policy_is_identity() {
        let doc = json!({"camelKey": 1});
        assert_eq!(KeyFormat::default().apply(doc.clone()).unwrap(), doc);
    }

    #[test]
    fn colliding_keys_are_rejected() {
        let doc = json!({"train": {"valInterval": 20, "val_interval": 50}});
        let err = KeyFormat::underscore().apply(doc).unwrap_err();
        assert!(matches!(err, BundleBuilderError::Validation { .. }));
        assert!(err.to_string().contains("'valInterval' and 'val_interval'"));
    }

    #[test]
    fn identity_policy_keeps_would_be_collisions() {
        let doc = json!({"valInterval": 20, "val_interval": 50});
        assert_eq!(KeyFormat::default().apply(doc.clone()).unwrap(), doc);
    }
}
