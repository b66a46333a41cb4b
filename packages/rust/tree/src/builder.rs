//! Root document builder and JSON emission.

use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;

use bundlebuilder_shared::{BundleBuilderError, Result};

use crate::key_format::KeyFormat;
use crate::node::{Node, NodeList};

/// Owns a document and its key casing policy.
///
/// All structural operations delegate to the root [`Node`]; the key format is
/// only applied when the document is rendered.
#[derive(Debug, Clone, Default)]
pub struct TreeBuilder {
    root: Node,
    key_format: KeyFormat,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key casing policy used by [`to_value`](Self::to_value) and
    /// [`to_json`](Self::to_json).
    pub fn key_format(&mut self, format: KeyFormat) -> &mut Self {
        self.key_format = format;
        self
    }

    pub fn attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.root.attribute(name, value);
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.root.has_node(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.root.get(name)
    }

    /// See [`Node::node`].
    pub fn node<T, F>(&mut self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Node) -> Result<T>,
    {
        self.root.node(key, f)
    }

    /// See [`Node::nodes`].
    pub fn nodes<T, F>(&mut self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut NodeList) -> Result<T>,
    {
        self.root.nodes(key, f)
    }

    /// The document with the key format applied.
    ///
    /// Fails if two keys of one mapping format to the same key.
    pub fn to_value(&self) -> Result<Value> {
        self.key_format.apply(Value::from(self.root.clone()))
    }

    /// Render the document as pretty JSON indented by `indent` spaces.
    ///
    /// Field order is insertion order.
    pub fn to_json(&self, indent: usize) -> Result<String> {
        let indent = " ".repeat(indent);
        let mut buf = Vec::new();
        let mut ser =
            serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(indent.as_bytes()));
        self.to_value()?
            .serialize(&mut ser)
            .map_err(|e| BundleBuilderError::Serialization(format!("JSON serialization failed: {e}")))?;
        String::from_utf8(buf).map_err(|e| BundleBuilderError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn to_json_uses_requested_indent_and_insertion_order() {
        let mut builder = TreeBuilder::new();
        builder.attribute("zeta", 1);
        builder.attribute("alpha", 2);

        let text = builder.to_json(4).unwrap();
        assert_eq!(text, "{\n    \"zeta\": 1,\n    \"alpha\": 2\n}");
    }

    #[test]
    fn key_format_applies_at_render_time_only() {
        let mut builder = TreeBuilder::new();
        builder.attribute("valInterval", 20);
        builder.key_format(KeyFormat::underscore());

        // Stored key is unchanged; rendering rewrites it.
        assert!(builder.has_node("valInterval"));
        assert_eq!(builder.to_value().unwrap(), json!({"val_interval": 20}));
    }

    #[test]
    fn keys_colliding_after_formatting_fail_to_render() {
        let mut builder = TreeBuilder::new();
        builder.attribute("valInterval", 20);
        builder.attribute("val_interval", 50);
        builder.key_format(KeyFormat::underscore());

        let err = builder.to_value().unwrap_err();
        assert!(matches!(err, BundleBuilderError::Validation { .. }));
        assert_eq!(
            err.to_string(),
            "validation error: keys 'valInterval' and 'val_interval' both render as 'val_interval'"
        );
        assert!(builder.to_json(4).is_err());

        // Both values are still stored.
        assert_eq!(builder.get("valInterval"), Some(&json!(20)));
        assert_eq!(builder.get("val_interval"), Some(&json!(50)));
    }

    #[test]
    fn nested_builders_through_root() {
        let mut builder = TreeBuilder::new();
        builder
            .node("train", |train| {
                train.nodes("handlers", |handlers| {
                    handlers.node(|h| {
                        h.attribute("_target_", "StatsHandler");
                        Ok(())
                    })
                })
            })
            .unwrap();
        builder
            .node("train", |train| {
                train.nodes("handlers", |handlers| {
                    handlers.node(|h| {
                        h.attribute("_target_", "CheckpointSaver");
                        Ok(())
                    })
                })
            })
            .unwrap();

        assert_eq!(
            builder.to_value().unwrap(),
            json!({"train": {"handlers": [
                {"_target_": "StatsHandler"},
                {"_target_": "CheckpointSaver"}
            ]}})
        );
    }

    #[test]
    fn rendered_json_parses_back() {
        let mut builder = TreeBuilder::new();
        builder.attribute("imports", json!(["$import glob"]));
        builder
            .node("network_def", |n| {
                n.attribute("_target_", "SegResNet");
                n.attribute("dropout_prob", 0.2);
                Ok(())
            })
            .unwrap();

        let parsed: Value = serde_json::from_str(&builder.to_json(2).unwrap()).unwrap();
        assert_eq!(parsed, builder.to_value().unwrap());
    }
}
