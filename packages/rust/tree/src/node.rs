//! Scoped node and node-list handles.
//!
//! A [`Node`] wraps one mapping of the document. Child nodes are opened with a
//! closure: the closure populates the child and the child is committed into
//! the parent when the closure returns `Ok`.
//!
//! Two flavours exist for both single nodes and node lists:
//! - `fresh_*` always starts from an empty container and replaces whatever
//!   the key held before.
//! - `node` / `nodes` reuse an existing container in place and only fall back
//!   to the fresh path when the key is absent.

use serde_json::{Map, Value};
use tracing::trace;

use bundlebuilder_shared::{BundleBuilderError, Result, value_kind};

/// Mutable handle onto one mapping within a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    data: Map<String, Value>,
}

impl Node {
    /// Create an empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing mapping.
    pub fn from_map(data: Map<String, Value>) -> Self {
        Self { data }
    }

    /// Set `name` to `value`, overwriting any previous value.
    pub fn attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(name.into(), value.into());
    }

    /// Set `name` to `value` only if `name` is absent. Returns whether it was set.
    pub fn attribute_if_absent(&mut self, name: &str, value: impl Into<Value>) -> bool {
        if self.data.contains_key(name) {
            return false;
        }
        self.data.insert(name.to_string(), value.into());
        true
    }

    /// Whether `name` is a direct child of this node.
    pub fn has_node(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    /// Direct child value, if present.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Open a new empty child node at `key`, replacing any previous value.
    ///
    /// The child is written into this node only if `f` succeeds.
    pub fn fresh_node<T, F>(&mut self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Node) -> Result<T>,
    {
        let mut child = Node::new();
        let out = f(&mut child)?;
        self.data.insert(key.to_string(), Value::Object(child.data));
        Ok(out)
    }

    /// Open the child node at `key`, reusing its content when it already exists.
    ///
    /// Content written by earlier opens is never discarded. Fails with
    /// [`BundleBuilderError::TypeConflict`] if `key` holds something other
    /// than a mapping.
    pub fn node<T, F>(&mut self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Node) -> Result<T>,
    {
        let Some(existing) = self.data.get_mut(key) else {
            return self.fresh_node(key, f);
        };

        match existing {
            Value::Object(map) => {
                trace!(key, fields = map.len(), "reusing existing node");
                let mut child = Node::from_map(std::mem::take(map));
                let out = f(&mut child);
                *map = child.data;
                out
            }
            other => Err(BundleBuilderError::TypeConflict {
                key: key.to_string(),
                expected: "object",
                found: value_kind(other),
            }),
        }
    }

    /// Open a new empty node list at `key`, replacing any previous value.
    ///
    /// The list is written into this node only if `f` succeeds.
    pub fn fresh_nodes<T, F>(&mut self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut NodeList) -> Result<T>,
    {
        let mut list = NodeList::new();
        let out = f(&mut list)?;
        self.data.insert(key.to_string(), Value::Array(list.items));
        Ok(out)
    }

    /// Open the node list at `key`, appending to it when it already exists.
    ///
    /// Existing elements keep their positions. Fails with
    /// [`BundleBuilderError::TypeConflict`] if `key` holds something other
    /// than a sequence.
    pub fn nodes<T, F>(&mut self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut NodeList) -> Result<T>,
    {
        let Some(existing) = self.data.get_mut(key) else {
            return self.fresh_nodes(key, f);
        };

        match existing {
            Value::Array(items) => {
                let mut list = NodeList::from_items(std::mem::take(items));
                let out = f(&mut list);
                trace!(key, len = list.len(), "appended to existing node list");
                *items = list.items;
                out
            }
            other => Err(BundleBuilderError::TypeConflict {
                key: key.to_string(),
                expected: "array",
                found: value_kind(other),
            }),
        }
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::Object(node.data)
    }
}

/// Appender for an ordered list of nodes under one key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeList {
    items: Vec<Value>,
}

impl NodeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<Value>) -> Self {
        Self { items }
    }

    /// Append a new node populated by `f`. Returns its 0-based index.
    ///
    /// Nothing is appended if `f` fails.
    pub fn node<F>(&mut self, f: F) -> Result<usize>
    where
        F: FnOnce(&mut Node) -> Result<()>,
    {
        let mut child = Node::new();
        f(&mut child)?;
        Ok(self.push(child))
    }

    /// Append a raw value. Returns its 0-based index.
    pub fn push(&mut self, value: impl Into<Value>) -> usize {
        self.items.push(value.into());
        self.items.len() - 1
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reopening_a_node_keeps_sibling_fields() {
        let mut root = Node::new();
        root.node("train", |n| {
            n.attribute("dataset", "a");
            Ok(())
        })
        .unwrap();
        root.node("train", |n| {
            n.attribute("dataloader", "b");
            Ok(())
        })
        .unwrap();

        assert_eq!(
            Value::from(root),
            json!({"train": {"dataset": "a", "dataloader": "b"}})
        );
    }

    #[test]
    fn fresh_node_replaces_previous_content() {
        let mut root = Node::new();
        root.fresh_node("loss", |n| {
            n.attribute("a", 1);
            Ok(())
        })
        .unwrap();
        root.fresh_node("loss", |n| {
            n.attribute("b", 2);
            Ok(())
        })
        .unwrap();

        assert_eq!(root.get("loss"), Some(&json!({"b": 2})));
    }

    #[test]
    fn reused_node_keeps_position() {
        let mut root = Node::new();
        root.node("first", |_| Ok(())).unwrap();
        root.attribute("second", 2);
        root.node("first", |n| {
            n.attribute("x", 1);
            Ok(())
        })
        .unwrap();

        let keys: Vec<&String> = root.as_map().keys().collect();
        assert_eq!(keys, ["first", "second"]);
    }

    #[test]
    fn failed_fresh_node_is_not_committed() {
        let mut root = Node::new();
        let result: Result<()> = root.node("broken", |n| {
            n.attribute("partial", true);
            Err(BundleBuilderError::validation("boom"))
        });
        assert!(result.is_err());
        assert!(!root.has_node("broken"));
    }

    #[test]
    fn failed_reopen_keeps_prior_content() {
        let mut root = Node::new();
        root.node("train", |n| {
            n.attribute("dataset", "a");
            Ok(())
        })
        .unwrap();
        let _ = root.node("train", |_| -> Result<()> {
            Err(BundleBuilderError::validation("boom"))
        });
        assert_eq!(root.get("train"), Some(&json!({"dataset": "a"})));
    }

    #[test]
    fn node_on_scalar_is_type_conflict() {
        let mut root = Node::new();
        root.attribute("epochs", 10);
        let err = root.node("epochs", |_| Ok(())).unwrap_err();
        assert!(matches!(
            err,
            BundleBuilderError::TypeConflict { expected: "object", found: "number", .. }
        ));
        assert_eq!(root.get("epochs"), Some(&json!(10)));
    }

    #[test]
    fn reopening_a_list_never_truncates() {
        let mut root = Node::new();
        root.nodes("handlers", |list| {
            list.node(|n| {
                n.attribute("name", "A");
                Ok(())
            })
        })
        .unwrap();
        let index = root
            .nodes("handlers", |list| {
                list.node(|n| {
                    n.attribute("name", "B");
                    Ok(())
                })
            })
            .unwrap();

        assert_eq!(index, 1);
        assert_eq!(
            root.get("handlers"),
            Some(&json!([{"name": "A"}, {"name": "B"}]))
        );
    }

    #[test]
    fn list_accepts_raw_values() {
        let mut root = Node::new();
        root.nodes("refs", |list| {
            assert_eq!(list.push("@train#x#0"), 0);
            assert_eq!(list.push("@train#x#1"), 1);
            Ok(())
        })
        .unwrap();
        assert_eq!(root.get("refs"), Some(&json!(["@train#x#0", "@train#x#1"])));
    }

    #[test]
    fn list_reuses_preexisting_attribute_array() {
        let mut root = Node::new();
        root.attribute("run", json!(["$@train#trainer.run()"]));
        root.nodes("run", |list| {
            list.push("$@validate#evaluator.run()");
            Ok(())
        })
        .unwrap();
        assert_eq!(root.get("run").unwrap().as_array().unwrap().len(), 2);
    }

    #[test]
    fn nodes_on_mapping_is_type_conflict() {
        let mut root = Node::new();
        root.node("key_metric", |_| Ok(())).unwrap();
        let err = root.nodes("key_metric", |_| Ok(())).unwrap_err();
        assert!(matches!(
            err,
            BundleBuilderError::TypeConflict { expected: "array", found: "object", .. }
        ));
    }

    #[test]
    fn failed_list_node_is_not_appended() {
        let mut list = NodeList::new();
        let result = list.node(|_| Err(BundleBuilderError::validation("boom")));
        assert!(result.is_err());
        assert!(list.is_empty());
    }

    #[test]
    fn attribute_if_absent_does_not_overwrite() {
        let mut node = Node::new();
        assert!(node.attribute_if_absent("random_transforms", json!([])));
        node.nodes("random_transforms", |l| {
            l.push(1);
            Ok(())
        })
        .unwrap();
        assert!(!node.attribute_if_absent("random_transforms", json!([])));
        assert_eq!(node.get("random_transforms"), Some(&json!([1])));
    }
}
