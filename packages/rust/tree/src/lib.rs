//! Nested-mapping tree builder.
//!
//! [`TreeBuilder`] owns a JSON document and hands out scoped [`Node`] and
//! [`NodeList`] handles. Reopening a key reuses what is already there instead
//! of replacing it, so a document can be assembled from many independent calls.

pub mod builder;
pub mod key_format;
pub mod node;

pub use builder::TreeBuilder;
pub use key_format::{KeyFormat, to_underscore_case};
pub use node::{Node, NodeList};
