//! Bundle assembly for bundlebuilder.
//!
//! [`assembler::BundleBuilder`] composes tree-builder calls into the fixed
//! train/validate shape of a bundle's `train.json`, and [`recipe`] replays
//! operations stored in a TOML or JSON file through it.

pub mod assembler;
pub mod recipe;
pub mod templates;

pub use assembler::{BuildOutput, BundleBuilder, cross_reference};
pub use recipe::{PhaseSelection, Recipe, Step};
