//! Shared types, error model, and configuration for bundlebuilder.
//!
//! This crate is the foundation depended on by all other bundlebuilder crates.
//! It provides:
//! - [`BundleBuilderError`]: the unified error type
//! - Domain types ([`Item`], [`Phase`], [`TransformPhases`], [`MetricSlot`])
//! - Configuration ([`AppConfig`], [`BuildOptions`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BuildOptions, DefaultsConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{BundleBuilderError, Result};
pub use types::{Item, MetricSlot, Phase, TARGET_KEY, TransformPhases, value_kind};
