//! Application configuration for bundlebuilder.
//!
//! User config lives at `~/.bundlebuilder/bundlebuilder.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BundleBuilderError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "bundlebuilder.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".bundlebuilder";

// ---------------------------------------------------------------------------
// Config structs (matching bundlebuilder.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Bundle root used when `--root` is not given.
    #[serde(default = "default_bundle_root")]
    pub bundle_root: String,

    /// Log the rendered document at info level after a build.
    #[serde(default)]
    pub log_document: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            bundle_root: default_bundle_root(),
            log_document: false,
        }
    }
}

fn default_bundle_root() -> String {
    ".".into()
}

// ---------------------------------------------------------------------------
// Build options (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime build options, merged from config file + CLI flags.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Emit the rendered document as a tracing event after writing it.
    pub log_document: bool,
}

impl From<&AppConfig> for BuildOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            log_document: config.defaults.log_document,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.bundlebuilder/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BundleBuilderError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.bundlebuilder/bundlebuilder.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BundleBuilderError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        BundleBuilderError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BundleBuilderError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config)
        .map_err(|e| BundleBuilderError::Serialization(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BundleBuilderError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
