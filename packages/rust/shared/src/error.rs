//! Error types for bundlebuilder.
//!
//! Library crates use [`BundleBuilderError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::Phase;

/// Top-level error type for all bundlebuilder operations.
#[derive(Debug, thiserror::Error)]
pub enum BundleBuilderError {
    /// A phase section is missing keys required by the downstream consumer.
    #[error("{phase} section is missing required keys: {}", missing.join(", "))]
    MissingRequiredSection { phase: Phase, missing: Vec<String> },

    /// A node or node-list was opened on a key holding a value of another kind.
    #[error("type conflict at '{key}': expected {expected}, found {found}")]
    TypeConflict {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON or TOML encoding error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration or recipe loading error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Malformed input (e.g. kwargs that are not a mapping).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A recipe step failed.
    #[error("step {index} ({op}): {source}")]
    RecipeStep {
        index: usize,
        op: &'static str,
        source: Box<BundleBuilderError>,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BundleBuilderError>;

impl BundleBuilderError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The error behind any [`BundleBuilderError::RecipeStep`] wrapping.
    pub fn root_cause(&self) -> &BundleBuilderError {
        match self {
            Self::RecipeStep { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Keys reported missing, if this is a [`BundleBuilderError::MissingRequiredSection`].
    pub fn missing_keys(&self) -> Option<&[String]> {
        match self {
            Self::MissingRequiredSection { missing, .. } => Some(missing),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = BundleBuilderError::config("bad recipe");
        assert_eq!(err.to_string(), "config error: bad recipe");

        let err = BundleBuilderError::MissingRequiredSection {
            phase: Phase::Train,
            missing: vec!["trainer".into(), "key_metric".into()],
        };
        assert_eq!(
            err.to_string(),
            "train section is missing required keys: trainer, key_metric"
        );
    }

    #[test]
    fn type_conflict_names_both_kinds() {
        let err = BundleBuilderError::TypeConflict {
            key: "handlers".into(),
            expected: "array",
            found: "string",
        };
        let msg = err.to_string();
        assert!(msg.contains("'handlers'"));
        assert!(msg.contains("expected array, found string"));
    }

    #[test]
    fn missing_keys_accessor() {
        let err = BundleBuilderError::MissingRequiredSection {
            phase: Phase::Validate,
            missing: vec!["evaluator".into()],
        };
        assert_eq!(err.missing_keys(), Some(&["evaluator".to_string()][..]));
        assert!(BundleBuilderError::validation("x").missing_keys().is_none());
    }

    #[test]
    fn recipe_step_wraps_any_kind() {
        let err = BundleBuilderError::RecipeStep {
            index: 3,
            op: "handler",
            source: Box::new(BundleBuilderError::TypeConflict {
                key: "handlers".into(),
                expected: "array",
                found: "string",
            }),
        };
        assert_eq!(
            err.to_string(),
            "step 3 (handler): type conflict at 'handlers': expected array, found string"
        );
        assert!(matches!(err.root_cause(), BundleBuilderError::TypeConflict { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }
}
