//! Recipe files: assembler operations stored as TOML or JSON.
//!
//! ```toml
//! [[steps]]
//! op = "variable"
//! name = "epochs"
//! value = 5000
//!
//! [[steps]]
//! op = "deterministic_transform"
//! target = "LoadImaged"
//! kwargs = { keys = ["image", "label"] }
//! ```

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use bundlebuilder_shared::{BundleBuilderError, MetricSlot, Phase, Result, TransformPhases};

use crate::assembler::BundleBuilder;

/// An ordered list of assembler operations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Recipe {
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One assembler operation. `kwargs` defaults to no arguments.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// [`BundleBuilder::set_variable`]
    Variable { name: String, value: Value },
    /// [`BundleBuilder::add_item`]
    Item {
        section: String,
        target: String,
        #[serde(default)]
        kwargs: Value,
    },
    /// [`BundleBuilder::add_pipeline_item`]
    PipelineItem {
        phase: Phase,
        section: String,
        target: String,
        #[serde(default)]
        kwargs: Value,
    },
    /// [`BundleBuilder::add_deterministic_transform`]
    DeterministicTransform {
        target: String,
        #[serde(default)]
        kwargs: Value,
        #[serde(flatten)]
        phases: PhaseSelection,
    },
    /// [`BundleBuilder::add_random_transform`]
    RandomTransform {
        target: String,
        #[serde(default)]
        kwargs: Value,
    },
    /// [`BundleBuilder::add_postprocessing_transform`]
    PostprocessingTransform {
        target: String,
        #[serde(default)]
        kwargs: Value,
        #[serde(flatten)]
        phases: PhaseSelection,
    },
    /// [`BundleBuilder::add_section_handler`]
    Handler {
        section: String,
        target: String,
        #[serde(default)]
        kwargs: Value,
    },
    /// [`BundleBuilder::add_metric`]
    Metric {
        phase: Phase,
        #[serde(default = "default_metric_slot")]
        slot: MetricSlot,
        name: String,
        target: String,
        #[serde(default)]
        kwargs: Value,
    },
}

fn default_metric_slot() -> MetricSlot {
    MetricSlot::Key
}

/// Phase selection of a transform step: either `phases` or the
/// `is_train` / `is_validate` pair, both defaulting to shared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PhaseSelection {
    #[serde(default)]
    pub phases: Option<TransformPhases>,
    #[serde(default)]
    pub is_train: Option<bool>,
    #[serde(default)]
    pub is_validate: Option<bool>,
}

impl PhaseSelection {
    pub fn resolve(&self) -> Result<TransformPhases> {
        let flags_given = self.is_train.is_some() || self.is_validate.is_some();
        match (self.phases, flags_given) {
            (Some(_), true) => Err(BundleBuilderError::validation(
                "give either phases or is_train/is_validate, not both",
            )),
            (Some(phases), false) => Ok(phases),
            (None, _) => TransformPhases::from_flags(
                self.is_train.unwrap_or(true),
                self.is_validate.unwrap_or(true),
            )
            .ok_or_else(|| {
                BundleBuilderError::validation("is_train and is_validate cannot both be false")
            }),
        }
    }
}

impl Step {
    /// The `op` tag of this step.
    pub fn op(&self) -> &'static str {
        match self {
            Self::Variable { .. } => "variable",
            Self::Item { .. } => "item",
            Self::PipelineItem { .. } => "pipeline_item",
            Self::DeterministicTransform { .. } => "deterministic_transform",
            Self::RandomTransform { .. } => "random_transform",
            Self::PostprocessingTransform { .. } => "postprocessing_transform",
            Self::Handler { .. } => "handler",
            Self::Metric { .. } => "metric",
        }
    }

    /// Run this step against `builder`.
    pub fn apply(&self, builder: &mut BundleBuilder) -> Result<()> {
        match self {
            Self::Variable { name, value } => {
                builder.set_variable(name.as_str(), value.clone());
                Ok(())
            }
            Self::Item {
                section,
                target,
                kwargs,
            } => builder.add_item(section, target, kwargs.clone()),
            Self::PipelineItem {
                phase,
                section,
                target,
                kwargs,
            } => builder.add_pipeline_item(*phase, section, target, kwargs.clone()),
            Self::DeterministicTransform {
                target,
                kwargs,
                phases,
            } => builder.add_deterministic_transform(target, kwargs.clone(), phases.resolve()?),
            Self::RandomTransform { target, kwargs } => {
                builder.add_random_transform(target, kwargs.clone())
            }
            Self::PostprocessingTransform {
                target,
                kwargs,
                phases,
            } => builder.add_postprocessing_transform(target, kwargs.clone(), phases.resolve()?),
            Self::Handler {
                section,
                target,
                kwargs,
            } => builder.add_section_handler(section, target, kwargs.clone()),
            Self::Metric {
                phase,
                slot,
                name,
                target,
                kwargs,
            } => builder.add_metric(*phase, *slot, name, target, kwargs.clone()),
        }
    }
}

impl Recipe {
    /// Load a recipe, picking the format from the file extension
    /// (`.toml` or `.json`).
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| BundleBuilderError::io(path, e))?;

        let parsed: std::result::Result<Self, String> =
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content).map_err(|e| e.to_string()),
                Some("json") => serde_json::from_str(&content).map_err(|e| e.to_string()),
                _ => {
                    return Err(BundleBuilderError::config(format!(
                        "unsupported recipe format: {} (expected .toml or .json)",
                        path.display()
                    )));
                }
            };

        parsed.map_err(|e| {
            BundleBuilderError::config(format!("failed to parse {}: {e}", path.display()))
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| BundleBuilderError::config(e.to_string()))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| BundleBuilderError::config(e.to_string()))
    }

    /// Apply every step in order, stopping at the first failure.
    #[instrument(skip_all, fields(steps = self.steps.len()))]
    pub fn apply(&self, builder: &mut BundleBuilder) -> Result<()> {
        for (index, step) in self.steps.iter().enumerate() {
            debug!(index, op = step.op(), "applying recipe step");
            step.apply(builder).map_err(|e| {
                error!(index, op = step.op(), error = %e, "recipe step failed");
                BundleBuilderError::RecipeStep {
                    index,
                    op: step.op(),
                    source: Box::new(e),
                }
            })?;
        }
        info!(steps = self.steps.len(), "recipe applied");
        Ok(())
    }
}
