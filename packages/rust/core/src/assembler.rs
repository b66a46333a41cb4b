//! Bundle document assembler.
//!
//! Builds the `train.json` of a MONAI-style bundle: top-level variables and
//! components, plus the `train` and `validate` sections with their transform
//! lists, handlers, metrics and engines. [`BundleBuilder::build`] finalizes
//! both sections, checks that every required key is present and only then
//! writes the bundle files to disk.

use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use bundlebuilder_shared::{
    BuildOptions, BundleBuilderError, Item, MetricSlot, Phase, Result, TransformPhases,
};
use bundlebuilder_tree::{KeyFormat, Node, TreeBuilder};

use crate::templates::LOGGING_CONF;

pub const DETERMINISTIC_TRANSFORMS: &str = "deterministic_transforms";
pub const RANDOM_TRANSFORMS: &str = "random_transforms";
pub const POSTPROCESSING_TRANSFORMS: &str = "postprocessing_transforms";
pub const PREPROCESSING: &str = "preprocessing";
pub const POSTPROCESSING: &str = "postprocessing";
pub const HANDLERS: &str = "handlers";
pub const ADDITIONAL_METRICS: &str = "additional_metrics";

/// Keys that must be present in `train` once it is finalized.
pub const REQUIRED_TRAIN_KEYS: [&str; 8] = [
    "preprocessing",
    "dataset",
    "dataloader",
    "postprocessing",
    "handlers",
    "key_metric",
    "trainer",
    "inferer",
];

/// Keys that must be present in `validate` once it is finalized.
pub const REQUIRED_VALIDATE_KEYS: [&str; 8] = [
    "preprocessing",
    "postprocessing",
    "dataset",
    "dataloader",
    "handlers",
    "key_metric",
    "evaluator",
    "inferer",
];

/// Indent width of the written `train.json`.
const JSON_INDENT: usize = 4;

/// Output from a successful bundle build.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Path of the written `configs/train.json`.
    pub config_path: PathBuf,
    /// Path of the written `configs/logging.conf`.
    pub logging_path: PathBuf,
    /// The rendered document, as written.
    pub document: String,
}

/// Assembles a bundle configuration document rooted at a bundle directory.
#[derive(Debug, Clone)]
pub struct BundleBuilder {
    bundle_root: PathBuf,
    configs_path: PathBuf,
    docs_path: PathBuf,
    scripts_path: PathBuf,
    options: BuildOptions,
    builder: TreeBuilder,
}

/// Positional cross-reference to element `index` of `phase.key`.
pub fn cross_reference(phase: Phase, key: &str, index: usize) -> String {
    format!("@{phase}#{key}#{index}")
}

impl BundleBuilder {
    /// Create an empty document for the bundle at `bundle_root`.
    pub fn new(bundle_root: impl Into<PathBuf>) -> Self {
        Self::with_options(bundle_root, BuildOptions::default())
    }

    pub fn with_options(bundle_root: impl Into<PathBuf>, options: BuildOptions) -> Self {
        let bundle_root = bundle_root.into();
        Self {
            configs_path: bundle_root.join("configs"),
            docs_path: bundle_root.join("docs"),
            scripts_path: bundle_root.join("scripts"),
            bundle_root,
            options,
            builder: TreeBuilder::new(),
        }
    }

    pub fn bundle_root(&self) -> &Path {
        &self.bundle_root
    }

    pub fn configs_path(&self) -> &Path {
        &self.configs_path
    }

    pub fn docs_path(&self) -> &Path {
        &self.docs_path
    }

    pub fn scripts_path(&self) -> &Path {
        &self.scripts_path
    }

    /// The document under construction.
    pub fn document(&self) -> &TreeBuilder {
        &self.builder
    }

    // -----------------------------------------------------------------------
    // Top-level content
    // -----------------------------------------------------------------------

    /// Set a top-level variable (paths, hyperparameters, `$` expressions...).
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.builder.attribute(name, value);
    }

    /// Alias of [`set_variable`](Self::set_variable).
    pub fn attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.set_variable(name, value);
    }

    /// Write a top-level component such as `network_def`, `loss` or `optimizer`.
    ///
    /// Replaces any previous content of `section`.
    pub fn add_item(&mut self, section: &str, name: &str, kwargs: Value) -> Result<()> {
        let item = Item::from_kwargs(name, kwargs)?;
        self.builder.attribute(section, item);
        Ok(())
    }

    /// Write `_target_` and the kwargs into an already opened node.
    pub fn add_item_to(node: &mut Node, name: &str, kwargs: Value) -> Result<()> {
        write_item(node, Item::from_kwargs(name, kwargs)?);
        Ok(())
    }

    /// Scoped access to a top-level section for hand-built content.
    ///
    /// The section is reused if it already exists.
    pub fn section<T, F>(&mut self, name: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Node) -> Result<T>,
    {
        self.builder.node(name, f)
    }

    // -----------------------------------------------------------------------
    // Phase content
    // -----------------------------------------------------------------------

    /// Write an item at `phase.section`, keeping everything else in `phase`.
    pub fn add_pipeline_item(
        &mut self,
        phase: Phase,
        section: &str,
        name: &str,
        kwargs: Value,
    ) -> Result<()> {
        let item = Item::from_kwargs(name, kwargs)?;
        self.builder.node(phase.as_str(), |phase_node| {
            phase_node.node(section, |node| {
                write_item(node, item);
                Ok(())
            })
        })
    }

    pub fn add_train_item(&mut self, section: &str, name: &str, kwargs: Value) -> Result<()> {
        self.add_pipeline_item(Phase::Train, section, name, kwargs)
    }

    pub fn add_validate_item(&mut self, section: &str, name: &str, kwargs: Value) -> Result<()> {
        self.add_pipeline_item(Phase::Validate, section, name, kwargs)
    }

    /// Add a deterministic (non-random) preprocessing transform.
    ///
    /// With [`TransformPhases::Shared`] the item goes into `train` and
    /// `validate` gets a reference to it by position, so validation runs the
    /// exact transform used in training.
    pub fn add_deterministic_transform(
        &mut self,
        name: &str,
        kwargs: Value,
        phases: TransformPhases,
    ) -> Result<()> {
        self.add_phased_transform(DETERMINISTIC_TRANSFORMS, name, kwargs, phases)
    }

    /// Add a random augmentation transform. These only ever run in training.
    pub fn add_random_transform(&mut self, name: &str, kwargs: Value) -> Result<()> {
        let item = Item::from_kwargs(name, kwargs)?;
        self.append_item(Phase::Train, RANDOM_TRANSFORMS, item)?;
        Ok(())
    }

    /// Add a postprocessing transform, shared between phases like
    /// [`add_deterministic_transform`](Self::add_deterministic_transform).
    pub fn add_postprocessing_transform(
        &mut self,
        name: &str,
        kwargs: Value,
        phases: TransformPhases,
    ) -> Result<()> {
        self.add_phased_transform(POSTPROCESSING_TRANSFORMS, name, kwargs, phases)
    }

    /// Append a handler to `section.handlers`.
    pub fn add_section_handler(&mut self, section: &str, name: &str, kwargs: Value) -> Result<()> {
        let item = Item::from_kwargs(name, kwargs)?;
        self.builder.node(section, |section_node| {
            section_node.nodes(HANDLERS, |handlers| {
                handlers.node(|node| {
                    write_item(node, item);
                    Ok(())
                })
            })
        })?;
        Ok(())
    }

    /// Write a metric item at `phase.<slot>.<metric_name>`.
    pub fn add_metric(
        &mut self,
        phase: Phase,
        slot: MetricSlot,
        metric_name: &str,
        name: &str,
        kwargs: Value,
    ) -> Result<()> {
        let item = Item::from_kwargs(name, kwargs)?;
        self.builder.node(phase.as_str(), |phase_node| {
            phase_node.node(slot.as_str(), |slot_node| {
                slot_node.node(metric_name, |node| {
                    write_item(node, item);
                    Ok(())
                })
            })
        })
    }

    fn add_phased_transform(
        &mut self,
        list_key: &str,
        name: &str,
        kwargs: Value,
        phases: TransformPhases,
    ) -> Result<()> {
        let item = Item::from_kwargs(name, kwargs)?;
        match phases {
            TransformPhases::TrainOnly => {
                self.append_item(Phase::Train, list_key, item)?;
            }
            TransformPhases::ValidateOnly => {
                self.append_item(Phase::Validate, list_key, item)?;
            }
            TransformPhases::Shared => {
                // Open the validate list first so a conflict there leaves train untouched.
                self.builder.node(Phase::Validate.as_str(), |validate| {
                    validate.nodes(list_key, |_| Ok(()))
                })?;
                let index = self.append_item(Phase::Train, list_key, item)?;
                let reference = cross_reference(Phase::Train, list_key, index);
                self.builder.node(Phase::Validate.as_str(), |validate| {
                    validate.nodes(list_key, |list| Ok(list.push(reference)))
                })?;
            }
        }
        Ok(())
    }

    /// Append `item` to `phase.list_key`, returning its index in that list.
    fn append_item(&mut self, phase: Phase, list_key: &str, item: Item) -> Result<usize> {
        let index = self.builder.node(phase.as_str(), |phase_node| {
            phase_node.nodes(list_key, |list| {
                list.node(|node| {
                    write_item(node, item);
                    Ok(())
                })
            })
        })?;
        debug!(%phase, list = list_key, index, "appended item");
        Ok(index)
    }

    // -----------------------------------------------------------------------
    // Finalization
    // -----------------------------------------------------------------------

    /// Compose `train.preprocessing` and `train.postprocessing` and check that
    /// every key in [`REQUIRED_TRAIN_KEYS`] is present.
    pub fn finalize_train(&mut self) -> Result<()> {
        let phase = Phase::Train;
        self.builder.node(phase.as_str(), |train| {
            train.attribute_if_absent(DETERMINISTIC_TRANSFORMS, json!([]));
            train.attribute_if_absent(RANDOM_TRANSFORMS, json!([]));
            train.attribute_if_absent(POSTPROCESSING_TRANSFORMS, json!([]));
            train.attribute(
                PREPROCESSING,
                compose(format!(
                    "$@{phase}#{DETERMINISTIC_TRANSFORMS} + @{phase}#{RANDOM_TRANSFORMS}"
                )),
            );
            train.attribute(
                POSTPROCESSING,
                compose(format!("$@{phase}#{POSTPROCESSING_TRANSFORMS}")),
            );
            train.attribute_if_absent(ADDITIONAL_METRICS, json!({}));
            check_required(phase, train, &REQUIRED_TRAIN_KEYS)
        })
    }

    /// Compose `validate.preprocessing` and `validate.postprocessing` and check
    /// that every key in [`REQUIRED_VALIDATE_KEYS`] is present.
    pub fn finalize_validate(&mut self) -> Result<()> {
        let phase = Phase::Validate;
        self.builder.node(phase.as_str(), |validate| {
            validate.attribute_if_absent(DETERMINISTIC_TRANSFORMS, json!([]));
            validate.attribute_if_absent(POSTPROCESSING_TRANSFORMS, json!([]));
            validate.attribute(
                PREPROCESSING,
                compose(format!("$@{phase}#{DETERMINISTIC_TRANSFORMS}")),
            );
            validate.attribute(
                POSTPROCESSING,
                compose(format!("$@{phase}#{POSTPROCESSING_TRANSFORMS}")),
            );
            validate.attribute_if_absent(ADDITIONAL_METRICS, json!({}));
            check_required(phase, validate, &REQUIRED_VALIDATE_KEYS)
        })
    }

    /// Finalize both phases and render the document without touching disk.
    #[instrument(skip_all, fields(root = %self.bundle_root.display()))]
    pub fn render(&mut self) -> Result<String> {
        self.finalize_train()?;
        self.finalize_validate()?;
        self.builder.key_format(KeyFormat::underscore());
        self.builder.to_json(JSON_INDENT)
    }

    /// Finalize, render and write the bundle files.
    ///
    /// Creates the following layout:
    /// ```text
    /// <bundle_root>/
    /// ├── configs/
    /// │   ├── logging.conf
    /// │   └── train.json
    /// ├── docs/
    /// └── scripts/
    /// ```
    /// Nothing is written if either phase is incomplete.
    #[instrument(skip_all, fields(root = %self.bundle_root.display()))]
    pub fn build(&mut self) -> Result<BuildOutput> {
        let document = self.render()?;

        create_dirs(&[
            self.configs_path.as_path(),
            self.docs_path.as_path(),
            self.scripts_path.as_path(),
        ])?;

        let logging_path = self.configs_path.join("logging.conf");
        write_atomic(&logging_path, LOGGING_CONF)?;

        let config_path = self.configs_path.join("train.json");
        write_atomic(&config_path, &document)?;

        if self.options.log_document {
            info!(%document, "rendered bundle config");
        }
        info!(path = %config_path.display(), bytes = document.len(), "bundle build complete");

        Ok(BuildOutput {
            config_path,
            logging_path,
            document,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_item(node: &mut Node, item: Item) {
    for (key, value) in item.into_map() {
        node.attribute(key, value);
    }
}

fn compose(transforms: String) -> Item {
    Item::new("Compose").arg("transforms", transforms)
}

/// Fail with every key of `required` that `node` lacks.
fn check_required(phase: Phase, node: &Node, required: &[&str]) -> Result<()> {
    let missing: Vec<String> = required
        .iter()
        .filter(|key| !node.has_node(key))
        .map(|key| (*key).to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(BundleBuilderError::MissingRequiredSection { phase, missing })
    }
}

fn create_dirs(dirs: &[&Path]) -> Result<()> {
    for dir in dirs {
        std::fs::create_dir_all(dir).map_err(|e| BundleBuilderError::io(*dir, e))?;
    }
    debug!(count = dirs.len(), "bundle directories created");
    Ok(())
}

/// Write to a temp file next to `path`, then rename over it.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| BundleBuilderError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| BundleBuilderError::io(path, e))?;

    debug!(path = %path.display(), size = content.len(), "wrote file");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
