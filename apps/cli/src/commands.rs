//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use bundlebuilder_core::{BundleBuilder, Recipe};
use bundlebuilder_shared::{AppConfig, BuildOptions, init_config, load_config};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// bundlebuilder: assemble train/validate bundle configs from recipes.
#[derive(Parser)]
#[command(
    name = "bundlebuilder",
    version,
    about = "Assemble train/validate bundle configs from recipe files.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Apply a recipe and write the bundle's configs/ files.
    Build {
        /// Recipe file (.toml or .json).
        #[arg(long)]
        recipe: PathBuf,

        /// Bundle root directory (defaults to the configured bundle_root).
        #[arg(long)]
        root: Option<PathBuf>,

        /// Log the rendered document after writing it.
        #[arg(long)]
        log_document: bool,
    },

    /// Apply a recipe and print the rendered document without writing files.
    Check {
        /// Recipe file (.toml or .json).
        #[arg(long)]
        recipe: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "bundlebuilder=info",
        1 => "bundlebuilder=debug",
        _ => "bundlebuilder=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Build {
            recipe,
            root,
            log_document,
        } => cmd_build(&recipe, root, log_document),
        Command::Check { recipe } => cmd_check(&recipe),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

fn cmd_build(recipe_path: &Path, root: Option<PathBuf>, log_document: bool) -> Result<()> {
    let config = load_config()?;

    let root = root.unwrap_or_else(|| PathBuf::from(&config.defaults.bundle_root));
    let mut options = BuildOptions::from(&config);
    options.log_document |= log_document;

    info!(recipe = %recipe_path.display(), root = %root.display(), "building bundle");

    let recipe = Recipe::load(recipe_path)?;
    let mut builder = BundleBuilder::with_options(&root, options);
    recipe.apply(&mut builder)?;

    let output = builder
        .build()
        .wrap_err_with(|| format!("bundle at '{}' is incomplete", root.display()))?;

    println!();
    println!("  Bundle config written!");
    println!("  Config:  {}", output.config_path.display());
    println!("  Logging: {}", output.logging_path.display());
    println!("  Steps:   {}", recipe.steps.len());
    println!("  Size:    {} bytes", output.document.len());
    println!();

    Ok(())
}

fn cmd_check(recipe_path: &Path) -> Result<()> {
    let recipe = Recipe::load(recipe_path)?;
    let mut builder = BundleBuilder::new(".");
    recipe.apply(&mut builder)?;

    let document = builder.render()?;
    println!("{document}");
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_build_arguments() {
        let cli = Cli::parse_from([
            "bundlebuilder",
            "-v",
            "build",
            "--recipe",
            "colon.toml",
            "--root",
            "colon_bundle",
        ]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Build {
                recipe,
                root,
                log_document,
            } => {
                assert_eq!(recipe, PathBuf::from("colon.toml"));
                assert_eq!(root, Some(PathBuf::from("colon_bundle")));
                assert!(!log_document);
            }
            _ => panic!("expected build command"),
        }
    }
}
