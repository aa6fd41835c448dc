//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Anvil incremental TypeScript build orchestrator CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (default: anvil.toml)
    #[arg(short = 'C', long, default_value = "anvil.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Compile the project once and write outputs
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        build_args: BuildArgs,
    },

    /// Rebuild incrementally on file changes
    #[command(visible_alias = "w")]
    Watch {
        #[command(flatten)]
        build_args: BuildArgs,

        /// Run the whole-program type check in a background worker
        #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        type_check: Option<bool>,
    },

    /// Lint project sources
    #[command(visible_alias = "l")]
    Lint {
        /// Files to lint. If omitted, lints every project source file.
        #[arg(value_name = "PATH")]
        paths: Vec<PathBuf>,

        /// Fail on lint errors regardless of the config setting
        #[arg(long)]
        bail: bool,
    },

    /// Serve type-check requests over stdio (spawned internally by watch)
    #[command(hide = true)]
    Worker,
}

/// Shared build arguments for Build and Watch commands
#[derive(clap::Args, Debug, Clone)]
pub struct BuildArgs {
    /// Emit source maps alongside generated script
    #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub source_maps: Option<bool>,

    /// Inline component templates into emitted script
    #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub inline_templates: Option<bool>,

    /// Rewrite deep-link declarations before compiling
    #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub deep_links: Option<bool>,
}
