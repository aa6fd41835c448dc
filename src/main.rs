//! Anvil - an incremental TypeScript build orchestrator.

#![allow(dead_code)]

mod cli;
mod config;
mod core;
mod diagnostics;
mod errors;
mod lint;
mod logger;
mod services;
mod store;
mod transform;
mod transpile;
mod watch;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::AnvilConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    // Worker mode dispatches before anything can write to stdout: in that
    // mode stdout is the reply channel, not a log stream.
    if matches!(cli.command, Commands::Worker) {
        return transpile::worker::run_worker_loop();
    }

    let config = AnvilConfig::load(&cli.config)?;

    match &cli.command {
        Commands::Build { build_args } => cli::build::build_once(&config, build_args),
        Commands::Watch {
            build_args,
            type_check,
        } => cli::build::watch_project(&config, build_args, type_check.unwrap_or(true)),
        Commands::Lint { paths, bail } => cli::build::lint_project(&config, paths, *bail),
        Commands::Worker => unreachable!("handled above"),
    }
}
