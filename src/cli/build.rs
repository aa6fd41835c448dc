//! Build, watch and lint command bodies.
//!
//! Each command follows the same shape: load the project into a fresh
//! [`BuildContext`], run the requested pipeline against the bridge services,
//! then flush generated artifacts from the store to the build directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context as _, Result};

use crate::cli::BuildArgs;
use crate::config::AnvilConfig;
use crate::core::BuildContext;
use crate::lint::run_lint;
use crate::log;
use crate::services::bridge::Bridge;
use crate::transpile::worker::WorkerManager;
use crate::transpile::{TranspileOptions, TranspileSession};
use crate::watch;

/// One-shot production build: compile, lint, write outputs.
pub fn build_once(config: &AnvilConfig, args: &BuildArgs) -> Result<()> {
    let started = Instant::now();
    let (ctx, mut session) = prepare(config)?;
    let opts = apply_args(TranspileOptions::from_config(config), args);

    session.transpile(&ctx, config, &opts)?;

    let files = project_sources(&ctx);
    run_lint(
        &ctx,
        config,
        session.compiler(),
        session.program(),
        session.compiler(),
        &files,
    )?;

    let written = write_outputs(&ctx, config)?;
    log!(
        "build";
        "wrote {written} files to {} in {} ms",
        config.build_dir().display(),
        started.elapsed().as_millis()
    );
    Ok(())
}

/// Full build, then rebuild incrementally until interrupted.
pub fn watch_project(config: &AnvilConfig, args: &BuildArgs, type_check: bool) -> Result<()> {
    let (ctx, mut session) = prepare(config)?;
    let opts = apply_args(TranspileOptions::from_config(config), args);

    if let Err(e) = session.transpile(&ctx, config, &opts) {
        // Watch survives a broken initial build; the first good edit fixes it.
        log!("error"; "initial build failed: {e}");
    } else {
        write_outputs(&ctx, config)?;
        log!("build"; "initial build done");
    }

    let worker = if type_check {
        Some(Arc::new(WorkerManager::for_current_exe()?))
    } else {
        None
    };

    watch::watch(config, &mut session, &ctx, worker)
}

/// Standalone lint run. With `lint.type_check` set this compiles first so a
/// retained program exists to check against.
pub fn lint_project(config: &AnvilConfig, paths: &[PathBuf], bail: bool) -> Result<()> {
    let (ctx, mut session) = prepare(config)?;

    if config.lint.type_check {
        let opts = TranspileOptions::from_config(config);
        session.transpile(&ctx, config, &opts)?;
    }

    let files = if paths.is_empty() {
        project_sources(&ctx)
    } else {
        paths.iter().map(|p| config.root.join(p)).collect()
    };

    let mut config = config.clone();
    config.lint.bail_on_error |= bail;

    run_lint(
        &ctx,
        &config,
        session.compiler(),
        session.program(),
        session.compiler(),
        &files,
    )?;
    log!("lint"; "checked {} files", files.len());
    Ok(())
}

fn prepare(config: &AnvilConfig) -> Result<(BuildContext, TranspileSession<Bridge>)> {
    let ctx = BuildContext::new(&config.root, config.build_dir());
    let seeded = ctx.seed_from_disk(&config.src_dir())?;
    crate::debug!("build"; "seeded {seeded} files from {}", config.src_dir().display());

    let bridge = Bridge::new(config.compiler.bridge.clone(), &config.root);
    Ok((ctx, TranspileSession::new(bridge)))
}

fn apply_args(mut opts: TranspileOptions, args: &BuildArgs) -> TranspileOptions {
    if let Some(source_maps) = args.source_maps {
        opts.source_maps = source_maps;
    }
    if let Some(inline_templates) = args.inline_templates {
        opts.inline_templates = inline_templates;
    }
    if let Some(deep_links) = args.deep_links {
        opts.use_transforms = deep_links;
    }
    opts
}

/// Every tracked script in the store (lint input).
fn project_sources(ctx: &BuildContext) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = ctx
        .store
        .paths()
        .into_iter()
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("ts"))
        .collect();
    files.sort();
    files
}

/// Flush generated `.js` / `.js.map` entries to the build directory,
/// mirroring their layout under the source directory.
pub fn write_outputs(ctx: &BuildContext, config: &AnvilConfig) -> Result<usize> {
    let src_dir = config.src_dir();
    let build_dir = config.build_dir();
    let mut written = 0;

    for entry in ctx.store.all() {
        let name = entry.path.to_string_lossy();
        if !name.ends_with(".js") && !name.ends_with(".js.map") {
            continue;
        }
        let out_path = match entry.path.strip_prefix(&src_dir) {
            Ok(rel) => build_dir.join(rel),
            Err(_) => continue,
        };
        write_artifact(&out_path, &entry.content)?;
        written += 1;
    }
    Ok(written)
}

fn write_artifact(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create `{}`", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("failed to write `{}`", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Entry;

    #[test]
    fn outputs_mirror_source_layout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("anvil.toml"), "").unwrap();
        let config = AnvilConfig::load(&dir.path().join("anvil.toml")).unwrap();
        let ctx = BuildContext::new(dir.path(), config.build_dir());

        let js = config.src_dir().join("pages/home.js");
        let map = config.src_dir().join("pages/home.js.map");
        let ts = config.src_dir().join("pages/home.ts");
        ctx.store.set(&js, Entry::new(&js, "var a = 1;"));
        ctx.store.set(&map, Entry::new(&map, "{}"));
        ctx.store.set(&ts, Entry::new(&ts, "const a = 1;"));

        let written = write_outputs(&ctx, &config).unwrap();
        assert_eq!(written, 2);
        assert!(config.build_dir().join("pages/home.js").is_file());
        assert!(config.build_dir().join("pages/home.js.map").is_file());
        // sources never leave the store
        assert!(!config.build_dir().join("pages/home.ts").exists());
    }

    #[test]
    fn args_override_config_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("anvil.toml"), "").unwrap();
        let config = AnvilConfig::load(&dir.path().join("anvil.toml")).unwrap();

        let args = BuildArgs {
            source_maps: Some(false),
            inline_templates: None,
            deep_links: Some(false),
        };
        let opts = apply_args(TranspileOptions::from_config(&config), &args);
        assert!(!opts.source_maps);
        assert!(opts.inline_templates);
        assert!(!opts.use_transforms);
    }
}
