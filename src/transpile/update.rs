//! Incremental update engine: the fast path for one changed file.
//!
//! Attempted only for a content change to a path the store already tracks;
//! anything else is the caller's cue to run the full compile instead. A
//! batch of eligible files compiles in parallel - each update touches only
//! its own store keys and keeps its diagnostics private, so there is no
//! cross-file ordering to preserve.
//!
//! Failures here are recoverable by design: the typed error carries the
//! offending path and the watch loop decides whether to fall back to a full
//! build.

use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;

use crate::config::AnvilConfig;
use crate::config::project::ParsedConfig;
use crate::core::{BuildContext, BuildState, ChangeEvent, ChangedFile};
use crate::diagnostics::print::print_diagnostics;
use crate::diagnostics::{Diagnostic, normalize_compiler};
use crate::errors::{BuildError, CompileError, TransformError};
use crate::services::Compiler;
use crate::store::{Entry, FileStore};
use crate::transform;
use crate::transform::template::inline_template;

use super::{TranspileOptions, TranspileSession, resolve_emit_flags};

/// Eligibility gate: only a modification of an already-tracked file can take
/// the fast path.
pub fn can_run_update(event: ChangeEvent, path: &Path, store: &FileStore) -> bool {
    event == ChangeEvent::Change && store.has(path)
}

/// Compile each changed `.ts` file individually against the cached config.
///
/// Returns the first failure; successfully updated files keep their new
/// store entries either way.
pub fn transpile_update<C: Compiler>(
    session: &mut TranspileSession<C>,
    ctx: &BuildContext,
    config: &AnvilConfig,
    changed: &[ChangedFile],
    opts: &TranspileOptions,
) -> Result<(), BuildError> {
    ctx.set_state(BuildState::Building);

    // Built lazily once, reused for every later update.
    let parsed = session.ensure_config(&opts.config_file, &ctx.root_dir)?;
    resolve_emit_flags(&parsed, config, opts);

    let ts_files: Vec<&ChangedFile> = changed.iter().filter(|c| c.ext == ".ts").collect();

    // Only the compiler crosses into the worker closures; the session's
    // retained program is not shareable and is not needed on this path.
    let compiler = session.compiler();
    let failures: Vec<BuildError> = ts_files
        .par_iter()
        .filter_map(|changed| update_one(compiler, ctx, config, &parsed, changed, opts).err())
        .collect();

    if let Some(first) = failures.into_iter().next() {
        ctx.set_state(BuildState::Unbuilt);
        return Err(first);
    }

    ctx.set_state(BuildState::Built);
    Ok(())
}

fn update_one<C: Compiler>(
    compiler: &C,
    ctx: &BuildContext,
    config: &AnvilConfig,
    parsed: &Arc<ParsedConfig>,
    changed: &ChangedFile,
    opts: &TranspileOptions,
) -> Result<(), BuildError> {
    let path = &changed.path;

    // An update is in memory already; the caller-held pristine string is the
    // recovery point, no shadow bookkeeping needed for one file.
    let source_text = ctx
        .store
        .get(path)
        .map(|entry| entry.content)
        .ok_or_else(|| CompileError::file(path.clone()))?;

    let to_compile = if opts.use_transforms {
        transform_source(ctx, config, path, &source_text)?
    } else {
        source_text.clone()
    };

    let output = compiler
        .transpile_module(path, &to_compile, &parsed.options)
        .map_err(|e| {
            crate::debug!("transpile"; "update failed for {}: {e:#}", path.display());
            CompileError::file(path.clone())
        })?;

    // Diagnostics are scoped to this one operation, never merged into the
    // per-program set.
    let diagnostics: Vec<Diagnostic> = output
        .diagnostics
        .iter()
        .map(|raw| normalize_compiler(&ctx.root_dir, raw))
        .collect();

    if !diagnostics.is_empty() {
        print_diagnostics(&diagnostics);
        crate::debug!("transpile"; "update: {} diagnostics for {}", diagnostics.len(), path.display());
        return Err(CompileError::file(path.clone()).into());
    }

    let js_path = path.with_extension("js");
    let mut map_path = js_path.clone().into_os_string();
    map_path.push(".map");

    let js_content = if opts.inline_templates {
        inline_template(&output.output_text, path, &ctx.store)
    } else {
        output.output_text
    };

    if parsed.options.source_map() && !output.source_map_text.is_empty() {
        let map_path = std::path::PathBuf::from(map_path);
        ctx.store
            .set(&map_path, Entry::new(&map_path, output.source_map_text));
    }
    ctx.store.set(&js_path, Entry::new(&js_path, js_content));
    // Pristine source goes back in, so future diffs see unrewritten input.
    ctx.store.set(path, Entry::new(path, source_text));

    Ok(())
}

/// The same metadata rewrite as the full path, scoped to one file's
/// in-memory content.
fn transform_source(
    ctx: &BuildContext,
    config: &AnvilConfig,
    path: &Path,
    input: &str,
) -> Result<String, TransformError> {
    let suffix = &config.build.deep_link_suffix;

    if transform::is_deep_link_file(path, suffix) {
        return Ok(transform::strip_declaration(input));
    }

    if path == config.app_module_path() && !transform::has_aggregated_config(input) {
        let declarations = transform::collect_declarations(&ctx.store, suffix)?;
        return Ok(transform::splice_aggregated_config(path, input, &declarations));
    }

    Ok(input.to_string())
}
