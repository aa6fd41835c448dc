//! Full-program compile engine.
//!
//! [`TranspileSession`] owns the two caches that make the edit/rebuild loop
//! fast: the parsed project config (reused across every incremental call)
//! and the opaque program handle the compiler accepts as a reuse hint. Both
//! are per-session values with an explicit [`TranspileSession::invalidate`];
//! nothing here is ambient process state, so two build contexts in one
//! process cannot leak into each other.
//!
//! The full compile path rewrites deep-link metadata in place. While the
//! rewrite window is open, every touched file's pristine content lives in a
//! shadow entry; [`ShadowSet`] restores on drop, so the store returns to a
//! rewrite-free baseline on every exit path, including compiler panics
//! surfaced as errors.

pub mod update;
pub mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::project::{ParsedConfig, load_project_config};
use crate::config::{AnvilConfig, ConfigError};
use crate::core::{BuildContext, BuildState};
use crate::diagnostics::print::print_diagnostics;
use crate::diagnostics::{Diagnostic, DiagnosticSource, normalize_compiler};
use crate::errors::{BuildError, CompileError, TransformError};
use crate::services::Compiler;
use crate::store::{Entry, FileStore};
use crate::transform;
use crate::transform::template::inline_template;

/// Suffix under which a pristine copy is kept during a rewrite window.
pub const SHADOW_SUFFIX: &str = ".pristine";

/// Per-call knobs for a compile pass.
#[derive(Debug, Clone)]
pub struct TranspileOptions {
    pub config_file: PathBuf,
    /// `false` forces source maps off regardless of the bundler's wish.
    pub source_maps: bool,
    pub inline_templates: bool,
    /// Apply the deep-link rewrite before compiling.
    pub use_transforms: bool,
}

impl TranspileOptions {
    pub fn from_config(config: &AnvilConfig) -> Self {
        Self {
            config_file: config.tsconfig_path(),
            source_maps: true,
            inline_templates: config.build.inline_templates,
            use_transforms: config.build.parse_deep_links,
        }
    }
}

/// Compile session holding the caches shared by the full and incremental
/// paths for one build context.
pub struct TranspileSession<C: Compiler> {
    compiler: C,
    cached_config: Option<Arc<ParsedConfig>>,
    cached_program: Option<C::Program>,
}

impl<C: Compiler> TranspileSession<C> {
    pub fn new(compiler: C) -> Self {
        Self {
            compiler,
            cached_config: None,
            cached_program: None,
        }
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    /// Drop both caches. The next compile reparses and rebuilds from scratch.
    pub fn invalidate(&mut self) {
        self.cached_config = None;
        self.cached_program = None;
    }

    pub fn has_program(&self) -> bool {
        self.cached_program.is_some()
    }

    /// The retained program from the last successful compile, if any.
    pub fn program(&self) -> Option<&C::Program> {
        self.cached_program.as_ref()
    }

    /// Reuse the cached config or parse fresh. A fresh parse invalidates the
    /// retained program; nothing else ever does.
    pub fn ensure_config(
        &mut self,
        config_file: &Path,
        root: &Path,
    ) -> Result<Arc<ParsedConfig>, ConfigError> {
        if let Some(config) = &self.cached_config {
            return Ok(Arc::clone(config));
        }
        let config = Arc::new(load_project_config(config_file, root)?);
        self.cached_program = None;
        self.cached_config = Some(Arc::clone(&config));
        Ok(config)
    }

    /// The full compile for all project files.
    pub fn transpile(
        &mut self,
        ctx: &BuildContext,
        config: &AnvilConfig,
        opts: &TranspileOptions,
    ) -> Result<(), BuildError> {
        ctx.set_state(BuildState::Building);
        ctx.clear_diagnostics(DiagnosticSource::Compiler);

        let parsed = self.ensure_config(&opts.config_file, &ctx.root_dir)?;
        resolve_emit_flags(&parsed, config, opts);

        let file_names = parsed.file_names.clone();

        // The shadow guard stays alive across the compile and restores the
        // store before the outcome is evaluated, error or not.
        let compiled = {
            let _shadows = if opts.use_transforms {
                Some(apply_deep_link_rewrites(ctx, config)?)
            } else {
                None
            };
            self.compiler.compile(
                &file_names,
                &parsed.options,
                &ctx.store,
                self.cached_program.as_ref(),
            )
        };

        let output = compiled.map_err(|e| {
            ctx.set_state(BuildState::Unbuilt);
            CompileError {
                message: format!("compiler service failed: {e:#}"),
                path: None,
            }
        })?;

        for emitted in &output.emitted {
            write_emitted(ctx, opts, &emitted.path, &emitted.content);
        }

        let diagnostics: Vec<Diagnostic> = output
            .diagnostics
            .iter()
            .map(|raw| normalize_compiler(&ctx.root_dir, raw))
            .collect();

        if !diagnostics.is_empty() {
            ctx.record_diagnostics(&diagnostics);
            print_diagnostics(&diagnostics);
            ctx.set_state(BuildState::Unbuilt);
            return Err(CompileError::program().into());
        }

        // Retain the program for the next compile's reuse hint.
        self.cached_program = Some(output.program);
        ctx.set_state(BuildState::Built);
        Ok(())
    }
}

/// Source maps: forced off by the caller, otherwise the bundler decides.
/// Declaration files are never emitted on this path.
fn resolve_emit_flags(parsed: &ParsedConfig, config: &AnvilConfig, opts: &TranspileOptions) {
    if opts.source_maps {
        parsed.options.set_source_map(config.build.source_maps);
    } else {
        parsed.options.set_source_map(false);
    }
    parsed.options.set_declaration(false);
}

/// Snapshot every declaring file plus the aggregation target, then rewrite
/// the live entries: strip declarations, splice the synthesized config when
/// the target has none of its own.
fn apply_deep_link_rewrites<'a>(
    ctx: &'a BuildContext,
    config: &AnvilConfig,
) -> Result<ShadowSet<'a>, BuildError> {
    let suffix = &config.build.deep_link_suffix;
    let target_path = config.app_module_path();

    let Some(target) = ctx.store.get(&target_path) else {
        return Err(TransformError::TargetMissing(target_path).into());
    };

    // Declarations come from pristine content, before any stripping.
    let declarations = transform::collect_declarations(&ctx.store, suffix)?;

    let mut shadows = ShadowSet::new(&ctx.store);
    let declaring: Vec<Entry> = ctx
        .store
        .all()
        .into_iter()
        .filter(|entry| transform::is_deep_link_file(&entry.path, suffix))
        .collect();

    for entry in &declaring {
        shadows.snapshot(entry);
    }
    shadows.snapshot(&target);

    for entry in declaring {
        let stripped = transform::strip_declaration(&entry.content);
        ctx.store.set(&entry.path, Entry::new(&entry.path, stripped));
    }

    if !transform::has_aggregated_config(&target.content) {
        let spliced =
            transform::splice_aggregated_config(&target_path, &target.content, &declarations);
        ctx.store.set(&target_path, Entry::new(&target_path, spliced));
    }

    Ok(shadows)
}

/// Pristine-content backups for the files a rewrite window touches.
///
/// Restores on drop: every shadowed path gets its original content back and
/// the shadow key disappears, whatever way the compile pass exits.
pub struct ShadowSet<'a> {
    store: &'a FileStore,
    paths: Vec<PathBuf>,
}

impl<'a> ShadowSet<'a> {
    pub fn new(store: &'a FileStore) -> Self {
        Self {
            store,
            paths: Vec::new(),
        }
    }

    pub fn snapshot(&mut self, entry: &Entry) {
        let shadow_path = shadow_path_for(&entry.path);
        self.store
            .set(&shadow_path, Entry::new(&entry.path, entry.content.clone()));
        self.paths.push(entry.path.clone());
    }
}

impl Drop for ShadowSet<'_> {
    fn drop(&mut self) {
        for path in &self.paths {
            let shadow_path = shadow_path_for(path);
            if let Some(shadow) = self.store.delete(&shadow_path) {
                self.store.set(path, Entry::new(path, shadow.content));
            }
        }
    }
}

fn shadow_path_for(path: &Path) -> PathBuf {
    let mut shadow = path.as_os_str().to_owned();
    shadow.push(SHADOW_SUFFIX);
    PathBuf::from(shadow)
}

/// Write one emitted artifact into the store under its final path. Only
/// script and source-map artifacts are kept; generated script gets templates
/// inlined first when enabled.
fn write_emitted(ctx: &BuildContext, opts: &TranspileOptions, path: &Path, data: &str) {
    let name = path.to_string_lossy();
    if name.ends_with(".js") {
        let content = if opts.inline_templates {
            let source_path = path.with_extension("ts");
            inline_template(data, &source_path, &ctx.store)
        } else {
            data.to_string()
        };
        ctx.store.set(path, Entry::new(path, content));
    } else if name.ends_with(".js.map") {
        ctx.store.set(path, Entry::new(path, data.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::FakeCompiler;
    use std::sync::atomic::Ordering;

    const HOME_PAGE: &str =
        "@DeepLink({ name: 'Home', segment: 'home' })\nexport class HomePage {}\n";
    const APP_MODULE: &str = "import { App } from './app';\nexport class AppModule {}\n";

    fn project() -> (tempfile::TempDir, AnvilConfig, BuildContext) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("anvil.toml"), "").unwrap();
        std::fs::write(dir.path().join("tsconfig.json"), "{}").unwrap();

        let src = dir.path().join("src");
        let app = src.join("app");
        std::fs::create_dir_all(&app).unwrap();
        std::fs::write(src.join("home.page.ts"), HOME_PAGE).unwrap();
        std::fs::write(app.join("app.module.ts"), APP_MODULE).unwrap();

        let config = AnvilConfig::load(&dir.path().join("anvil.toml")).unwrap();
        let ctx = BuildContext::new(dir.path(), config.build_dir());
        ctx.seed_from_disk(&config.src_dir()).unwrap();
        (dir, config, ctx)
    }

    #[test]
    fn full_compile_emits_and_retains_program() {
        let (_dir, config, ctx) = project();
        let mut session = TranspileSession::new(FakeCompiler::default());
        let opts = TranspileOptions::from_config(&config);

        session.transpile(&ctx, &config, &opts).unwrap();

        assert!(session.has_program());
        assert_eq!(ctx.build_state(), BuildState::Built);

        let js = ctx
            .store
            .get(&config.src_dir().join("home.page.js"))
            .unwrap();
        assert!(js.content.starts_with("/* js */"));
        // decorator was stripped before the compiler saw the file
        assert!(!js.content.contains("@DeepLink"));

        let map = ctx.store.get(&config.src_dir().join("home.page.js.map"));
        assert!(map.is_some());
    }

    #[test]
    fn shadows_restored_after_success_and_failure() {
        let (_dir, config, ctx) = project();
        let mut session = TranspileSession::new(FakeCompiler::default());
        let opts = TranspileOptions::from_config(&config);

        let page_path = config.src_dir().join("home.page.ts");
        let module_path = config.app_module_path();

        session.transpile(&ctx, &config, &opts).unwrap();
        assert_eq!(ctx.store.get(&page_path).unwrap().content, HOME_PAGE);
        assert_eq!(ctx.store.get(&module_path).unwrap().content, APP_MODULE);
        assert!(!ctx.store.has(&shadow_path_for(&page_path)));

        // Break the page, compile again: restore must still run.
        ctx.store.set(
            &page_path,
            Entry::new(&page_path, format!("{HOME_PAGE}BROKEN\n")),
        );
        let err = session.transpile(&ctx, &config, &opts).unwrap_err();
        assert_eq!(err.to_string(), "Failed to transpile program");
        assert!(!ctx.store.has(&shadow_path_for(&page_path)));
        assert!(
            ctx.store
                .get(&page_path)
                .unwrap()
                .content
                .contains("@DeepLink")
        );
        assert_eq!(ctx.build_state(), BuildState::Unbuilt);
    }

    #[test]
    fn failure_keeps_cached_config_and_program_reuse_works() {
        let (_dir, config, ctx) = project();
        let compiler = FakeCompiler::default();
        let mut session = TranspileSession::new(compiler);
        let opts = TranspileOptions::from_config(&config);

        session.transpile(&ctx, &config, &opts).unwrap();

        let page_path = config.src_dir().join("home.page.ts");
        ctx.store
            .set(&page_path, Entry::new(&page_path, "BROKEN"));
        assert!(session.transpile(&ctx, &config, &opts).is_err());

        // failure never forces a reparse, and the retained program survives
        assert!(session.cached_config.is_some());
        assert!(session.has_program());

        ctx.store.set(&page_path, Entry::new(&page_path, HOME_PAGE));
        session.transpile(&ctx, &config, &opts).unwrap();
        // three compiles, one parse; the failed pass never replaced the
        // retained program, so the third still chains off the first
        assert_eq!(session.compiler.compile_calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            session.cached_program.as_ref().map(|p| p.generation),
            Some(1)
        );
    }

    #[test]
    fn missing_aggregation_target_fails_the_build() {
        let (_dir, config, ctx) = project();
        ctx.store.delete(&config.app_module_path());

        let mut session = TranspileSession::new(FakeCompiler::default());
        let opts = TranspileOptions::from_config(&config);
        let err = session.transpile(&ctx, &config, &opts).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Transform(TransformError::TargetMissing(_))
        ));
    }

    #[test]
    fn source_maps_forced_off_when_disabled() {
        let (_dir, config, ctx) = project();
        let mut session = TranspileSession::new(FakeCompiler::default());
        let mut opts = TranspileOptions::from_config(&config);
        opts.source_maps = false;

        session.transpile(&ctx, &config, &opts).unwrap();
        assert!(!ctx.store.has(&config.src_dir().join("home.page.js.map")));
    }
}
