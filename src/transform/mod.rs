//! Deep-link metadata rewriting.
//!
//! Pages declare route metadata in-source with a `@DeepLink({ ... })`
//! decorator; before compilation the decorator is stripped from each
//! declaring file and, unless the app module already configures its links
//! explicitly, a `setupDeepLinks([...])` call aggregating every declaration
//! is spliced into it.
//!
//! This is deliberate text-level rewriting, not structural parsing, so the
//! full-program and single-file compile paths share the exact same behavior.
//! Both operations are idempotent: stripping a stripped file and splicing an
//! already-configured module are no-ops.

pub mod template;

use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::errors::TransformError;
use crate::store::FileStore;

/// In-source marker identifying a declaring file.
const DECORATOR: &str = "@DeepLink";

/// Marker for an explicit aggregated configuration in the app module.
fn setup_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"setupDeepLinks\s*\(").unwrap())
}

fn export_class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"export\s+class\s+([A-Za-z_$][\w$]*)").unwrap())
}

/// One route/deep-link declaration recovered from a declaring file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepLinkDecl {
    pub name: String,
    pub segment: String,
    pub class_name: String,
    pub file_path: PathBuf,
}

/// Decorator argument shape, parsed leniently (single quotes, trailing commas).
#[derive(Debug, Deserialize)]
struct DecoratorArgs {
    name: Option<String>,
    segment: Option<String>,
}

/// A file is a declaring file when it matches the configured suffix
/// convention. Not matching is never an error.
pub fn is_deep_link_file(path: &Path, suffix: &str) -> bool {
    path.to_string_lossy().ends_with(suffix)
}

/// Locate the decorator and its balanced argument span.
///
/// Returns `(start, end, args)` where `start..end` covers `@DeepLink(...)`
/// plus one trailing line break, and `args` is the text between the outer
/// parentheses. String literals are skipped while matching parentheses.
fn find_decorator(content: &str) -> Option<(usize, usize, &str)> {
    let at = content.find(DECORATOR)?;
    let bytes = content.as_bytes();
    let mut i = at + DECORATOR.len();

    while i < bytes.len() && (bytes[i] as char).is_whitespace() {
        i += 1;
    }
    if i >= bytes.len() || bytes[i] != b'(' {
        return None;
    }

    let args_start = i + 1;
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1; // skip escaped char
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        let mut end = i + 1;
                        // swallow one trailing line break
                        if content[end..].starts_with("\r\n") {
                            end += 2;
                        } else if content[end..].starts_with('\n') {
                            end += 1;
                        }
                        return Some((at, end, &content[args_start..i]));
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Remove the `@DeepLink(...)` marker, leaving syntactically valid source.
/// A file without the marker is returned unchanged.
pub fn strip_declaration(content: &str) -> String {
    match find_decorator(content) {
        Some((start, end, _)) => {
            let mut out = String::with_capacity(content.len());
            out.push_str(&content[..start]);
            out.push_str(&content[end..]);
            out
        }
        None => content.to_string(),
    }
}

/// Parse the declaration carried by a declaring file.
pub fn parse_declaration(
    path: &Path,
    content: &str,
) -> Result<Option<DeepLinkDecl>, TransformError> {
    let Some((_, _, args)) = find_decorator(content) else {
        return Ok(None);
    };

    let parsed: DecoratorArgs = if args.trim().is_empty() {
        DecoratorArgs {
            name: None,
            segment: None,
        }
    } else {
        json5::from_str(args).map_err(|e| TransformError::BadDeclaration {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
    };

    let class_name = export_class_re()
        .captures(content)
        .map(|c| c[1].to_string())
        .ok_or_else(|| TransformError::BadDeclaration {
            path: path.to_path_buf(),
            reason: "declaring file has no exported class".into(),
        })?;

    let name = parsed.name.unwrap_or_else(|| class_name.clone());
    let segment = parsed.segment.unwrap_or_else(|| name.to_lowercase());

    Ok(Some(DeepLinkDecl {
        name,
        segment,
        class_name,
        file_path: path.to_path_buf(),
    }))
}

/// Collect every declaration in the store, sorted by name so the synthesized
/// config is deterministic.
pub fn collect_declarations(
    store: &FileStore,
    suffix: &str,
) -> Result<Vec<DeepLinkDecl>, TransformError> {
    let mut declarations = Vec::new();
    for entry in store.all() {
        if !is_deep_link_file(&entry.path, suffix) {
            continue;
        }
        if let Some(decl) = parse_declaration(&entry.path, &entry.content)? {
            declarations.push(decl);
        }
    }
    declarations.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(declarations)
}

/// Does the aggregation target already declare an explicit configuration?
pub fn has_aggregated_config(target_content: &str) -> bool {
    setup_call_re().is_match(target_content)
}

/// Render the aggregated declarations as a `setupDeepLinks` call.
pub fn convert_declarations_to_string(target_path: &Path, declarations: &[DeepLinkDecl]) -> String {
    let target_dir = target_path.parent().unwrap_or_else(|| Path::new(""));
    let mut out = String::from("setupDeepLinks([\n");
    for decl in declarations {
        let specifier = relative_specifier(target_dir, &decl.file_path);
        out.push_str(&format!(
            "  {{ name: '{}', segment: '{}', loadChildren: '{}#{}' }},\n",
            decl.name, decl.segment, specifier, decl.class_name
        ));
    }
    out.push_str("]);");
    out
}

/// Splice the synthesized configuration into the target at a deterministic
/// point: directly after the final import line. A target that already has an
/// explicit configuration is left unchanged.
pub fn splice_aggregated_config(
    target_path: &Path,
    target_content: &str,
    declarations: &[DeepLinkDecl],
) -> String {
    if has_aggregated_config(target_content) {
        return target_content.to_string();
    }

    let block = convert_declarations_to_string(target_path, declarations);
    let insert_at = end_of_imports(target_content);

    let mut out = String::with_capacity(target_content.len() + block.len() + 2);
    out.push_str(&target_content[..insert_at]);
    out.push('\n');
    out.push_str(&block);
    out.push('\n');
    out.push_str(&target_content[insert_at..]);
    out
}

/// Byte offset just past the last top-level `import ...;` line.
fn end_of_imports(content: &str) -> usize {
    let mut offset = 0;
    let mut end = 0;
    for line in content.split_inclusive('\n') {
        if line.trim_start().starts_with("import ") {
            end = offset + line.len();
        }
        offset += line.len();
    }
    end
}

/// Module specifier for `to_file` relative to `from_dir`, extension dropped.
fn relative_specifier(from_dir: &Path, to_file: &Path) -> String {
    let to_file = to_file.with_extension("");
    let from: Vec<_> = from_dir.components().collect();
    let to: Vec<_> = to_file.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let ups = from.len() - common;
    let mut parts: Vec<String> = Vec::new();
    if ups == 0 {
        parts.push(".".into());
    } else {
        parts.extend(std::iter::repeat_n("..".to_string(), ups));
    }
    for component in &to[common..] {
        parts.push(component.as_os_str().to_string_lossy().into_owned());
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Entry;

    const PAGE: &str = "import { DeepLink } from 'router';\n\n@DeepLink({ name: 'Home', segment: 'home' })\nexport class HomePage {}\n";

    #[test]
    fn strip_removes_decorator_and_is_idempotent() {
        let once = strip_declaration(PAGE);
        assert!(!once.contains("@DeepLink"));
        assert!(once.contains("export class HomePage"));

        let twice = strip_declaration(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn strip_handles_nested_parens_and_strings() {
        let source = "@DeepLink({ name: 'a(b)', segment: ')tricky(' })\nexport class P {}\n";
        let stripped = strip_declaration(source);
        assert_eq!(stripped, "export class P {}\n");
    }

    #[test]
    fn parse_recovers_name_segment_and_class() {
        let decl = parse_declaration(Path::new("/app/src/pages/home.page.ts"), PAGE)
            .unwrap()
            .unwrap();
        assert_eq!(decl.name, "Home");
        assert_eq!(decl.segment, "home");
        assert_eq!(decl.class_name, "HomePage");
    }

    #[test]
    fn parse_defaults_from_class_name() {
        let source = "@DeepLink()\nexport class AboutPage {}\n";
        let decl = parse_declaration(Path::new("/app/src/about.page.ts"), source)
            .unwrap()
            .unwrap();
        assert_eq!(decl.name, "AboutPage");
        assert_eq!(decl.segment, "aboutpage");
    }

    #[test]
    fn non_declaring_file_is_none() {
        let decl = parse_declaration(Path::new("/app/src/util.ts"), "export const x = 1;").unwrap();
        assert!(decl.is_none());
    }

    #[test]
    fn splice_after_last_import() {
        let module = "import { App } from './app';\nimport { setup } from 'router';\n\nexport class AppModule {}\n";
        let decls = vec![DeepLinkDecl {
            name: "Home".into(),
            segment: "home".into(),
            class_name: "HomePage".into(),
            file_path: PathBuf::from("/app/src/pages/home.page.ts"),
        }];

        let spliced = splice_aggregated_config(Path::new("/app/src/app.module.ts"), module, &decls);
        let setup_at = spliced.find("setupDeepLinks").unwrap();
        let last_import = spliced.rfind("import ").unwrap();
        assert!(setup_at > last_import);
        assert!(spliced.contains("loadChildren: './pages/home.page#HomePage'"));
    }

    #[test]
    fn splice_is_noop_when_config_exists() {
        let module = "import { App } from './app';\nsetupDeepLinks([]);\n";
        assert!(has_aggregated_config(module));
        let spliced = splice_aggregated_config(Path::new("/app/src/app.module.ts"), module, &[]);
        assert_eq!(spliced, module);
    }

    #[test]
    fn collect_sorts_by_name() {
        let store = FileStore::new();
        store.set(
            "/app/src/b.page.ts",
            Entry::new("/app/src/b.page.ts", "@DeepLink({ name: 'Zed' })\nexport class Zed {}"),
        );
        store.set(
            "/app/src/a.page.ts",
            Entry::new("/app/src/a.page.ts", "@DeepLink({ name: 'Alpha' })\nexport class Alpha {}"),
        );
        store.set("/app/src/util.ts", Entry::new("/app/src/util.ts", "export {}"));

        let decls = collect_declarations(&store, ".page.ts").unwrap();
        let names: Vec<_> = decls.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Zed"]);
    }

    #[test]
    fn relative_specifier_walks_up() {
        let spec = relative_specifier(
            Path::new("/app/src/app"),
            Path::new("/app/src/pages/home.page.ts"),
        );
        assert_eq!(spec, "../pages/home.page");
    }
}
