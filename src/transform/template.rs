//! Template inlining for emitted script.
//!
//! Components referencing an external template (`templateUrl: './x.html'`)
//! get the template content inlined as a `template:` string before the
//! generated script is stored, so the bundler never has to resolve the HTML
//! file itself. Templates are read from the store first, disk second.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::store::FileStore;

fn template_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"templateUrl\s*:\s*['"]([^'"]+)['"]"#).unwrap())
}

/// Replace every `templateUrl` reference in `js_content` with the inlined
/// template. `source_path` anchors relative template paths. References whose
/// template cannot be found are left untouched.
pub fn inline_template(js_content: &str, source_path: &Path, store: &FileStore) -> String {
    let source_dir = source_path.parent().unwrap_or_else(|| Path::new(""));

    template_url_re()
        .replace_all(js_content, |caps: &regex::Captures| {
            let url = &caps[1];
            let template_path = source_dir.join(url);
            match load_template(&template_path, store) {
                Some(content) => format!("template: /* {url} */ '{}'", escape_js(&content)),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn load_template(path: &Path, store: &FileStore) -> Option<String> {
    if let Some(entry) = store.get(path) {
        return Some(entry.content);
    }
    std::fs::read_to_string(path).ok()
}

/// Escape template content for a single-quoted JS string literal.
fn escape_js(content: &str) -> String {
    content
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
}
