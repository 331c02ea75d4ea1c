//! Syntax check for inline `<script>` blocks
//!
//! Scripts are compiled by the browser under test without being run, so the
//! check sees exactly the parser the page will meet.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use crate::cdp::PageSession;
use crate::error::E2eResult;

/// `type` values that still mean JavaScript
const JS_TYPES: [&str; 3] = ["text/javascript", "application/javascript", "module"];

fn script_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script>").expect("valid script regex")
    })
}

fn src_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bsrc\s*=").expect("valid src regex"))
}

fn type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\btype\s*=\s*["']([^"']+)["']"#).expect("valid type regex")
    })
}

/// Bodies of the inline JavaScript blocks in `html`, in document order.
///
/// External (`src=`) scripts, non-JavaScript types such as JSON-LD, and
/// blank bodies are skipped.
pub fn extract_scripts(html: &str) -> Vec<String> {
    script_re()
        .captures_iter(html)
        .filter_map(|caps| {
            let attrs = caps.get(1).map_or("", |m| m.as_str());
            let code = caps.get(2).map_or("", |m| m.as_str());

            if src_re().is_match(attrs) {
                return None;
            }
            if let Some(kind) = type_re().captures(attrs) {
                let kind = kind[1].to_ascii_lowercase();
                if !JS_TYPES.contains(&kind.as_str()) {
                    return None;
                }
            }
            if code.trim().is_empty() {
                return None;
            }
            Some(code.to_string())
        })
        .collect()
}

/// Compile every inline script of `files` (relative to `root`).
///
/// Returns one failure line per missing file or syntax error; an empty list
/// means every script parsed.
pub async fn check_pages(
    session: &PageSession,
    root: &Path,
    files: &[String],
) -> E2eResult<Vec<String>> {
    let mut failures = Vec::new();

    for file in files {
        let path = root.join(file);
        let html = match tokio::fs::read_to_string(&path).await {
            Ok(html) => html,
            Err(e) => {
                failures.push(format!("Missing file: {} ({})", file, e));
                continue;
            }
        };

        let scripts = extract_scripts(&html);
        debug!("{}: {} inline script(s)", file, scripts.len());

        for (i, code) in scripts.iter().enumerate() {
            let name = format!("{}::script#{}", file, i + 1);
            if let Some(message) = session.compile_script(code, &name).await? {
                failures.push(format!("JS syntax error in {}: {}", name, message));
            }
        }
    }

    if failures.is_empty() {
        info!("Inline JS syntax check passed ({} file(s))", files.len());
    }
    Ok(failures)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_skips_external_and_data_scripts() {
        let html = r#"<!doctype html>
<html><head>
<script src="app.js"></script>
<script type="application/ld+json">{"@type": "WebPage"}</script>
<SCRIPT>
  const a = 1;
</SCRIPT>
</head><body>
<script type="module">import "./x.js";</script>
<script type='TEXT/JAVASCRIPT'>go()</script>
<script>   </script>
</body></html>"#;

        let scripts = extract_scripts(html);
        assert_eq!(scripts.len(), 3);
        assert!(scripts[0].contains("const a = 1;"));
        assert_eq!(scripts[1], r#"import "./x.js";"#);
        assert_eq!(scripts[2], "go()");
    }

    #[test]
    fn test_extract_is_lazy_between_blocks() {
        let html = "<script>one()</script><p>x</p><script defer>two()</script>";
        assert_eq!(extract_scripts(html), vec!["one()", "two()"]);
    }

    #[test]
    fn test_src_attribute_with_spaces() {
        assert!(extract_scripts(r#"<script async src = "a.js">noop()</script>"#).is_empty());
    }
}
