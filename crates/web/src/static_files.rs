//! Static file serving from a repository root

use std::path::{Path, PathBuf};

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, warn};

/// File served for any request path ending in a slash
pub const INDEX_FILE: &str = "index.html";

/// Reasons a request path cannot be mapped into the served root
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StaticFileError {
    #[error("Malformed request path: {0}")]
    Malformed(String),

    #[error("Request path escapes the served root: {0}")]
    Traversal(String),
}

/// Map a raw request path onto a file below `root`.
///
/// The query string is dropped, the remainder is percent-decoded and NUL
/// bytes are removed. `.` and `..` segments are folded lexically, treating
/// both `/` and `\` as separators. A `..` that would climb above the root is
/// rejected here, before anything touches the filesystem.
pub fn resolve_request_path(root: &Path, raw: &str) -> Result<PathBuf, StaticFileError> {
    let path = raw.split('?').next().unwrap_or_default();

    let decoded = urlencoding::decode(path)
        .map_err(|_| StaticFileError::Malformed(raw.to_string()))?;
    let decoded: String = decoded.chars().filter(|c| *c != '\0').collect();

    let mut relative = PathBuf::new();
    for segment in decoded.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if !relative.pop() {
                    return Err(StaticFileError::Traversal(raw.to_string()));
                }
            }
            name => relative.push(name),
        }
    }

    if decoded.is_empty() || decoded.ends_with('/') {
        relative.push(INDEX_FILE);
    }

    Ok(root.join(relative))
}

/// Content type for a served file, chosen by extension
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "html" => "text/html; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "json" => "application/json; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Static file handler rooted at a canonical directory
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    /// Create a handler for `root`. The directory must exist.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().canonicalize()?;
        if !root.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    /// Canonical root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serve the file addressed by a raw request path
    pub async fn serve(&self, raw_path: &str) -> Response {
        let requested = match resolve_request_path(&self.root, raw_path) {
            Ok(path) => path,
            Err(e) => {
                warn!("{}", e);
                return bad_request();
            }
        };

        // Symlinks inside the root may still point outside of it.
        let canonical = match tokio::fs::canonicalize(&requested).await {
            Ok(path) => path,
            Err(_) => return not_found(),
        };
        if !canonical.starts_with(&self.root) {
            warn!("Resolved path leaves the served root: {}", raw_path);
            return bad_request();
        }

        match tokio::fs::metadata(&canonical).await {
            Ok(meta) if meta.is_file() => {}
            _ => return not_found(),
        }

        match tokio::fs::read(&canonical).await {
            Ok(bytes) => {
                debug!("Serving {} ({} bytes)", canonical.display(), bytes.len());
                (
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE, content_type_for(&requested)),
                        (header::CACHE_CONTROL, "no-store"),
                    ],
                    bytes,
                )
                    .into_response()
            }
            Err(e) => {
                warn!("Failed to read {}: {}", canonical.display(), e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, "Bad request").into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not found").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn root() -> PathBuf {
        PathBuf::from("/srv/site")
    }

    #[test_case("/", "index.html" ; "root maps to index")]
    #[test_case("/plusminus/", "plusminus/index.html" ; "trailing slash maps to index")]
    #[test_case("/app.js?v=3", "app.js" ; "query string dropped")]
    #[test_case("/a/./b/../c.css", "a/c.css" ; "dot segments folded")]
    #[test_case("/my%20page.html", "my page.html" ; "percent decoded")]
    #[test_case("/in%00dex.html", "index.html" ; "nul bytes stripped")]
    fn test_resolves_inside_root(raw: &str, expected: &str) {
        let resolved = resolve_request_path(&root(), raw).unwrap();
        assert_eq!(resolved, root().join(expected));
    }

    #[test_case("/../etc/passwd" ; "plain parent")]
    #[test_case("/a/../../etc/passwd" ; "climb after descend")]
    #[test_case("/%2e%2e/etc/passwd" ; "encoded dots")]
    #[test_case("/%2e%2e%2fetc%2fpasswd" ; "encoded slash")]
    #[test_case("/..%5cetc%5cpasswd" ; "encoded backslash")]
    #[test_case("/.%00./etc/passwd" ; "nul inside dots")]
    fn test_rejects_traversal(raw: &str) {
        assert!(matches!(
            resolve_request_path(&root(), raw),
            Err(StaticFileError::Traversal(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_utf8() {
        assert!(matches!(
            resolve_request_path(&root(), "/%ff%fe.html"),
            Err(StaticFileError::Malformed(_))
        ));
    }

    #[test_case("index.html", "text/html; charset=utf-8")]
    #[test_case("app.JS", "text/javascript; charset=utf-8")]
    #[test_case("photo.jpeg", "image/jpeg")]
    #[test_case("photo.jpg", "image/jpeg")]
    #[test_case("favicon.ico", "image/x-icon")]
    #[test_case("data.bin", "application/octet-stream")]
    #[test_case("Makefile", "application/octet-stream")]
    fn test_content_type_table(name: &str, expected: &str) {
        assert_eq!(content_type_for(Path::new(name)), expected);
    }
}
