// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Path and language-identifier utilities.
//!
//! Maps file extensions to canonical LSP language identifiers and converts
//! between absolute paths, project-relative paths, and `file://` URIs.

use anyhow::{Context, Result, anyhow};
use lsp_types::Uri;
use std::path::{Path, PathBuf};

/// Returns the canonical LSP language identifier for a file, falling back
/// to `"plaintext"` for unrecognized extensions.
#[must_use]
pub fn language_id(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("rs") => "rust",
        Some("go") => "go",
        Some("py") => "python",
        Some("js" | "mjs" | "cjs") => "javascript",
        Some("ts" | "mts" | "cts") => "typescript",
        Some("tsx") => "typescriptreact",
        Some("jsx") => "javascriptreact",
        Some("c") => "c",
        Some("cpp" | "cc" | "cxx") => "cpp",
        Some("h" | "hpp") => "cpp",
        Some("java") => "java",
        Some("rb") => "ruby",
        Some("sh" | "bash") => "shellscript",
        Some("zsh") => "shellscript",
        Some("json") => "json",
        Some("yaml" | "yml") => "yaml",
        Some("toml") => "toml",
        Some("md") => "markdown",
        Some("html") => "html",
        Some("css") => "css",
        Some("lua") => "lua",
        Some("sql") => "sql",
        _ => "plaintext",
    }
}

/// Converts an absolute filesystem path to a `file://` URI.
///
/// # Errors
///
/// Returns an error if the path cannot be parsed as a URI (e.g. contains
/// characters `Uri` rejects).
pub fn path_to_uri(path: &Path) -> Result<Uri> {
    let raw = format!("file://{}", path.display());
    raw.parse()
        .map_err(|e| anyhow!("invalid path for URI {}: {e}", path.display()))
}

/// Converts a `file://` URI back to a filesystem path.
///
/// # Errors
///
/// Returns an error if the URI is not a `file://` URI.
pub fn uri_to_path(uri: &Uri) -> Result<PathBuf> {
    uri.as_str()
        .strip_prefix("file://")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("not a file:// URI: {}", uri.as_str()))
}

/// Resolves `file` (absolute or relative to `root`) to an absolute,
/// canonicalized path.
///
/// # Errors
///
/// Returns an error if the path does not exist.
pub fn resolve(root: &Path, file: &str) -> Result<PathBuf> {
    let candidate = Path::new(file);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    joined
        .canonicalize()
        .with_context(|| format!("failed to resolve path '{file}'"))
}

/// Returns `path` relative to `root`, or `path` unchanged if it does not
/// have `root` as a prefix.
#[must_use]
pub fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).map_or_else(|_| path.to_path_buf(), Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_id_known_extensions() {
        assert_eq!(language_id(Path::new("a.rs")), "rust");
        assert_eq!(language_id(Path::new("a.py")), "python");
        assert_eq!(language_id(Path::new("a.ts")), "typescript");
        assert_eq!(language_id(Path::new("a.tsx")), "typescriptreact");
        assert_eq!(language_id(Path::new("a.sh")), "shellscript");
    }

    #[test]
    fn language_id_unknown_extension_is_plaintext() {
        assert_eq!(language_id(Path::new("a.unknown")), "plaintext");
        assert_eq!(language_id(Path::new("noext")), "plaintext");
    }

    #[test]
    fn path_to_uri_roundtrip() {
        let path = Path::new("/proj/src/main.rs");
        let uri = path_to_uri(path).unwrap();
        assert_eq!(uri.as_str(), "file:///proj/src/main.rs");

        let back = uri_to_path(&uri).unwrap();
        assert_eq!(back, PathBuf::from("/proj/src/main.rs"));
    }

    #[test]
    fn uri_to_path_rejects_non_file_scheme() {
        let uri: Uri = "https://example.com/a".parse().unwrap();
        assert!(uri_to_path(&uri).is_err());
    }

    #[test]
    fn relative_to_strips_prefix() {
        let root = Path::new("/proj");
        let path = Path::new("/proj/src/main.rs");
        assert_eq!(relative_to(root, path), PathBuf::from("src/main.rs"));
    }

    #[test]
    fn relative_to_passes_through_when_not_prefixed() {
        let root = Path::new("/proj");
        let path = Path::new("/other/main.rs");
        assert_eq!(relative_to(root, path), PathBuf::from("/other/main.rs"));
    }
}
