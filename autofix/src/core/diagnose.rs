//! Best-effort extraction of the offending file from test-runner output.
//!
//! The grammar is deliberately narrow. A file reference is the first
//! substring matching `./<anything>.py:`; failing that, the first run of
//! path-like characters (`\w`, `/`, `\`) ending in `.py:`. This is a
//! heuristic over free text, not a parser of any runner's output format.

use std::sync::LazyLock;

use regex::Regex;

static RELATIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\./.*?\.py):").expect("relative path regex"));
static PERMISSIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\w/\\]+\.py):").expect("permissive path regex"));

/// A file reference found in diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    /// The token exactly as it appeared in the text (without the trailing `:`).
    pub raw: String,
    /// Normalized relative path: `/` separators, no leading `./`.
    pub path: String,
}

/// Find the first `.py:`-suffixed file reference in `text`.
///
/// Returns `None` when neither pattern matches; callers treat that as a
/// "could not diagnose" result.
pub fn extract_file_reference(text: &str) -> Option<FileReference> {
    let captures = RELATIVE_RE
        .captures(text)
        .or_else(|| PERMISSIVE_RE.captures(text))?;
    let raw = captures.get(1)?.as_str().to_string();
    let normalized = raw.replace('\\', "/");
    let path = normalized
        .strip_prefix("./")
        .unwrap_or(&normalized)
        .to_string();
    Some(FileReference { raw, path })
}
