//! Markdown code-fence handling for oracle replies.
//!
//! Three flavors are used by the different workflows:
//!
//! - [`strip_fence_markers`]: the fix loop asks for raw code, so any fence
//!   markers that slip through are simply removed.
//! - [`extract_python_block`]: the generator requires a fenced python block
//!   and rejects replies without one.
//! - [`sanitize_reply`]: the corrector prefers a fenced block but falls back
//!   to the whole reply.

use std::sync::LazyLock;

use regex::Regex;

const FENCE: &str = "```";
const PYTHON_FENCE: &str = "```python";

static PYTHON_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```python\s*(.*?)\s*```").expect("python block regex"));

/// Remove every ```` ```python ```` and ```` ``` ```` marker and trim.
pub fn strip_fence_markers(reply: &str) -> String {
    reply
        .replace(PYTHON_FENCE, "")
        .replace(FENCE, "")
        .trim()
        .to_string()
}

/// Return the trimmed body of the first ```` ```python ```` block, if any.
pub fn extract_python_block(reply: &str) -> Option<String> {
    let captures = PYTHON_BLOCK_RE.captures(reply)?;
    Some(captures.get(1)?.as_str().trim().to_string())
}

/// Prefer the first non-empty python block, else strip bare fences.
pub fn sanitize_reply(reply: &str) -> String {
    if let Some(block) = extract_python_block(reply).filter(|b| !b.is_empty()) {
        return block;
    }
    reply.replace(FENCE, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_removes_python_fences() {
        assert_eq!(strip_fence_markers("```python\nprint(1)\n```"), "print(1)");
    }

    #[test]
    fn strip_leaves_plain_code_untouched() {
        assert_eq!(
            strip_fence_markers("  def f():\n    return 1\n"),
            "def f():\n    return 1"
        );
    }

    #[test]
    fn strip_of_fences_only_is_empty() {
        assert_eq!(strip_fence_markers("```python\n```"), "");
    }

    #[test]
    fn extract_takes_first_python_block() {
        let reply = "Here you go:\n```python\nx = 1\n```\nand\n```python\ny = 2\n```";
        assert_eq!(extract_python_block(reply).as_deref(), Some("x = 1"));
    }

    #[test]
    fn extract_requires_python_fence() {
        assert_eq!(extract_python_block("```\nx = 1\n```"), None);
        assert_eq!(extract_python_block("x = 1"), None);
    }

    #[test]
    fn sanitize_falls_back_to_bare_fence_removal() {
        assert_eq!(sanitize_reply("```\nx = 1\n```"), "x = 1");
        assert_eq!(sanitize_reply("x = 1\n"), "x = 1");
        assert_eq!(sanitize_reply("```python\nx = 1\n```"), "x = 1");
    }
}
