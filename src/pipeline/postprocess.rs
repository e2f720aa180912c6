//! Post-processing: the minimal cleanup applied to VLM-generated note markdown.
//!
//! The model's markdown is what gets cached and rendered, so anything beyond
//! unwrapping it is left alone. Trailing-space hard breaks, blank lines inside
//! code and a plain fenced code block are all meaningful markdown.
//!
//! ## Rules
//!
//! 1. Strip an outer fence tagged `markdown` or `md`. Models add it even when
//!    told not to; the LaTeX engine would otherwise typeset the whole note as
//!    one verbatim block. An untagged fence is content and is kept.
//! 2. Normalise line endings (CRLF → LF).

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply the post-processing rules to the raw model output.
pub fn clean_markdown(input: &str) -> String {
    let s = strip_markdown_fences(input);
    normalise_line_endings(&s)
}

// ── Rule 1: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)[ \t]*\r?\n(.*?)\r?\n?```[ \t]*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Tests ────────────────────────────────────────────────────────────────────
