//! Deterministic cleanup of OCR output before key-value parsing.
//!
//! OCR engines introduce artefacts that are invisible to a reader but
//! break exact-string parsing: Windows line endings, zero-width spaces and
//! soft hyphens inside words, trailing whitespace that survives a trim of
//! the wrong side. The rules here are cheap, pure string passes applied to
//! the aggregated text before it reaches the key-value parser. The
//! aggregated `full_text` itself is left untouched — normalisation feeds
//! parsing only.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all normalisation rules, in order: line endings first so the
/// per-line passes see clean input.
pub fn normalize_text(input: &str) -> String {
    let s = normalize_line_endings(input);
    let s = remove_invisible_chars(&s);
    trim_trailing_whitespace(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────

fn normalize_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip invisible Unicode ──────────────────────────────────────

// Zero-width spaces/joiners, BOM, word joiner, soft hyphen.
static RE_INVISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new("[\u{200B}\u{200C}\u{200D}\u{FEFF}\u{2060}\u{00AD}]").unwrap());

fn remove_invisible_chars(input: &str) -> String {
    RE_INVISIBLE.replace_all(input, "").to_string()
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────

static RE_TRAILING_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)[ \t]+$").unwrap());

fn trim_trailing_whitespace(input: &str) -> String {
    RE_TRAILING_WS.replace_all(input, "").to_string()
}
