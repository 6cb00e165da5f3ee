//! Cell text sanitizing.
//!
//! Cached summaries are shown as markup by downstream readers, so every cell
//! is escaped. Rich-text cells keep a small allow-list of inline style tags
//! written without attributes; anything else, including an allowed tag that
//! carries attributes, stays escaped.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// The single line break marker emitted for every break variant.
pub const BREAK_MARKER: &str = "<br/>";

/// Inline style tags that survive sanitizing.
pub const ALLOWED_TAGS: [&str; 5] = ["b", "i", "u", "strong", "em"];

/// Inserted after sentence-ending punctuation in place of the whitespace run.
const SENTENCE_GAP: &str = "&#160; ";

static LINE_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\r\n|\r|\n|\x{2028}|\x{2029}|\\r\\n|\\n|\\r|<br\s*/?>")
        .expect("Invalid line break regex")
});

static ESCAPED_ALLOWED_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)&lt;(/?)(b|i|u|strong|em)&gt;").expect("Invalid allowed tag regex")
});

static SENTENCE_BOUNDARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([.!?])[ \t]+([^ \t\n])").expect("Invalid sentence boundary regex")
});

/// Collapse every break variant (CR, LF, CRLF, U+2028, U+2029, their
/// backslash-escaped spellings and `<br>` tags) into `\n`.
pub fn normalize_breaks(text: &str) -> String {
    LINE_BREAK.replace_all(text, "\n").into_owned()
}

/// Escape the five markup-significant characters.
pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Plain cell: everything escaped, breaks unified.
pub fn escape_plain(text: &str) -> String {
    let normalized = normalize_breaks(text.trim());
    escape_markup(&normalized).replace('\n', BREAK_MARKER)
}

/// Rich-text cell: escaped except for the allow-listed inline tags, breaks
/// unified, sentence boundaries widened.
pub fn sanitize_rich_text(text: &str) -> String {
    let normalized = normalize_breaks(text.trim());
    let escaped = escape_markup(&normalized);
    let restored = ESCAPED_ALLOWED_TAG.replace_all(&escaped, |caps: &Captures<'_>| {
        format!("<{}{}>", &caps[1], caps[2].to_ascii_lowercase())
    });
    let spaced = SENTENCE_BOUNDARY.replace_all(&restored, |caps: &Captures<'_>| {
        format!("{}{}{}", &caps[1], SENTENCE_GAP, &caps[2])
    });
    spaced.replace('\n', BREAK_MARKER)
}
