//! Attachment name → object key.
//!
//! The base name is slugified; the trailing extension is kept verbatim.

use std::sync::LazyLock;

use deunicode::deunicode;
use regex::Regex;

/// Used when nothing of the base name survives slugification.
const FALLBACK_BASE: &str = "file";

static NON_ALNUM_RUN: LazyLock<Regex> = LazyLock::new(|| {
    // Static pattern, always valid.
    Regex::new(r"[^a-z0-9]+").unwrap()
});

/// Convert an attachment file name into a URL-safe object key.
///
/// Non-ASCII letters are transliterated, so `"Tú hablas también?.png"` →
/// `"tu-hablas-tambien.png"` and `"Привет.pdf"` → `"privet.pdf"`.
pub fn sanitize(name: &str) -> String {
    let (base, ext) = split_extension(name);
    let mut key = slugify(base);
    if key.is_empty() {
        key.push_str(FALLBACK_BASE);
    }
    key.push_str(ext);
    key
}

/// Split off the extension: from the last `.` of the final path segment.
fn split_extension(name: &str) -> (&str, &str) {
    let segment_start = name.rfind(['/', '\\']).map_or(0, |i| i + 1);
    match name[segment_start..].rfind('.') {
        Some(i) => name.split_at(segment_start + i),
        None => (name, ""),
    }
}

fn slugify(s: &str) -> String {
    let folded = deunicode(s).to_lowercase();
    NON_ALNUM_RUN
        .replace_all(&folded, "-")
        .trim_matches('-')
        .to_string()
}
