//! Character-safe text clipping shared by capture, redaction and snapshots.

use std::borrow::Cow;

/// Marker appended when `omitted` characters were cut.
pub(crate) fn truncation_marker(omitted: usize) -> String {
    format!("\n[TRUNCATED {} chars]", omitted)
}

/// Keep the first `limit` characters of `text`, appending a truncation
/// marker with the number of characters cut.
pub(crate) fn truncate_with_marker(text: &str, limit: usize) -> Cow<'_, str> {
    match text.char_indices().nth(limit) {
        None => Cow::Borrowed(text),
        Some((idx, _)) => {
            let omitted = text[idx..].chars().count();
            Cow::Owned(format!("{}{}", &text[..idx], truncation_marker(omitted)))
        }
    }
}

/// Keep the first `limit` characters, appending `...[TRUNCATED]` when cut.
pub(crate) fn clip(text: &str, limit: usize) -> Cow<'_, str> {
    match text.char_indices().nth(limit) {
        None => Cow::Borrowed(text),
        Some((idx, _)) => Cow::Owned(format!("{}...[TRUNCATED]", &text[..idx])),
    }
}

/// First line of `text`, without its line terminator.
pub(crate) fn first_line(text: &str) -> &str {
    let line = text.split('\n').next().unwrap_or_default();
    line.strip_suffix('\r').unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_under_limit_borrows() {
        assert!(matches!(truncate_with_marker("short", 10), Cow::Borrowed("short")));
        assert!(matches!(truncate_with_marker("exact", 5), Cow::Borrowed("exact")));
    }

    #[test]
    fn test_truncate_counts_chars() {
        let text = "é".repeat(12);
        let out = truncate_with_marker(&text, 10);
        assert_eq!(out, format!("{}\n[TRUNCATED 2 chars]", "é".repeat(10)));
    }

    #[test]
    fn test_clip() {
        assert_eq!(clip("abc", 5), "abc");
        assert_eq!(clip("abcdef", 3), "abc...[TRUNCATED]");
    }

    #[test]
    fn test_first_line() {
        assert_eq!(first_line("one\r\ntwo"), "one");
        assert_eq!(first_line("one\ntwo"), "one");
        assert_eq!(first_line(""), "");
        assert_eq!(first_line("\nsecond"), "");
    }
}
