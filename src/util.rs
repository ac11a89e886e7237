//! Shared utility functions

use std::borrow::Cow;

/// Shorten `s` to at most `max_bytes` for log output, marking the cut
///
/// The cut lands on a UTF-8 character boundary at or before `max_bytes`;
/// an ellipsis is appended when anything was removed.
///
/// # Examples
///
/// ```
/// use gemini_inspector::util::preview;
///
/// assert_eq!(preview("short", 10), "short");
/// assert_eq!(preview("hello world", 5), "hello…");
///
/// // "日" is 3 bytes, so a 4-byte budget keeps one character
/// assert_eq!(preview("日本語", 4), "日…");
/// ```
pub fn preview(s: &str, max_bytes: usize) -> Cow<'_, str> {
    if s.len() <= max_bytes {
        return Cow::Borrowed(s);
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    Cow::Owned(format!("{}…", &s[..end]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_unchanged_when_short() {
        assert!(matches!(preview("hello", 5), Cow::Borrowed("hello")));
    }

    #[test]
    fn test_preview_multibyte_boundary() {
        assert_eq!(preview("日本語", 6), "日本…");
        assert_eq!(preview("日本語", 2), "…");
    }

    #[test]
    fn test_preview_zero_budget() {
        assert_eq!(preview("hello", 0), "…");
        assert_eq!(preview("", 0), "");
    }
}
