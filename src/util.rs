//! Shared utility functions

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Fit a string into `columns` terminal cells, ending in `…` when cut
///
/// Uses display width, so wide CJK characters and emoji count double.
///
/// # Examples
///
/// ```
/// use viewport::util::fit_width;
///
/// assert_eq!(fit_width("hello world", 5), "hell…");
/// assert_eq!(fit_width("日本語", 4), "日…");
/// ```
pub fn fit_width(s: &str, columns: usize) -> String {
    if s.width() <= columns {
        return s.to_string();
    }
    let target = columns.saturating_sub(1);
    let mut width = 0;
    let mut cut = 0;
    for (i, c) in s.char_indices() {
        let w = c.width().unwrap_or(0);
        if width + w > target {
            break;
        }
        width += w;
        cut = i + c.len_utf8();
    }
    let mut out = s[..cut].to_string();
    if columns > 0 {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_width_ascii() {
        assert_eq!(fit_width("subject", 10), "subject");
        assert_eq!(fit_width("long subject line", 8), "long su…");
        assert_eq!(fit_width("abc", 0), "");
    }

    #[test]
    fn test_fit_width_counts_wide_chars_double() {
        // 2 columns each; 5 columns leave room for two of them plus the ellipsis
        assert_eq!(fit_width("日本語です", 5), "日本…");
    }
}
