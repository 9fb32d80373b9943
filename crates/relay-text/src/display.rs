//! Grapheme- and screen-width-aware string operations.
//!
//! The `*_screen` variants count terminal display cells and skip color
//! tokens; the plain variants count grapheme clusters.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::color::{segments, Segment};

/// Number of grapheme clusters.
pub fn length(s: &str) -> usize {
    s.graphemes(true).count()
}

/// Number of display cells, color tokens excluded.
pub fn length_screen(s: &str) -> usize {
    segments(s)
        .iter()
        .map(|segment| match segment {
            Segment::Text(text) => UnicodeWidthStr::width(*text),
            Segment::Color(_) => 0,
        })
        .sum()
}

/// Truncates `s` to at most `max` grapheme clusters, appending `suffix`
/// if truncation occurred. When `count_suffix` is set, the suffix's own
/// grapheme count is included in the budget.
pub fn cut(s: &str, max: usize, count_suffix: bool, suffix: &str) -> String {
    let total = length(s);
    if total <= max {
        return s.to_owned();
    }
    let keep = if count_suffix {
        max.saturating_sub(length(suffix))
    } else {
        max
    };
    let mut out: String = s.graphemes(true).take(keep).collect();
    out.push_str(suffix);
    out
}

/// Like [`cut`] but the budget is display cells instead of graphemes.
pub fn cut_screen(s: &str, max: usize, count_suffix: bool, suffix: &str) -> String {
    if length_screen(s) <= max {
        return s.to_owned();
    }
    let budget = if count_suffix {
        max.saturating_sub(length_screen(suffix))
    } else {
        max
    };
    let mut out = String::new();
    let mut used = 0;
    'outer: for segment in segments(s) {
        match segment {
            Segment::Color(spec) => out.push_str(&crate::color::color_code(spec)),
            Segment::Text(text) => {
                for g in text.graphemes(true) {
                    let w = UnicodeWidthStr::width(g);
                    if used + w > budget {
                        break 'outer;
                    }
                    used += w;
                    out.push_str(g);
                }
            }
        }
    }
    out.push_str(suffix);
    out
}

/// Reverses grapheme clusters (color tokens are reversed along with
/// everything else, so use [`reverse_screen`] for colored strings).
pub fn reverse(s: &str) -> String {
    s.graphemes(true).rev().collect()
}

/// Reverses visible graphemes while keeping color tokens at their
/// original positions.
pub fn reverse_screen(s: &str) -> String {
    let parts = segments(s);
    let mut graphemes: Vec<&str> = parts
        .iter()
        .filter_map(|segment| match segment {
            Segment::Text(text) => Some(text.graphemes(true)),
            Segment::Color(_) => None,
        })
        .flatten()
        .collect();
    graphemes.reverse();
    let mut next = graphemes.into_iter();
    let mut out = String::with_capacity(s.len());
    for segment in parts {
        match segment {
            Segment::Color(spec) => out.push_str(&crate::color::color_code(spec)),
            Segment::Text(text) => {
                for _ in text.graphemes(true) {
                    if let Some(g) = next.next() {
                        out.push_str(g);
                    }
                }
            }
        }
    }
    out
}

/// `count` copies of `s`; zero or negative counts produce an empty
/// string.
pub fn repeat(s: &str, count: i64) -> String {
    if count <= 0 {
        return String::new();
    }
    s.repeat(usize::try_from(count).unwrap_or(0))
}

/// Replaces every grapheme of `s` with the hide character.
pub fn hide(hide_char: &str, s: &str) -> String {
    let first = hide_char.graphemes(true).next().unwrap_or("");
    first.repeat(length(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::color_code;

    #[test]
    fn length_counts_graphemes_not_bytes() {
        assert_eq!(length("noël"), 4);
        assert_eq!(length("e\u{301}"), 1);
        assert_eq!(length(""), 0);
    }

    #[test]
    fn length_screen_ignores_colors_and_counts_wide_chars() {
        let s = format!("{}日本", color_code("red"));
        assert_eq!(length_screen(&s), 4);
        assert_eq!(length_screen("abc"), 3);
    }

    #[test]
    fn cut_appends_suffix_only_when_truncating() {
        assert_eq!(cut("hello", 10, false, "…"), "hello");
        assert_eq!(cut("hello", 3, false, "+"), "hel+");
        // "+" counts the suffix inside the budget
        assert_eq!(cut("hello", 3, true, "+"), "he+");
    }

    #[test]
    fn cut_screen_budget_is_cells() {
        assert_eq!(cut_screen("日本語", 4, false, ""), "日本");
        assert_eq!(cut_screen("日本語", 5, false, ""), "日本");
    }

    #[test]
    fn reverse_variants() {
        assert_eq!(reverse("abc"), "cba");
        let colored = format!("a{}bc", color_code("red"));
        // color token stays between the first and second visible cell
        assert_eq!(reverse_screen(&colored), format!("c{}ba", color_code("red")));
    }

    #[test]
    fn repeat_and_hide() {
        assert_eq!(repeat("ab", 3), "ababab");
        assert_eq!(repeat("ab", 0), "");
        assert_eq!(repeat("ab", -2), "");
        assert_eq!(hide("*", "secret"), "******");
        assert_eq!(hide("*", "noël"), "****");
    }
}
