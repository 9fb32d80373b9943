//! Separator-based and shell-style string splitting.

/// Options for [`split_with_options`]. The flag set mirrors the
/// splitting modes the evaluator exposes.
#[derive(Debug, Default, Clone)]
pub struct SplitOptions {
    /// Strip leading separators before splitting.
    pub strip_left: bool,
    /// Strip trailing separators before splitting.
    pub strip_right: bool,
    /// Treat runs of separators as a single separator (no empty items).
    pub collapse_seps: bool,
    /// Each item extends to the end of the string instead of stopping
    /// at the next separator.
    pub keep_eol: bool,
    /// Characters stripped from both ends of every item.
    pub strip_items: Option<String>,
    /// Maximum number of items (0 = unlimited); extra content is
    /// dropped.
    pub max_items: usize,
}

impl SplitOptions {
    /// Parses a `+`-joined flag list, e.g.
    /// `"strip_left+collapse_seps+strip_items=_,+max_items=4"`.
    /// Unknown flags are ignored.
    pub fn parse(flags: &str) -> Self {
        let mut options = Self::default();
        for flag in flags.split('+') {
            match flag {
                "strip_left" => options.strip_left = true,
                "strip_right" => options.strip_right = true,
                "collapse_seps" => options.collapse_seps = true,
                "keep_eol" => options.keep_eol = true,
                _ => {
                    if let Some(chars) = flag.strip_prefix("strip_items=") {
                        options.strip_items = Some(chars.to_owned());
                    } else if let Some(n) = flag.strip_prefix("max_items=") {
                        options.max_items = n.parse().unwrap_or(0);
                    }
                }
            }
        }
        options
    }
}

/// Splits `s` on any character of `separators`, honoring `options`.
pub fn split_with_options(s: &str, separators: &str, options: &SplitOptions) -> Vec<String> {
    let is_sep = |c: char| separators.contains(c);

    let mut work = s;
    if options.strip_left {
        work = work.trim_start_matches(is_sep);
    }
    if options.strip_right {
        work = work.trim_end_matches(is_sep);
    }
    if work.is_empty() {
        return Vec::new();
    }

    let mut items: Vec<String> = Vec::new();
    let mut start = 0;
    let mut indices = work.char_indices().peekable();
    while let Some((i, c)) = indices.next() {
        if !is_sep(c) {
            continue;
        }
        let end_of_sep = indices.peek().map_or(work.len(), |&(j, _)| j);
        if options.collapse_seps && i == start {
            // consecutive separator: move the item start forward
            start = end_of_sep;
            continue;
        }
        let item = if options.keep_eol {
            &work[start..]
        } else {
            &work[start..i]
        };
        items.push(item.to_owned());
        start = end_of_sep;
        if options.max_items > 0 && items.len() >= options.max_items {
            start = work.len();
            break;
        }
    }
    let capped = options.max_items > 0 && items.len() >= options.max_items;
    let trailing_empty = start == work.len() && !options.collapse_seps && !items.is_empty();
    if !capped && (start < work.len() || trailing_empty) {
        items.push(work[start..].to_owned());
    }

    if let Some(strip) = &options.strip_items {
        let strip_set: Vec<char> = strip.chars().collect();
        for item in &mut items {
            *item = item
                .trim_matches(|c| strip_set.contains(&c))
                .to_owned();
        }
    }
    items
}

/// Splits a string like a POSIX shell word splitter: whitespace
/// separates words, single quotes are literal, double quotes allow
/// backslash escapes, a backslash outside quotes escapes the next
/// character.
pub fn split_shell(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '"' => {
                in_word = true;
                while let Some(q) = chars.next() {
                    match q {
                        '"' => break,
                        '\\' => {
                            if let Some(&next) = chars.peek() {
                                if next == '"' || next == '\\' {
                                    current.push(next);
                                    chars.next();
                                } else {
                                    current.push('\\');
                                }
                            }
                        }
                        other => current.push(other),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            other => {
                in_word = true;
                current.push(other);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

/// Joins items with a separator.
pub fn join(separator: &str, items: &[impl AsRef<str>]) -> String {
    items
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_default(s: &str, seps: &str) -> Vec<String> {
        split_with_options(
            s,
            seps,
            &SplitOptions {
                strip_left: true,
                strip_right: true,
                collapse_seps: true,
                ..SplitOptions::default()
            },
        )
    }

    #[test]
    fn split_collapses_and_strips() {
        assert_eq!(split_default("  a  b   c ", " "), vec!["a", "b", "c"]);
        assert_eq!(split_default("", " "), Vec::<String>::new());
        assert_eq!(split_default("   ", " "), Vec::<String>::new());
    }

    #[test]
    fn split_without_collapse_keeps_empty_items() {
        let items = split_with_options("a,,b", ",", &SplitOptions::default());
        assert_eq!(items, vec!["a", "", "b"]);
    }

    #[test]
    fn split_keep_eol_extends_items() {
        let options = SplitOptions {
            keep_eol: true,
            collapse_seps: true,
            ..SplitOptions::default()
        };
        assert_eq!(
            split_with_options("a b c", " ", &options),
            vec!["a b c", "b c", "c"]
        );
    }

    #[test]
    fn split_max_items_drops_the_rest() {
        let options = SplitOptions {
            collapse_seps: true,
            max_items: 2,
            ..SplitOptions::default()
        };
        assert_eq!(split_with_options("a b c d", " ", &options), vec!["a", "b"]);
    }

    #[test]
    fn split_strip_items_trims_each_item() {
        let options = SplitOptions {
            collapse_seps: true,
            strip_items: Some("_".to_owned()),
            ..SplitOptions::default()
        };
        assert_eq!(
            split_with_options("_a_ __b__", " ", &options),
            vec!["a", "b"]
        );
    }

    #[test]
    fn flags_parsing() {
        let options = SplitOptions::parse("strip_left+strip_right+max_items=3+strip_items=xy");
        assert!(options.strip_left);
        assert!(options.strip_right);
        assert!(!options.collapse_seps);
        assert_eq!(options.max_items, 3);
        assert_eq!(options.strip_items.as_deref(), Some("xy"));
    }

    #[test]
    fn shell_split_quotes_and_escapes() {
        assert_eq!(split_shell("a b c"), vec!["a", "b", "c"]);
        assert_eq!(split_shell("'a b' c"), vec!["a b", "c"]);
        assert_eq!(split_shell(r#""a \"b\"" c"#), vec![r#"a "b""#, "c"]);
        assert_eq!(split_shell(r"a\ b"), vec!["a b"]);
        assert_eq!(split_shell(""), Vec::<String>::new());
        assert_eq!(split_shell("''"), vec![""]);
    }

    #[test]
    fn join_round_trip() {
        assert_eq!(join(",", &["a", "b", "c"]), "a,b,c");
        assert_eq!(join(",", &Vec::<String>::new()), "");
    }
}
