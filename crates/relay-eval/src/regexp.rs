//! Regex compilation (with the legacy flag prefix) and the
//! replace-all machinery binding `${re:...}` references.

use regex::Regex;

use crate::eval::Context;

/// Match state exposed through `${re:N}`, `${re:+}`, `${re:#}` and
/// `${re:repl_index}` while a replacement is being evaluated.
pub(crate) struct RegexState {
    groups: Vec<String>,
    pub(crate) last_match: usize,
    pub(crate) repl_index: usize,
}

impl RegexState {
    pub(crate) fn group(&self, index: usize) -> &str {
        self.groups.get(index).map_or("", String::as_str)
    }
}

/// Compiles a pattern, translating a leading `(?eins-eins)` flag
/// group: `i` → case-insensitive, `n` → newline-sensitive anchors;
/// `e` and `s` have no equivalent here and are accepted as no-ops.
pub(crate) fn compile(pattern: &str) -> Option<Regex> {
    let mut insensitive = false;
    let mut multi_line = false;
    let mut pattern = pattern;
    if let Some(rest) = pattern.strip_prefix("(?") {
        if let Some(end) = rest.find(')') {
            let flags = &rest[..end];
            if flags
                .chars()
                .all(|c| matches!(c, 'e' | 'i' | 'n' | 's' | '-'))
            {
                let mut negate = false;
                for c in flags.chars() {
                    match c {
                        '-' => negate = true,
                        'i' => insensitive = !negate,
                        'n' => multi_line = !negate,
                        _ => {}
                    }
                }
                pattern = &rest[end + 1..];
            }
        }
    }
    let mut translated = String::new();
    if insensitive {
        translated.push_str("(?i)");
    }
    if multi_line {
        translated.push_str("(?m)");
    }
    translated.push_str(pattern);
    Regex::new(&translated).ok()
}

/// Replaces every non-empty match of `pattern` in `subject`,
/// evaluating `replace` once per match with the match groups bound.
/// A pattern that does not compile leaves the subject untouched.
pub(crate) fn replace_all(
    ctx: &mut Context<'_>,
    subject: &str,
    pattern: &str,
    replace: &str,
    start_index: usize,
) -> String {
    let Some(re) = compile(pattern) else {
        return subject.to_owned();
    };
    let mut out = String::with_capacity(subject.len());
    let mut pos = 0usize;
    let mut repl_index = start_index.max(1);
    while pos <= subject.len() {
        let Some(caps) = re.captures(&subject[pos..]) else {
            break;
        };
        let whole = caps.get(0).expect("group 0 always present");
        if whole.range().is_empty() {
            break;
        }
        out.push_str(&subject[pos..pos + whole.start()]);

        let groups: Vec<String> = (0..caps.len())
            .map(|i| caps.get(i).map_or_else(String::new, |m| m.as_str().to_owned()))
            .collect();
        let last_match = (0..caps.len())
            .rev()
            .find(|&i| caps.get(i).is_some())
            .unwrap_or(0);
        ctx.regex_state = Some(RegexState {
            groups,
            last_match,
            repl_index,
        });
        let replaced = ctx.replace_vars(replace);
        out.push_str(&replaced);

        pos += whole.end();
        repl_index += 1;
    }
    out.push_str(&subject[pos..]);
    ctx.regex_state = None;
    out
}
