//! Core `${...}` substitution and the transform catalog.

use std::collections::HashMap;
use std::fmt::Write as _;

use rand::Rng;
use relay_text::{
    base_decode, base_encode, color_code, convert_escaped_chars, cut, cut_screen, hide, length,
    length_screen, repeat, reverse, reverse_screen, split_shell, split_with_options, Base,
    SplitOptions,
};

use crate::bindings::HostBindings;
use crate::regexp::{self, RegexState};
use crate::{calc, condition, is_true};

/// Hard ceiling on nested evaluations; past it, text is kept literal.
pub(crate) const RECURSION_MAX: u32 = 32;

/// Markers wrapping `${hl:...}` / `${raw_hl:...}` output.
const SYNTAX_HL_INC: &str = "\u{ffff}\u{ffff}+";
const SYNTAX_HL_DEC: &str = "\u{ffff}\u{ffff}-";

/// Options for one top-level evaluation, mirroring the recognized
/// option set of the expression engine.
pub struct EvalOptions {
    /// Named roots usable in data-path lookups.
    pub pointers: HashMap<String, String>,
    /// Caller-supplied variables, looked up by plain name.
    pub extra_vars: HashMap<String, String>,
    /// Evaluate extra variable values themselves before use.
    pub extra_vars_eval: bool,
    pub prefix: String,
    pub suffix: String,
    /// Evaluate the whole expression in condition mode.
    pub condition: bool,
    /// When set (with `regex_replace`), the expression is a subject
    /// string and every non-empty match is replaced.
    pub regex: Option<String>,
    pub regex_replace: Option<String>,
    /// Starting value of `${re:repl_index}` (1-based).
    pub regex_replacement_index: usize,
    /// 0 = off, 1 = trace, 2 = verbose trace.
    pub debug: u8,
    /// Pretty-printed trace, filled when `debug > 0`.
    pub debug_output: String,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            pointers: HashMap::new(),
            extra_vars: HashMap::new(),
            extra_vars_eval: false,
            prefix: "${".to_owned(),
            suffix: "}".to_owned(),
            condition: false,
            regex: None,
            regex_replace: None,
            regex_replacement_index: 1,
            debug: 0,
            debug_output: String::new(),
        }
    }
}

/// Evaluates an expression, replacing every `${...}` substitution.
///
/// Missing variables are kept verbatim (`${unknown}` stays as-is); an
/// unterminated prefix keeps the rest of the source untouched.
pub fn eval_expression(
    expr: &str,
    bindings: &dyn HostBindings,
    options: &mut EvalOptions,
) -> String {
    let mut ctx = Context {
        bindings,
        pointers: options.pointers.clone(),
        extra_vars: options.extra_vars.clone(),
        extra_vars_eval: options.extra_vars_eval,
        prefix: options.prefix.clone(),
        suffix: options.suffix.clone(),
        user_vars: HashMap::new(),
        regex_state: None,
        recursion: 0,
        debug_level: options.debug,
        debug_depth: 0,
        debug_id: 0,
        debug_output: String::new(),
    };

    let result = if let (Some(pattern), Some(replace)) =
        (options.regex.as_deref(), options.regex_replace.as_deref())
    {
        regexp::replace_all(
            &mut ctx,
            expr,
            pattern,
            replace,
            options.regex_replacement_index,
        )
    } else if options.condition {
        condition::eval_condition(&mut ctx, expr)
    } else {
        ctx.replace_vars(expr)
    };

    if options.debug > 0 {
        options.debug_output = ctx.debug_output;
    }
    result
}

/// Evaluates with default options and no condition mode.
pub fn eval_simple(expr: &str, bindings: &dyn HostBindings) -> String {
    eval_expression(expr, bindings, &mut EvalOptions::default())
}

pub(crate) struct Context<'a> {
    pub(crate) bindings: &'a dyn HostBindings,
    pub(crate) pointers: HashMap<String, String>,
    pub(crate) extra_vars: HashMap<String, String>,
    pub(crate) extra_vars_eval: bool,
    pub(crate) prefix: String,
    pub(crate) suffix: String,
    pub(crate) user_vars: HashMap<String, String>,
    pub(crate) regex_state: Option<RegexState>,
    pub(crate) recursion: u32,
    debug_level: u8,
    debug_depth: u32,
    debug_id: u32,
    debug_output: String,
}

impl Context<'_> {
    /// Replaces every top-level `${...}` in `s`, recursing into bodies.
    pub(crate) fn replace_vars(&mut self, s: &str) -> String {
        if self.recursion >= RECURSION_MAX {
            return s.to_owned();
        }
        self.recursion += 1;
        let result = self.replace_vars_inner(s);
        self.recursion -= 1;
        result
    }

    fn replace_vars_inner(&mut self, s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        let mut rest = s;
        while let Some(start) = rest.find(&self.prefix) {
            out.push_str(&rest[..start]);
            let after_prefix = &rest[start + self.prefix.len()..];
            match self.find_matching_suffix(after_prefix) {
                Some(end) => {
                    let body = &after_prefix[..end];
                    let value = self.replace_cb(body);
                    out.push_str(&value);
                    rest = &after_prefix[end + self.suffix.len()..];
                }
                None => {
                    // unterminated substitution: keep the rest verbatim
                    out.push_str(&rest[start..]);
                    return out;
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Finds the suffix matching one already-consumed prefix,
    /// accounting for nested prefix/suffix pairs.
    fn find_matching_suffix(&self, s: &str) -> Option<usize> {
        let mut depth = 1usize;
        let mut pos = 0usize;
        while pos < s.len() {
            let rest = &s[pos..];
            if rest.starts_with(&self.prefix) {
                depth += 1;
                pos += self.prefix.len();
            } else if rest.starts_with(&self.suffix) {
                depth -= 1;
                if depth == 0 {
                    return Some(pos);
                }
                pos += self.suffix.len();
            } else {
                pos += rest.chars().next().map_or(1, char::len_utf8);
            }
        }
        None
    }

    fn replace_cb(&mut self, body: &str) -> String {
        let id = self.debug_id;
        if self.debug_level > 0 {
            self.debug_id += 1;
            let indent = "  ".repeat(self.debug_depth as usize);
            let _ = writeln!(self.debug_output, "{indent}{id}:eval(\"{body}\")");
            self.debug_depth += 1;
        }
        let result = self.dispatch(body);
        if self.debug_level > 0 {
            self.debug_depth -= 1;
            let indent = "  ".repeat(self.debug_depth as usize);
            let _ = writeln!(self.debug_output, "{indent}{id}:== \"{result}\"");
        }
        result
    }

    #[allow(clippy::too_many_lines)]
    fn dispatch(&mut self, body: &str) -> String {
        // ${\n}, ${\x41}, ...
        if body.starts_with('\\') {
            return convert_escaped_chars(body);
        }
        if let Some(value) = self.user_vars.get(body) {
            return value.clone();
        }
        if let Some(arg) = body.strip_prefix("esc:") {
            return convert_escaped_chars(arg);
        }
        if let Some(arg) = body.strip_prefix("chars:") {
            let arg = self.replace_vars(arg);
            return expand_char_class(&arg);
        }
        if let Some(arg) = body.strip_prefix("lower:") {
            return self.replace_vars(arg).to_lowercase();
        }
        if let Some(arg) = body.strip_prefix("upper:") {
            return self.replace_vars(arg).to_uppercase();
        }
        if let Some(arg) = body.strip_prefix("hide:") {
            let arg = self.replace_vars(arg);
            let mut parts = arg.splitn(2, ',');
            let hide_char = parts.next().unwrap_or("");
            let text = parts.next().unwrap_or("");
            return hide(hide_char, text);
        }
        if let Some(arg) = body.strip_prefix("cut:") {
            return self.transform_cut(arg, false);
        }
        if let Some(arg) = body.strip_prefix("cutscr:") {
            return self.transform_cut(arg, true);
        }
        if let Some(arg) = body.strip_prefix("rev:") {
            return reverse(&self.replace_vars(arg));
        }
        if let Some(arg) = body.strip_prefix("revscr:") {
            return reverse_screen(&self.replace_vars(arg));
        }
        if let Some(arg) = body.strip_prefix("repeat:") {
            let arg = self.replace_vars(arg);
            let mut parts = arg.splitn(2, ',');
            let count: i64 = parts.next().unwrap_or("").trim().parse().unwrap_or(0);
            return repeat(parts.next().unwrap_or(""), count);
        }
        if let Some(arg) = body.strip_prefix("length:") {
            return length(&self.replace_vars(arg)).to_string();
        }
        if let Some(arg) = body.strip_prefix("lengthscr:") {
            return length_screen(&self.replace_vars(arg)).to_string();
        }
        if let Some(arg) = body.strip_prefix("split:") {
            return self.transform_split(arg);
        }
        if let Some(arg) = body.strip_prefix("split_shell:") {
            return self.transform_split_shell(arg);
        }
        if let Some(arg) = body.strip_prefix("re:") {
            return self.transform_regex_ref(arg);
        }
        if let Some(arg) = body.strip_prefix("base_encode:") {
            let arg = self.replace_vars(arg);
            let mut parts = arg.splitn(2, ',');
            let base = Base::from_selector(parts.next().unwrap_or(""));
            let data = parts.next().unwrap_or("");
            return base.map_or_else(String::new, |b| base_encode(b, data.as_bytes()));
        }
        if let Some(arg) = body.strip_prefix("base_decode:") {
            let arg = self.replace_vars(arg);
            let mut parts = arg.splitn(2, ',');
            let base = Base::from_selector(parts.next().unwrap_or(""));
            let data = parts.next().unwrap_or("");
            return base
                .and_then(|b| base_decode(b, data).ok())
                .map_or_else(String::new, |bytes| {
                    String::from_utf8_lossy(&bytes).into_owned()
                });
        }
        if body == "date" {
            return format_date("%F %T");
        }
        if let Some(fmt) = body.strip_prefix("date:") {
            return format_date(fmt);
        }
        if let Some(arg) = body.strip_prefix("if:") {
            return self.transform_if(arg);
        }
        if let Some(arg) = body.strip_prefix("calc:") {
            let arg = self.replace_vars(arg);
            return calc::calc(&arg);
        }
        if let Some(arg) = body.strip_prefix("random:") {
            let arg = self.replace_vars(arg);
            let mut parts = arg.splitn(2, ',');
            let min: i64 = parts.next().unwrap_or("").trim().parse().unwrap_or(0);
            let max: i64 = parts.next().unwrap_or("").trim().parse().unwrap_or(0);
            if min > max {
                return "0".to_owned();
            }
            return rand::thread_rng().gen_range(min..=max).to_string();
        }
        if let Some(arg) = body.strip_prefix("translate:") {
            let arg = self.replace_vars(arg);
            return self.bindings.translate(&arg);
        }
        if let Some(arg) = body.strip_prefix("define:") {
            let mut parts = arg.splitn(2, ',');
            let name = parts.next().unwrap_or("").to_owned();
            let value = self.replace_vars(parts.next().unwrap_or(""));
            self.user_vars.insert(name, value);
            return String::new();
        }
        if let Some(arg) = body.strip_prefix("color:") {
            let arg = self.replace_vars(arg);
            return color_code(&arg);
        }
        if let Some(arg) = body.strip_prefix("modifier:") {
            let arg = self.replace_vars(arg);
            let mut parts = arg.splitn(3, ',');
            let name = parts.next().unwrap_or("");
            let data = parts.next().unwrap_or("");
            let text = parts.next().unwrap_or("");
            return self
                .bindings
                .modifier_exec(name, data, text)
                .unwrap_or_default();
        }
        if let Some(arg) = body.strip_prefix("info:") {
            let arg = self.replace_vars(arg);
            let mut parts = arg.splitn(2, ',');
            let name = parts.next().unwrap_or("");
            return self
                .bindings
                .info(name, parts.next())
                .unwrap_or_default();
        }
        if let Some(name) = body.strip_prefix("env:") {
            return std::env::var(name).unwrap_or_default();
        }
        if let Some(arg) = body.strip_prefix("eval:") {
            let once = self.replace_vars(arg);
            return self.replace_vars(&once);
        }
        if let Some(arg) = body.strip_prefix("eval_cond:") {
            let once = self.replace_vars(arg);
            return condition::eval_condition(self, &once);
        }
        if let Some(arg) = body.strip_prefix("raw:") {
            return arg.to_owned();
        }
        if let Some(arg) = body.strip_prefix("raw_hl:") {
            return format!("{SYNTAX_HL_INC}{arg}{SYNTAX_HL_DEC}");
        }
        if let Some(arg) = body.strip_prefix("hl:") {
            let arg = self.replace_vars(arg);
            return format!("{SYNTAX_HL_INC}{arg}{SYNTAX_HL_DEC}");
        }
        if let Some(key) = body.strip_prefix("sec.data.") {
            return self.bindings.secured_data(key).unwrap_or_default();
        }
        if let Some(value) = self.extra_vars.get(body).cloned() {
            if self.extra_vars_eval {
                return self.replace_vars(&value);
            }
            return value;
        }
        if body.contains('.') {
            if let Some(value) = self.bindings.config_option(body) {
                return value;
            }
        }
        if let Some(value) = self.bindings.data_path(&self.pointers, body) {
            return value;
        }
        // unknown variable: keep the substitution verbatim
        format!("{}{}{}", self.prefix, body, self.suffix)
    }

    fn transform_cut(&mut self, arg: &str, screen: bool) -> String {
        let arg = self.replace_vars(arg);
        let mut parts = arg.splitn(3, ',');
        let mut count_spec = parts.next().unwrap_or("").trim();
        let suffix = parts.next().unwrap_or("");
        let text = parts.next().unwrap_or("");
        let count_suffix = count_spec.starts_with('+');
        if count_suffix {
            count_spec = &count_spec[1..];
        }
        let max: usize = count_spec.parse().unwrap_or(0);
        if screen {
            cut_screen(text, max, count_suffix, suffix)
        } else {
            cut(text, max, count_suffix, suffix)
        }
    }

    fn transform_split(&mut self, arg: &str) -> String {
        let arg = self.replace_vars(arg);
        let mut parts = arg.splitn(4, ',');
        let selector = parts.next().unwrap_or("").trim().to_owned();
        let mut separators = parts.next().unwrap_or("").to_owned();
        let flags = parts.next().unwrap_or("");
        let text = parts.next().unwrap_or("");
        if separators.is_empty() {
            separators = " ".to_owned();
        }
        let items = split_with_options(text, &separators, &SplitOptions::parse(flags));
        select_item(&selector, &items)
    }

    fn transform_split_shell(&mut self, arg: &str) -> String {
        let arg = self.replace_vars(arg);
        let mut parts = arg.splitn(2, ',');
        let selector = parts.next().unwrap_or("").trim().to_owned();
        let items = split_shell(parts.next().unwrap_or(""));
        select_item(&selector, &items)
    }

    fn transform_regex_ref(&mut self, arg: &str) -> String {
        if arg == "repl_index" {
            return self
                .regex_state
                .as_ref()
                .map_or_else(String::new, |state| state.repl_index.to_string());
        }
        let Some(state) = self.regex_state.as_ref() else {
            return String::new();
        };
        if arg == "#" {
            return state.last_match.to_string();
        }
        if arg == "+" {
            return state.group(state.last_match).to_owned();
        }
        // ${re:.cN}: group N with every grapheme replaced by `c`
        if let Some(rest) = arg.strip_prefix('.') {
            let mut chars = rest.chars();
            let hide_char = chars.next().map(String::from).unwrap_or_default();
            let group_spec = chars.as_str().trim_start_matches('+');
            let group = if group_spec.is_empty() {
                state.last_match
            } else {
                match group_spec.parse() {
                    Ok(n) => n,
                    Err(_) => return String::new(),
                }
            };
            let text = state.group(group).to_owned();
            return hide(&hide_char, &text);
        }
        match arg.parse::<usize>() {
            Ok(n) => state.group(n).to_owned(),
            Err(_) => String::new(),
        }
    }

    fn transform_if(&mut self, arg: &str) -> String {
        let (cond, branches) = match find_outside(arg, "?", &self.prefix, &self.suffix) {
            Some(pos) => (&arg[..pos], Some(&arg[pos + 1..])),
            None => (arg, None),
        };
        let truth = is_true(&condition::eval_condition(self, cond));
        match branches {
            None => {
                if truth {
                    "1".to_owned()
                } else {
                    "0".to_owned()
                }
            }
            Some(rest) => {
                let (then_branch, else_branch) =
                    match find_outside(rest, ":", &self.prefix, &self.suffix) {
                        Some(pos) => (&rest[..pos], &rest[pos + 1..]),
                        None => (rest, ""),
                    };
                if truth {
                    self.replace_vars(then_branch)
                } else {
                    self.replace_vars(else_branch)
                }
            }
        }
    }
}

fn select_item(selector: &str, items: &[String]) -> String {
    match selector {
        "count" => items.len().to_string(),
        "random" => {
            if items.is_empty() {
                String::new()
            } else {
                items[rand::thread_rng().gen_range(0..items.len())].clone()
            }
        }
        _ => {
            let index: i64 = match selector.parse() {
                Ok(n) => n,
                Err(_) => return String::new(),
            };
            let len = items.len() as i64;
            let resolved = if index < 0 { len + index + 1 } else { index };
            if resolved >= 1 && resolved <= len {
                items[(resolved - 1) as usize].clone()
            } else {
                String::new()
            }
        }
    }
}

fn format_date(fmt: &str) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    if write!(out, "{}", chrono::Local::now().format(fmt)).is_err() {
        return String::new();
    }
    out
}

/// Expands `chars:CLASS` (named classes or a `c1-c2` codepoint range).
fn expand_char_class(class: &str) -> String {
    const DIGIT: &str = "0123456789";
    const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
    const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    match class {
        "digit" => DIGIT.to_owned(),
        "xdigit" => format!("{DIGIT}abcdefABCDEF"),
        "lower" => LOWER.to_owned(),
        "upper" => UPPER.to_owned(),
        "alpha" => format!("{LOWER}{UPPER}"),
        "alnum" => format!("{LOWER}{UPPER}{DIGIT}"),
        _ => {
            let mut parts = class.splitn(2, '-');
            let (Some(from), Some(to)) = (
                parts.next().and_then(|s| s.chars().next()),
                parts.next().and_then(|s| s.chars().next()),
            ) else {
                return String::new();
            };
            let (from, to) = (from as u32, to as u32);
            if from > to {
                return String::new();
            }
            (from..=to).filter_map(char::from_u32).collect()
        }
    }
}

/// Finds the first occurrence of `needle` outside any nested
/// `prefix...suffix` pair and outside double quotes.
pub(crate) fn find_outside(s: &str, needle: &str, prefix: &str, suffix: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut parens = 0usize;
    let mut in_quotes = false;
    let mut pos = 0usize;
    while pos < s.len() {
        let rest = &s[pos..];
        if in_quotes {
            if rest.starts_with('"') {
                in_quotes = false;
            }
            pos += rest.chars().next().map_or(1, char::len_utf8);
            continue;
        }
        if rest.starts_with(prefix) {
            depth += 1;
            pos += prefix.len();
            continue;
        }
        if depth > 0 && rest.starts_with(suffix) {
            depth -= 1;
            pos += suffix.len();
            continue;
        }
        if depth == 0 {
            if rest.starts_with('"') {
                in_quotes = true;
                pos += 1;
                continue;
            }
            if rest.starts_with('(') {
                parens += 1;
                pos += 1;
                continue;
            }
            if rest.starts_with(')') {
                parens = parens.saturating_sub(1);
                pos += 1;
                continue;
            }
            if parens == 0 && rest.starts_with(needle) {
                return Some(pos);
            }
        }
        pos += rest.chars().next().map_or(1, char::len_utf8);
    }
    None
}
