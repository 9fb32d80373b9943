//! Condition mode: boolean expressions built from comparison and
//! logical operators, with parentheses.

use crate::eval::{find_outside, Context};
use crate::{is_true, regexp};

/// Comparison operators, in precedence order. Longer forms come
/// before their prefixes so the scan can never split inside one.
const COMPARISONS: &[&str] = &[
    "=~", "!~", "==*", "!!*", "=*", "!*", "==-", "!!-", "=-", "!-", "==", "!=", "<=", "<", ">=",
    ">",
];

/// Evaluates `expr` as a condition, returning `"1"` or `"0"`.
pub(crate) fn eval_condition(ctx: &mut Context<'_>, expr: &str) -> String {
    if bool_result(ctx, expr.trim()) {
        "1".to_owned()
    } else {
        "0".to_owned()
    }
}

fn bool_result(ctx: &mut Context<'_>, expr: &str) -> bool {
    let expr = expr.trim();
    let prefix = ctx.prefix.clone();
    let suffix = ctx.suffix.clone();

    if let Some(pos) = find_outside(expr, "||", &prefix, &suffix) {
        let left = bool_result(ctx, &expr[..pos]);
        return left || bool_result(ctx, &expr[pos + 2..]);
    }
    if let Some(pos) = find_outside(expr, "&&", &prefix, &suffix) {
        let left = bool_result(ctx, &expr[..pos]);
        return left && bool_result(ctx, &expr[pos + 2..]);
    }

    // fully parenthesized sub-expression
    if expr.starts_with('(') && expr.ends_with(')') && matching_close(expr) == Some(expr.len() - 1)
    {
        return bool_result(ctx, &expr[1..expr.len() - 1]);
    }

    for op in COMPARISONS {
        if let Some(pos) = find_outside(expr, op, &prefix, &suffix) {
            let left = ctx.replace_vars(expr[..pos].trim());
            let right = ctx.replace_vars(expr[pos + op.len()..].trim());
            return compare(op, &left, &right);
        }
    }

    let value = ctx.replace_vars(expr);
    is_true(&value)
}

/// Position of the `)` closing the `(` at index 0, if any.
fn matching_close(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn compare(op: &str, left: &str, right: &str) -> bool {
    match op {
        "=~" => regexp::compile(right).is_some_and(|re| re.is_match(left)),
        "!~" => !regexp::compile(right).is_some_and(|re| re.is_match(left)),
        "==*" => mask_match(left, right, true),
        "!!*" => !mask_match(left, right, true),
        "=*" => mask_match(left, right, false),
        "!*" => !mask_match(left, right, false),
        "==-" => left.contains(right),
        "!!-" => !left.contains(right),
        "=-" => left.to_lowercase().contains(&right.to_lowercase()),
        "!-" => !left.to_lowercase().contains(&right.to_lowercase()),
        "==" => match both_numbers(left, right) {
            Some((a, b)) => (a - b).abs() < f64::EPSILON,
            None => left == right,
        },
        "!=" => match both_numbers(left, right) {
            Some((a, b)) => (a - b).abs() >= f64::EPSILON,
            None => left != right,
        },
        "<=" => ordered(left, right, |o| o != std::cmp::Ordering::Greater),
        "<" => ordered(left, right, |o| o == std::cmp::Ordering::Less),
        ">=" => ordered(left, right, |o| o != std::cmp::Ordering::Less),
        ">" => ordered(left, right, |o| o == std::cmp::Ordering::Greater),
        _ => false,
    }
}

fn both_numbers(left: &str, right: &str) -> Option<(f64, f64)> {
    let a: f64 = left.trim().parse().ok()?;
    let b: f64 = right.trim().parse().ok()?;
    Some((a, b))
}

fn ordered(left: &str, right: &str, check: impl Fn(std::cmp::Ordering) -> bool) -> bool {
    let ordering = match both_numbers(left, right) {
        Some((a, b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
        None => left.cmp(right),
    };
    check(ordering)
}

/// Wildcard match where `*` in the mask matches any run of characters.
fn mask_match(value: &str, mask: &str, case_sensitive: bool) -> bool {
    let (value, mask) = if case_sensitive {
        (value.to_owned(), mask.to_owned())
    } else {
        (value.to_lowercase(), mask.to_lowercase())
    };
    wildcard(&value, &mask)
}

fn wildcard(value: &str, mask: &str) -> bool {
    match mask.find('*') {
        None => value == mask,
        Some(pos) => {
            let (head, rest) = mask.split_at(pos);
            let rest = &rest[1..];
            if !value.starts_with(head) {
                return false;
            }
            let tail = &value[head.len()..];
            if rest.is_empty() {
                return true;
            }
            (0..=tail.len())
                .filter(|i| tail.is_char_boundary(*i))
                .any(|i| wildcard(&tail[i..], rest))
        }
    }
}
