// relay-eval: the `${...}` expression language used for credentials,
// path expansion, relay conditions and regex replacements.
//
// The evaluator itself is host-agnostic; anything that needs live
// state (info values, modifiers, secured data, config options, data
// paths) goes through the `HostBindings` trait.

mod bindings;
mod calc;
mod condition;
mod eval;
mod regexp;

pub use bindings::{HostBindings, NoHost};
pub use eval::{eval_expression, eval_simple, EvalOptions};

/// Truthiness rule shared by the condition mode and `${if:...}`:
/// a value is false iff it is empty, `"0"` or `"false"`.
pub fn is_true(value: &str) -> bool {
    !(value.is_empty() || value == "0" || value == "false")
}
