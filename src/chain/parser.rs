//! Operator detection for chain expressions
//!
//! Deliberately a substring dispatcher, not a tokenizer: operator characters
//! inside quoted arguments are not recognized as data. This is a documented
//! limitation of the engine. The function is the single seam where a real
//! tokenizer could be swapped in without touching the execution strategies.

/// One parse step over a chain expression.
///
/// Operators are matched in priority order; the sub-expressions in each
/// variant are re-dispatched recursively, so an AND branch may itself
/// contain a pipe, and so on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChainOp {
    /// `cmd &`: run detached, do not wait
    Background(String),
    /// `a; b; c`: run all in order regardless of outcomes
    Sequential(Vec<String>),
    /// `a || b`: stop at first success
    Or(Vec<String>),
    /// `a && b`: stop at first failure
    And(Vec<String>),
    /// `a | b`: stdout of each stage feeds the next stage's stdin
    Pipe(Vec<String>),
    /// No operators left
    Single(String),
}

/// Classify `expr` by its highest-priority operator.
pub(crate) fn parse(expr: &str) -> ChainOp {
    let expr = expr.trim();

    if let Some(stripped) = strip_background(expr) {
        return ChainOp::Background(stripped.to_string());
    }
    if expr.contains(';') {
        return ChainOp::Sequential(split_on(expr, ";"));
    }
    if expr.contains("||") {
        return ChainOp::Or(split_on(expr, "||"));
    }
    if expr.contains("&&") {
        return ChainOp::And(split_on(expr, "&&"));
    }
    if expr.contains('|') {
        return ChainOp::Pipe(split_on(expr, "|"));
    }
    ChainOp::Single(expr.to_string())
}

/// A lone trailing `&` marks a background chain; `&&` does not.
fn strip_background(expr: &str) -> Option<&str> {
    let stripped = expr.strip_suffix('&')?;
    if stripped.ends_with('&') {
        return None;
    }
    let stripped = stripped.trim_end();
    if stripped.is_empty() {
        return None;
    }
    Some(stripped)
}

fn split_on(expr: &str, op: &str) -> Vec<String> {
    expr.split(op)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
