//! Built-in library functions callable from passage logic.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::thread::ThreadContext;
use crate::schema::output::OutputKind;
use crate::schema::value::{flatten_spread, Value};

/// Positional parameter `index` (0-based) of the nearest enclosing embed.
///
/// Scans backward from the insertion point for the first embed marker.
/// When that marker carries too few parameters, or there is no marker at
/// all, the index itself comes back as a number. Callers rely on this.
pub fn parameter(ctx: &ThreadContext<'_>, index: usize) -> Value {
    let marker = ctx
        .output()
        .iter()
        .rev()
        .filter(|record| !record.removed)
        .find_map(|record| match &record.kind {
            OutputKind::Embed(marker) => Some(marker),
            _ => None,
        });
    marker
        .and_then(|marker| marker.parameters.get(index).cloned())
        .unwrap_or(Value::Number(index as f64))
}

/// A whole number between `min` and `max`, inclusive, in either order.
/// Void when either bound is not a finite number.
pub fn random(ctx: &mut ThreadContext<'_>, min: f64, max: f64) -> Value {
    if !min.is_finite() || !max.is_finite() {
        return Value::Void;
    }
    let (low, high) = if min <= max { (min, max) } else { (max, min) };
    let (low, high) = (low.trunc() as i64, high.trunc() as i64);
    Value::Number(ctx.rng().gen_range(low..=high) as f64)
}

/// One of `values`, picked at random. Spreads are flattened first.
pub fn either(ctx: &mut ThreadContext<'_>, values: Vec<Value>) -> Value {
    let values = flatten_spread(values);
    values.choose(ctx.rng()).cloned().unwrap_or(Value::Void)
}

pub fn shuffled(ctx: &mut ThreadContext<'_>, values: Vec<Value>) -> Value {
    let mut values = flatten_spread(values);
    values.shuffle(ctx.rng());
    Value::list(values)
}

/// Times `passage` has been entered, the current visit included.
pub fn visits(ctx: &ThreadContext<'_>, passage: &str) -> usize {
    ctx.history()
        .iter()
        .filter(|entry| entry.passage == passage)
        .count()
}

/// Names of previously visited passages, oldest first, without the
/// current one.
pub fn history(ctx: &ThreadContext<'_>) -> Value {
    let entries = ctx.history();
    let previous = entries.len().saturating_sub(1);
    Value::list(
        entries[..previous]
            .iter()
            .map(|entry| Value::text(entry.passage.as_str())),
    )
}

/// Every whole number from `a` to `b`, inclusive, ascending.
pub fn range(a: i64, b: i64) -> Value {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    Value::list((low..=high).map(|n| Value::Number(n as f64)))
}

/// `values` in ascending order: numbers before text, text lexically.
pub fn sorted(values: Vec<Value>) -> Value {
    let mut values = flatten_spread(values);
    values.sort_by(Value::total_cmp);
    Value::list(values)
}
