//! In-memory evaluation of a [`QuerySpec`] over scalar property maps.
//!
//! Used by the memory row store and by tests; SQL backends compile the
//! query instead but must agree with these semantics.

use crate::coerce::{to_datetime, to_decimal, to_float, to_int};
use crate::{Condition, FilterOperator, Predicate, QuerySpec, SortKey, TextMatch};
use serde_json::Value;
use std::cmp::Ordering;
use unitwork_model::{EntitySchema, Properties, ScalarType};

/// Looks up a property, following dotted paths into JSON objects.
pub fn lookup<'a>(row: &'a Properties, path: &str) -> &'a Value {
    let mut parts = path.split('.');
    let Some(head) = parts.next() else {
        return &Value::Null;
    };
    let mut current = row.value(head);
    for part in parts {
        current = current.get(part).unwrap_or(&Value::Null);
    }
    current
}

/// Orders two stored values of the given type. `None` when incomparable
/// (either side null, or mismatched kinds).
pub fn compare_values(scalar_type: Option<ScalarType>, a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    match scalar_type {
        Some(ScalarType::Int) => match (to_int(a), to_int(b)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => to_float(a)?.partial_cmp(&to_float(b)?),
        },
        Some(ScalarType::Float) => to_float(a)?.partial_cmp(&to_float(b)?),
        Some(ScalarType::Decimal) => Some(to_decimal(a)?.cmp(&to_decimal(b)?)),
        Some(ScalarType::DateTime) => Some(to_datetime(a)?.cmp(&to_datetime(b)?)),
        Some(ScalarType::Bool) => Some(a.as_bool()?.cmp(&b.as_bool()?)),
        Some(ScalarType::Uuid) => Some(a.as_str()?.to_lowercase().cmp(&b.as_str()?.to_lowercase())),
        Some(ScalarType::Enum(options)) => {
            let pos = |v: &Value| v.as_str().and_then(|s| options.iter().position(|o| *o == s));
            match (pos(a), pos(b)) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => Some(a.as_str()?.cmp(b.as_str()?)),
            }
        }
        _ => match (a, b) {
            (Value::Number(_), Value::Number(_)) => to_float(a)?.partial_cmp(&to_float(b)?),
            (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
            (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
            _ if a == b => Some(Ordering::Equal),
            _ => None,
        },
    }
}

fn equals(scalar_type: Option<ScalarType>, a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return a.is_null() && b.is_null();
    }
    compare_values(scalar_type, a, b) == Some(Ordering::Equal)
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_type_of(schema: &EntitySchema, property: &str) -> Option<ScalarType> {
    if property.contains('.') {
        return None;
    }
    schema.property(property).and_then(|p| p.scalar_type())
}

/// Evaluates one condition against a row.
pub fn matches_condition(condition: &Condition, schema: &EntitySchema, row: &Properties) -> bool {
    let scalar_type = scalar_type_of(schema, &condition.property);
    let actual = lookup(row, &condition.property);
    let expected = &condition.value;

    if let Some((kind, ignore_case, negated)) = condition.operator.text_match() {
        let (Some(mut hay), Some(mut needle)) = (text(actual), text(expected)) else {
            // Null never matches a text test, negated or not.
            return false;
        };
        if ignore_case {
            hay = hay.to_lowercase();
            needle = needle.to_lowercase();
        }
        let hit = match kind {
            TextMatch::Contains => hay.contains(&needle),
            TextMatch::StartsWith => hay.starts_with(&needle),
            TextMatch::EndsWith => hay.ends_with(&needle),
        };
        return hit != negated;
    }

    let ordering = || compare_values(scalar_type, actual, expected);
    match condition.operator {
        FilterOperator::Equal => equals(scalar_type, actual, expected),
        FilterOperator::NotEqual => !equals(scalar_type, actual, expected),
        FilterOperator::EqualIgnoreCase | FilterOperator::NotEqualIgnoreCase => {
            let same = match (text(actual), text(expected)) {
                (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
                _ => actual.is_null() && expected.is_null(),
            };
            same == (condition.operator == FilterOperator::EqualIgnoreCase)
        }
        FilterOperator::Greater => ordering() == Some(Ordering::Greater),
        FilterOperator::GreaterOrEqual => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
        FilterOperator::Less => ordering() == Some(Ordering::Less),
        FilterOperator::LessOrEqual => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
        FilterOperator::In | FilterOperator::NotIn => {
            let found = expected
                .as_array()
                .is_some_and(|items| items.iter().any(|v| equals(scalar_type, actual, v)));
            found == (condition.operator == FilterOperator::In)
        }
        FilterOperator::IsNull => actual.is_null(),
        FilterOperator::NotNull => !actual.is_null(),
        _ => false,
    }
}

/// Evaluates a predicate tree against a row.
pub fn matches(predicate: &Predicate, schema: &EntitySchema, row: &Properties) -> bool {
    match predicate {
        Predicate::Condition(c) => matches_condition(c, schema, row),
        Predicate::All(items) => items.iter().all(|p| matches(p, schema, row)),
        Predicate::Any(items) => items.iter().any(|p| matches(p, schema, row)),
        Predicate::Not(inner) => !matches(inner, schema, row),
    }
}

/// Total order used for sorting: nulls first, then by typed comparison.
fn sort_cmp(schema: &EntitySchema, key: &SortKey, a: &Properties, b: &Properties) -> Ordering {
    let x = lookup(a, &key.property);
    let y = lookup(b, &key.property);
    let ord = match (x.is_null(), y.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare_values(scalar_type_of(schema, &key.property), x, y).unwrap_or(Ordering::Equal),
    };
    if key.descending { ord.reverse() } else { ord }
}

/// Filters, sorts (stable) and pages `items`, reading each item's scalars
/// through `props`.
pub fn apply<T>(spec: &QuerySpec, schema: &EntitySchema, items: Vec<T>, props: impl Fn(&T) -> &Properties) -> Vec<T> {
    let mut kept: Vec<T> = match &spec.filter {
        Some(filter) => items.into_iter().filter(|i| matches(filter, schema, props(i))).collect(),
        None => items,
    };
    if !spec.order.is_empty() {
        kept.sort_by(|a, b| {
            spec.order
                .iter()
                .map(|k| sort_cmp(schema, k, props(a), props(b)))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }
    let offset = spec.offset.unwrap_or(0);
    let limit = spec.limit.unwrap_or(usize::MAX);
    kept.into_iter().skip(offset).take(limit).collect()
}
