//! String forms of ordering and filtering.

use crate::coerce::coerce;
use crate::{Condition, FilterOperator, Predicate, QueryResult, SortKey};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use unitwork_model::{EntitySchema, ScalarType};

/// Parses a sort list such as `"-name, age"` into sort keys.
///
/// A leading `-` sorts descending, a leading `+` (or nothing) ascending.
/// Names resolve case-insensitively; unknown or navigation properties are
/// skipped.
pub fn parse_order(schema: &EntitySchema, order: &str) -> Vec<SortKey> {
    order
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|part| {
            let (descending, name) = match part.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, part.strip_prefix('+').unwrap_or(part)),
            };
            match schema.resolve(name) {
                Some(p) if p.scalar_type().is_some() => Some(SortKey {
                    property: p.name.to_string(),
                    descending,
                }),
                _ => {
                    debug!("Skipping sort on unknown property {} of {}", name, schema.entity_type());
                    None
                }
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ConditionDto {
    #[serde(alias = "field", alias = "name", alias = "Property", alias = "PropertyName")]
    property: String,
    #[serde(alias = "op", alias = "Operator")]
    operator: String,
    #[serde(default, alias = "Value")]
    value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GroupDto {
    List(Vec<ConditionDto>),
    Object {
        #[serde(alias = "Conditions")]
        conditions: Vec<ConditionDto>,
    },
}

impl GroupDto {
    fn into_conditions(self) -> Vec<ConditionDto> {
        match self {
            GroupDto::List(c) | GroupDto::Object { conditions: c } => c,
        }
    }
}

/// Parses a JSON filter: a list of OR-groups, each a list of AND-ed
/// conditions.
///
/// ```json
/// [
///   [{"property": "title", "operator": "Contains", "value": "draft"},
///    {"property": "priority", "operator": "Greater", "value": "2"}],
///   {"conditions": [{"property": "archived", "operator": "IsNull"}]}
/// ]
/// ```
///
/// Malformed JSON is an error. Conditions naming an unknown property, an
/// unknown operator, or carrying a value that cannot be coerced are
/// dropped; a group left without conditions is dropped with them. Returns
/// `None` when nothing survives.
pub fn parse_filter(schema: &EntitySchema, json: &str) -> QueryResult<Option<Predicate>> {
    let trimmed = json.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let groups: Vec<GroupDto> = serde_json::from_str(trimmed)?;

    let mut any = Vec::new();
    for group in groups {
        let mut all: Vec<Predicate> = group
            .into_conditions()
            .into_iter()
            .filter_map(|dto| {
                let operator = match dto.operator.parse::<FilterOperator>() {
                    Ok(op) => op,
                    Err(e) => {
                        warn!("Dropping filter condition on {}: {}", dto.property, e);
                        return None;
                    }
                };
                resolve_condition(schema, Condition::new(dto.property, operator, dto.value), false)
            })
            .map(Predicate::Condition)
            .collect();
        match all.len() {
            0 => {}
            1 => any.extend(all.pop()),
            _ => any.push(Predicate::All(all)),
        }
    }

    Ok(match any.len() {
        0 => None,
        1 => any.pop(),
        _ => Some(Predicate::Any(any)),
    })
}

/// Resolves the property name to its declared form and coerces the value.
///
/// With `keep_uncoercible`, a value that does not coerce is kept as given
/// (used for typed, programmatic conditions); otherwise the condition is
/// dropped.
pub(crate) fn resolve_condition(
    schema: &EntitySchema,
    condition: Condition,
    keep_uncoercible: bool,
) -> Option<Condition> {
    let Condition {
        property,
        operator,
        value,
    } = condition;

    // Dotted paths address a field inside a JSON value object.
    let (head, tail) = match property.split_once('.') {
        Some((h, t)) => (h, Some(t)),
        None => (property.as_str(), None),
    };
    let Some(descriptor) = schema.resolve(head) else {
        warn!("Dropping filter condition on unknown property {} of {}", property, schema.entity_type());
        return None;
    };
    let Some(scalar_type) = descriptor.scalar_type() else {
        warn!("Dropping filter condition on navigation {} of {}", property, schema.entity_type());
        return None;
    };
    let resolved = match tail {
        Some(t) => format!("{}.{}", descriptor.name, t),
        None => descriptor.name.to_string(),
    };
    let target = if tail.is_some() || operator.text_match().is_some() {
        ScalarType::Text
    } else {
        scalar_type
    };

    let coerced = if operator.takes_no_value() {
        Some(Value::Null)
    } else if operator.takes_list() {
        coerce_list(target, &value)
    } else if tail.is_some() {
        Some(value.clone())
    } else {
        coerce(target, &value)
    };

    match coerced {
        Some(value) => Some(Condition::new(resolved, operator, value)),
        None if keep_uncoercible => Some(Condition::new(resolved, operator, value)),
        None => {
            debug!("Dropping filter condition on {}: value {} does not coerce", resolved, value);
            None
        }
    }
}

fn coerce_list(target: ScalarType, value: &Value) -> Option<Value> {
    let items: Vec<Value> = match value {
        Value::Array(items) => items.clone(),
        // "a,b,c" is accepted for list operators
        Value::String(s) => s.split(',').map(|p| Value::String(p.trim().to_string())).collect(),
        other => vec![other.clone()],
    };
    items
        .iter()
        .map(|v| coerce(target, v))
        .collect::<Option<Vec<_>>>()
        .map(Value::Array)
}
