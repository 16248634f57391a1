//! Coercion of untyped values to a property's scalar type.
//!
//! Filter values often arrive as JSON strings (`"42"`, `"true"`,
//! `"2024-05-01T10:00:00Z"`). Each is converted to the canonical JSON form
//! the entity itself serializes to, so that evaluation and SQL compilation
//! compare like with like.

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use std::str::FromStr;
use unitwork_model::ScalarType;
use url::Url;
use uuid::Uuid;

/// Converts `value` to the canonical JSON form of `target`.
///
/// Returns `None` when the value cannot represent the type. `null` always
/// coerces to `null`.
pub fn coerce(target: ScalarType, value: &Value) -> Option<Value> {
    if value.is_null() {
        return Some(Value::Null);
    }
    match target {
        ScalarType::Int => to_int(value).map(Value::from),
        ScalarType::Float => to_float(value).and_then(|f| Number::from_f64(f).map(Value::Number)),
        ScalarType::Decimal => to_decimal(value).map(|d| Value::String(d.to_string())),
        ScalarType::Bool => to_bool(value).map(Value::Bool),
        ScalarType::Text => to_text(value).map(Value::String),
        ScalarType::Uuid => {
            let s = value.as_str()?;
            Uuid::parse_str(s.trim()).ok().map(|u| Value::String(u.to_string()))
        }
        ScalarType::Url => {
            let s = value.as_str()?;
            Url::parse(s.trim()).ok().map(|u| Value::String(u.to_string()))
        }
        ScalarType::DateTime => to_datetime(value).map(|dt| Value::String(dt.to_rfc3339())),
        ScalarType::Enum(options) => to_enum(options, value).map(|s| Value::String(s.to_string())),
        ScalarType::Json => Some(value.clone()),
    }
}

pub(crate) fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

pub(crate) fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

pub(crate) fn to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn to_datetime(value: &Value) -> Option<DateTime<FixedOffset>> {
    let s = value.as_str()?.trim();
    DateTime::parse_from_rfc3339(s)
        .ok()
        .or_else(|| {
            // Date-only values are taken as midnight UTC.
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc().fixed_offset())
        })
}

fn to_enum(options: &'static [&'static str], value: &Value) -> Option<&'static str> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            options
                .iter()
                .copied()
                .find(|o| o.eq_ignore_ascii_case(s))
                .or_else(|| s.parse::<usize>().ok().and_then(|i| options.get(i).copied()))
        }
        Value::Number(n) => n
            .as_u64()
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| options.get(i).copied()),
        _ => None,
    }
}
