//! Numeric aggregation over stored property values.

use crate::coerce::{to_decimal, to_float, to_int};
use crate::{QueryError, QueryResult};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde_json::Value;
use unitwork_model::ScalarType;

/// A sum in the widest form of its property type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Total {
    Int(i64),
    Float(f64),
    Decimal(Decimal),
}

impl Total {
    /// The total truncated to an integer, or `None` when it does not fit.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Total::Int(v) => Some(*v),
            Total::Float(v) => {
                let t = v.trunc();
                (t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64).then_some(t as i64)
            }
            Total::Decimal(d) => d.trunc().to_i64(),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Total::Int(v) => *v as f64,
            Total::Float(v) => *v,
            Total::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Total::Int(v) => Some(Decimal::from(*v)),
            Total::Float(v) => Decimal::from_f64(*v),
            Total::Decimal(d) => Some(*d),
        }
    }
}

/// Sums non-null values of a numeric property. Returns `None` when no
/// non-null value was seen.
pub fn sum_values<'a>(
    property: &str,
    scalar_type: ScalarType,
    values: impl IntoIterator<Item = &'a Value>,
) -> QueryResult<Option<Total>> {
    let values = values.into_iter().filter(|v| !v.is_null());
    match scalar_type {
        ScalarType::Int => {
            let mut total: Option<i64> = None;
            for v in values {
                let n = to_int(v).ok_or_else(|| QueryError::NotNumeric(property.to_string()))?;
                total = Some(
                    total
                        .unwrap_or(0)
                        .checked_add(n)
                        .ok_or_else(|| QueryError::Overflow(property.to_string()))?,
                );
            }
            Ok(total.map(Total::Int))
        }
        ScalarType::Float => {
            let mut total: Option<f64> = None;
            for v in values {
                let n = to_float(v).ok_or_else(|| QueryError::NotNumeric(property.to_string()))?;
                total = Some(total.unwrap_or(0.0) + n);
            }
            Ok(total.map(Total::Float))
        }
        ScalarType::Decimal => {
            let mut total: Option<Decimal> = None;
            for v in values {
                let n = to_decimal(v).ok_or_else(|| QueryError::NotNumeric(property.to_string()))?;
                total = Some(
                    total
                        .unwrap_or(Decimal::ZERO)
                        .checked_add(n)
                        .ok_or_else(|| QueryError::Overflow(property.to_string()))?,
                );
            }
            Ok(total.map(Total::Decimal))
        }
        _ => Err(QueryError::NotNumeric(property.to_string())),
    }
}
