use crate::{RepositoryError, RepositoryResult};
use rust_decimal::Decimal;
use unitwork_query::{QueryError, Total};

/// Numeric result types accepted by `Repository::sum`.
///
/// Plain types yield zero over an empty set; `Option` types yield `None`.
/// A total that does not fit the requested type is an overflow error.
pub trait Summable: Sized + Send {
    fn from_total(property: &str, total: Option<Total>) -> RepositoryResult<Self>;
}

fn overflow(property: &str) -> RepositoryError {
    QueryError::Overflow(property.to_string()).into()
}

impl Summable for i64 {
    fn from_total(property: &str, total: Option<Total>) -> RepositoryResult<Self> {
        match total {
            Some(t) => t.as_i64().ok_or_else(|| overflow(property)),
            None => Ok(0),
        }
    }
}

impl Summable for i32 {
    fn from_total(property: &str, total: Option<Total>) -> RepositoryResult<Self> {
        let wide = i64::from_total(property, total)?;
        i32::try_from(wide).map_err(|_| overflow(property))
    }
}

impl Summable for f64 {
    fn from_total(_property: &str, total: Option<Total>) -> RepositoryResult<Self> {
        Ok(total.map_or(0.0, |t| t.as_f64()))
    }
}

impl Summable for f32 {
    fn from_total(property: &str, total: Option<Total>) -> RepositoryResult<Self> {
        let wide = f64::from_total(property, total)?;
        let narrow = wide as f32;
        if wide.is_finite() && !narrow.is_finite() {
            return Err(overflow(property));
        }
        Ok(narrow)
    }
}

impl Summable for Decimal {
    fn from_total(property: &str, total: Option<Total>) -> RepositoryResult<Self> {
        match total {
            Some(t) => t.as_decimal().ok_or_else(|| overflow(property)),
            None => Ok(Decimal::ZERO),
        }
    }
}

impl<T: Summable> Summable for Option<T> {
    fn from_total(property: &str, total: Option<Total>) -> RepositoryResult<Self> {
        total.map(|t| T::from_total(property, Some(t))).transpose()
    }
}
