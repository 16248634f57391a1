use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Comparison operator of a filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    EqualIgnoreCase,
    NotEqualIgnoreCase,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    In,
    NotIn,
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    ContainsIgnoreCase,
    NotContainsIgnoreCase,
    StartsWithIgnoreCase,
    NotStartsWithIgnoreCase,
    EndsWithIgnoreCase,
    NotEndsWithIgnoreCase,
    IsNull,
    NotNull,
}

/// Substring test performed by the text operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    Contains,
    StartsWith,
    EndsWith,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 24] = [
        Self::Equal,
        Self::NotEqual,
        Self::EqualIgnoreCase,
        Self::NotEqualIgnoreCase,
        Self::Greater,
        Self::GreaterOrEqual,
        Self::Less,
        Self::LessOrEqual,
        Self::In,
        Self::NotIn,
        Self::Contains,
        Self::NotContains,
        Self::StartsWith,
        Self::NotStartsWith,
        Self::EndsWith,
        Self::NotEndsWith,
        Self::ContainsIgnoreCase,
        Self::NotContainsIgnoreCase,
        Self::StartsWithIgnoreCase,
        Self::NotStartsWithIgnoreCase,
        Self::EndsWithIgnoreCase,
        Self::NotEndsWithIgnoreCase,
        Self::IsNull,
        Self::NotNull,
    ];

    /// Canonical name, as accepted by `FromStr`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Equal => "Equal",
            Self::NotEqual => "NotEqual",
            Self::EqualIgnoreCase => "EqualIgnoreCase",
            Self::NotEqualIgnoreCase => "NotEqualIgnoreCase",
            Self::Greater => "Greater",
            Self::GreaterOrEqual => "GreaterOrEqual",
            Self::Less => "Less",
            Self::LessOrEqual => "LessOrEqual",
            Self::In => "In",
            Self::NotIn => "NotIn",
            Self::Contains => "Contains",
            Self::NotContains => "NotContains",
            Self::StartsWith => "StartsWith",
            Self::NotStartsWith => "NotStartsWith",
            Self::EndsWith => "EndsWith",
            Self::NotEndsWith => "NotEndsWith",
            Self::ContainsIgnoreCase => "ContainsIgnoreCase",
            Self::NotContainsIgnoreCase => "NotContainsIgnoreCase",
            Self::StartsWithIgnoreCase => "StartsWithIgnoreCase",
            Self::NotStartsWithIgnoreCase => "NotStartsWithIgnoreCase",
            Self::EndsWithIgnoreCase => "EndsWithIgnoreCase",
            Self::NotEndsWithIgnoreCase => "NotEndsWithIgnoreCase",
            Self::IsNull => "IsNull",
            Self::NotNull => "NotNull",
        }
    }

    /// For the text operators: which test, whether it ignores case, and
    /// whether the result is negated.
    pub fn text_match(&self) -> Option<(TextMatch, bool, bool)> {
        let m = match self {
            Self::Contains => (TextMatch::Contains, false, false),
            Self::NotContains => (TextMatch::Contains, false, true),
            Self::StartsWith => (TextMatch::StartsWith, false, false),
            Self::NotStartsWith => (TextMatch::StartsWith, false, true),
            Self::EndsWith => (TextMatch::EndsWith, false, false),
            Self::NotEndsWith => (TextMatch::EndsWith, false, true),
            Self::ContainsIgnoreCase => (TextMatch::Contains, true, false),
            Self::NotContainsIgnoreCase => (TextMatch::Contains, true, true),
            Self::StartsWithIgnoreCase => (TextMatch::StartsWith, true, false),
            Self::NotStartsWithIgnoreCase => (TextMatch::StartsWith, true, true),
            Self::EndsWithIgnoreCase => (TextMatch::EndsWith, true, false),
            Self::NotEndsWithIgnoreCase => (TextMatch::EndsWith, true, true),
            _ => return None,
        };
        Some(m)
    }

    /// Operators that take a list of values.
    pub fn takes_list(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    /// Operators that ignore their value.
    pub fn takes_no_value(&self) -> bool {
        matches!(self, Self::IsNull | Self::NotNull)
    }
}

impl FromStr for FilterOperator {
    type Err = String;

    /// Accepts canonical names case-insensitively plus the usual short forms
    /// (`eq`, `!=`, `gte`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let short = match lowered.as_str() {
            "eq" | "=" | "==" => Some(Self::Equal),
            "ne" | "neq" | "!=" | "<>" => Some(Self::NotEqual),
            "gt" | ">" => Some(Self::Greater),
            "ge" | "gte" | ">=" => Some(Self::GreaterOrEqual),
            "lt" | "<" => Some(Self::Less),
            "le" | "lte" | "<=" => Some(Self::LessOrEqual),
            "notnull" | "isnotnull" => Some(Self::NotNull),
            _ => None,
        };
        if let Some(op) = short {
            return Ok(op);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.name().eq_ignore_ascii_case(&lowered))
            .ok_or_else(|| format!("unknown filter operator: {s}"))
    }
}

/// One filter condition: `property operator value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub property: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(property: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            property: property.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterOperator::Equal, value)
    }

    pub fn ne(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterOperator::NotEqual, value)
    }

    pub fn gt(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterOperator::Greater, value)
    }

    pub fn ge(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterOperator::GreaterOrEqual, value)
    }

    pub fn lt(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterOperator::Less, value)
    }

    pub fn le(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterOperator::LessOrEqual, value)
    }

    pub fn is_in<V: Into<Value>>(property: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect::<Vec<Value>>();
        Self::new(property, FilterOperator::In, Value::Array(values))
    }

    pub fn not_in<V: Into<Value>>(property: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect::<Vec<Value>>();
        Self::new(property, FilterOperator::NotIn, Value::Array(values))
    }

    pub fn contains(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterOperator::Contains, value)
    }

    pub fn starts_with(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterOperator::StartsWith, value)
    }

    pub fn ends_with(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(property, FilterOperator::EndsWith, value)
    }

    pub fn is_null(property: impl Into<String>) -> Self {
        Self::new(property, FilterOperator::IsNull, Value::Null)
    }

    pub fn not_null(property: impl Into<String>) -> Self {
        Self::new(property, FilterOperator::NotNull, Value::Null)
    }
}

/// A boolean tree of conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Condition(Condition),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// AND-combines `self` with `other`, flattening nested `All`s.
    pub fn and(self, other: Predicate) -> Predicate {
        match self {
            Predicate::All(mut items) => {
                items.push(other);
                Predicate::All(items)
            }
            first => Predicate::All(vec![first, other]),
        }
    }

    /// Visits every condition in the tree.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        match self {
            Predicate::Condition(c) => out.push(c),
            Predicate::All(items) | Predicate::Any(items) => {
                for item in items {
                    item.collect(out);
                }
            }
            Predicate::Not(inner) => inner.collect(out),
        }
    }
}

impl From<Condition> for Predicate {
    fn from(condition: Condition) -> Self {
        Predicate::Condition(condition)
    }
}
