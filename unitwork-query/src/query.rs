use crate::parse::{parse_filter, parse_order, resolve_condition};
use crate::{Condition, Predicate, QueryResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use unitwork_model::Entity;
use unitwork_types::Identity;

/// One ordering key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub property: String,
    pub descending: bool,
}

/// Backend-neutral description of a query.
///
/// Property names are already resolved to their declared spelling and
/// condition values are coerced to the property type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub filter: Option<Predicate>,
    pub order: Vec<SortKey>,
    pub includes: Vec<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl QuerySpec {
    /// AND-combines a predicate into the filter.
    pub fn and(&mut self, predicate: Predicate) {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
    }
}

/// Fluent query builder for one entity type.
pub struct Query<E> {
    spec: QuerySpec,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            spec: self.spec.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query").field("spec", &self.spec).finish()
    }
}

impl<E: Entity> Default for Query<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Query<E> {
    pub fn new() -> Self {
        Self {
            spec: QuerySpec::default(),
            _entity: PhantomData,
        }
    }

    /// Wraps an existing spec, e.g. one received from a remote caller.
    pub fn from_spec(spec: QuerySpec) -> Self {
        Self {
            spec,
            _entity: PhantomData,
        }
    }

    /// Adds an AND-ed condition. The property name resolves
    /// case-insensitively; an unknown property drops the condition.
    pub fn filter(mut self, condition: Condition) -> Self {
        if let Some(c) = resolve_condition(E::schema(), condition, true) {
            self.spec.and(Predicate::Condition(c));
        }
        self
    }

    /// Adds an AND-ed group of OR-ed conditions.
    pub fn filter_any(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        let any: Vec<Predicate> = conditions
            .into_iter()
            .filter_map(|c| resolve_condition(E::schema(), c, true))
            .map(Predicate::Condition)
            .collect();
        if !any.is_empty() {
            self.spec.and(Predicate::Any(any));
        }
        self
    }

    /// Adds an already-built predicate tree as is.
    pub fn filter_predicate(mut self, predicate: Predicate) -> Self {
        self.spec.and(predicate);
        self
    }

    /// Parses a JSON filter (see [`crate::parse_filter`]) and AND-s it in.
    pub fn filter_by_str(mut self, json: &str) -> QueryResult<Self> {
        if let Some(predicate) = parse_filter(E::schema(), json)? {
            self.spec.and(predicate);
        }
        Ok(self)
    }

    /// Restricts to one id.
    pub fn by_id(self, id: &E::Id) -> Self {
        let key = key_name::<E>();
        self.filter_predicate(Condition::eq(key, id.to_key().to_json()).into())
    }

    /// Restricts to a set of ids.
    pub fn by_ids<'a>(self, ids: impl IntoIterator<Item = &'a E::Id>) -> Self {
        let key = key_name::<E>();
        let values = ids.into_iter().map(|id| id.to_key().to_json());
        self.filter_predicate(Condition::is_in(key, values).into())
    }

    pub fn order_by(self, property: &str) -> Self {
        self.push_order(property, false)
    }

    pub fn order_by_descending(self, property: &str) -> Self {
        self.push_order(property, true)
    }

    /// Appends orderings parsed from `"-name,age"`.
    pub fn order_by_str(mut self, order: &str) -> Self {
        self.spec.order.extend(parse_order(E::schema(), order));
        self
    }

    fn push_order(mut self, property: &str, descending: bool) -> Self {
        let prefix = if descending { "-" } else { "" };
        self.spec
            .order
            .extend(parse_order(E::schema(), &format!("{prefix}{property}")));
        self
    }

    /// Eager-loads a navigation. Dotted paths load nested navigations.
    pub fn include(mut self, path: &str) -> Self {
        let (head, tail) = match path.split_once('.') {
            Some((h, t)) => (h, Some(t)),
            None => (path, None),
        };
        match E::schema().resolve(head) {
            Some(p) if p.is_navigation() => {
                let resolved = match tail {
                    Some(t) => format!("{}.{}", p.name, t),
                    None => p.name.to_string(),
                };
                if !self.spec.includes.contains(&resolved) {
                    self.spec.includes.push(resolved);
                }
            }
            _ => tracing::debug!("Ignoring include of {} on {}", path, E::schema().entity_type()),
        }
        self
    }

    /// 1-based page. A page of zero or less starts at offset 0.
    pub fn paginate(mut self, page: i64, page_size: usize) -> Self {
        let page = usize::try_from(page.max(1) - 1).unwrap_or(0);
        self.spec.offset = Some(page.saturating_mul(page_size));
        self.spec.limit = Some(page_size);
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.spec.offset = Some(n);
        self
    }

    pub fn take(mut self, n: usize) -> Self {
        self.spec.limit = Some(n);
        self
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn into_spec(self) -> QuerySpec {
        self.spec
    }
}

fn key_name<E: Entity>() -> &'static str {
    E::schema().key_property().map_or("id", |p| p.name)
}
