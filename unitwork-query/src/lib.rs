//! Backend-neutral query abstraction for unitwork.
//!
//! A [`Query`] is a fluent builder over a plain-data [`QuerySpec`]: filter
//! predicates, ordering, eager-load includes and pagination. Every backend
//! compiles a `QuerySpec` into its own representation (the SQLite store emits
//! SQL, the in-memory store evaluates it with [`eval`]).
//!
//! Two string entry points exist for callers that receive queries as text
//! (for example from a grid control):
//! - [`Query::order_by_str`] parses `"-name,age"` style sort lists
//! - [`Query::filter_by_str`] parses a JSON list of OR-groups whose
//!   conditions are AND-ed together
//!
//! Values arriving untyped are coerced to the property's [`ScalarType`];
//! a condition whose value cannot be coerced, or whose property does not
//! exist, is dropped rather than failing the query.
//!
//! [`ScalarType`]: unitwork_model::ScalarType

pub mod aggregate;
mod coerce;
mod condition;
mod error;
pub mod eval;
mod include;
mod parse;
mod query;

pub use aggregate::{sum_values, Total};
pub use coerce::coerce;
pub use condition::{Condition, FilterOperator, Predicate, TextMatch};
pub use error::{QueryError, QueryResult};
pub use include::IncludeTree;
pub use parse::{parse_filter, parse_order};
pub use query::{Query, QuerySpec, SortKey};
