use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::LazyLock;
use unitwork_model::{Entity, EntitySchema, GraphNode, Properties, ScalarType};
use unitwork_query::eval::{apply, matches};
use unitwork_query::{
    coerce, sum_values, Condition, FilterOperator, IncludeTree, Predicate, Query, QueryError, SortKey, Total,
};
use unitwork_types::{Identity, KeyValue};

static STATUSES: &[&str] = &["Open", "Active", "Closed"];

static TASK_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::new("task")
        .key("id", ScalarType::Int)
        .text("title")
        .int("priority")
        .float("rating")
        .decimal("estimate")
        .bool("done")
        .datetime("due")
        .enumeration("status", STATUSES)
        .scalar("ref", ScalarType::Uuid)
        .scalar("meta", ScalarType::Json)
        .reference("owner", "user")
        .collection("tags", "tag")
});

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Task {
    id: i64,
    title: String,
    priority: i64,
}

impl GraphNode for Task {
    fn entity_type(&self) -> &'static str {
        "task"
    }
    fn key(&self) -> KeyValue {
        self.id.to_key()
    }
    fn scalars(&self) -> Properties {
        Properties::new()
            .with("id", &self.id)
            .with("title", &self.title)
            .with("priority", &self.priority)
    }
}

impl Entity for Task {
    type Id = i64;
    fn id(&self) -> i64 {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
    fn schema() -> &'static EntitySchema {
        &TASK_SCHEMA
    }
}

fn row(id: i64, title: &str, priority: i64, status: &str) -> Properties {
    Properties::new()
        .with("id", &id)
        .with("title", title)
        .with("priority", &priority)
        .with("status", status)
        .with("estimate", &format!("{}.50", priority))
        .with("due", &format!("2024-0{}-01T00:00:00Z", priority.clamp(1, 9)))
}

fn rows() -> Vec<Properties> {
    vec![
        row(1, "Write docs", 2, "Open"),
        row(2, "Fix build", 5, "Active"),
        row(3, "Release", 3, "Closed"),
        row(4, "write tests", 1, "Open"),
    ]
}

fn ids(rows: &[Properties]) -> Vec<i64> {
    rows.iter().map(|r| r.value("id").as_i64().unwrap()).collect()
}

// ── Builder ──────────────────────────────────────────────────────

#[test]
fn filter_resolves_property_names_case_insensitively() {
    let q = Query::<Task>::new().filter(Condition::eq("TITLE", "Release"));
    assert_eq!(
        q.spec().filter,
        Some(Predicate::Condition(Condition::eq("title", "Release")))
    );
}

#[test]
fn filter_on_unknown_property_is_dropped() {
    let q = Query::<Task>::new().filter(Condition::eq("nope", 1));
    assert!(q.spec().filter.is_none());
}

#[test]
fn successive_filters_are_and_combined() {
    let q = Query::<Task>::new()
        .filter(Condition::gt("priority", 1))
        .filter(Condition::lt("priority", 5));
    match &q.spec().filter {
        Some(Predicate::All(items)) => assert_eq!(items.len(), 2),
        other => panic!("expected All, got {other:?}"),
    }
}

#[test]
fn paginate_is_one_based() {
    let q = Query::<Task>::new().paginate(3, 20);
    assert_eq!(q.spec().offset, Some(40));
    assert_eq!(q.spec().limit, Some(20));

    let q = Query::<Task>::new().paginate(0, 20);
    assert_eq!(q.spec().offset, Some(0));
    let q = Query::<Task>::new().paginate(-4, 5);
    assert_eq!(q.spec().offset, Some(0));
}

#[test]
fn order_by_str_parses_direction_and_resolves_names() {
    let q = Query::<Task>::new().order_by_str("-Priority, title ,+ID,unknown,owner");
    assert_eq!(
        q.spec().order,
        vec![
            SortKey {
                property: "priority".into(),
                descending: true
            },
            SortKey {
                property: "title".into(),
                descending: false
            },
            SortKey {
                property: "id".into(),
                descending: false
            },
        ]
    );
}

#[test]
fn include_accepts_navigations_only() {
    let q = Query::<Task>::new()
        .include("Owner")
        .include("tags.owner")
        .include("title")
        .include("owner");
    assert_eq!(q.spec().includes, vec!["owner".to_string(), "tags.owner".to_string()]);
}

#[test]
fn include_tree_nests_dotted_paths() {
    let tree = IncludeTree::from_paths(&["owner", "tags.owner", "tags.parent"]);
    assert!(tree.contains("owner"));
    let tags = tree.get("tags").unwrap();
    assert!(tags.contains("owner"));
    assert!(tags.contains("parent"));
    assert!(tree.get("owner").unwrap().is_empty());
}

#[test]
fn by_id_filters_on_key_property() {
    let q = Query::<Task>::new().by_id(&7);
    assert_eq!(q.spec().filter, Some(Predicate::Condition(Condition::eq("id", 7))));
}

// ── String filters ───────────────────────────────────────────────

#[test]
fn filter_by_str_builds_or_of_and_groups() {
    let json = r#"[
        [{"property": "priority", "operator": "Greater", "value": "1"},
         {"property": "title", "operator": "ContainsIgnoreCase", "value": "WRITE"}],
        {"conditions": [{"property": "status", "operator": "eq", "value": "closed"}]}
    ]"#;
    let q = Query::<Task>::new().filter_by_str(json).unwrap();
    let filter = q.spec().filter.clone().unwrap();

    let mut hits = rows();
    hits.retain(|r| matches(&filter, &TASK_SCHEMA, r));
    assert_eq!(ids(&hits), vec![1, 3]);
}

#[test]
fn filter_by_str_coerces_untyped_values() {
    let json = r#"[[{"property": "priority", "operator": "In", "value": ["2", 3]}]]"#;
    let q = Query::<Task>::new().filter_by_str(json).unwrap();
    assert_eq!(
        q.spec().filter,
        Some(Predicate::Condition(Condition::is_in("priority", [2, 3])))
    );
}

#[test]
fn filter_by_str_drops_uncoercible_conditions() {
    let json = r#"[[{"property": "priority", "operator": "Equal", "value": "high"},
                    {"property": "title", "operator": "Equal", "value": "Release"}]]"#;
    let q = Query::<Task>::new().filter_by_str(json).unwrap();
    assert_eq!(
        q.spec().filter,
        Some(Predicate::Condition(Condition::eq("title", "Release")))
    );
}

#[test]
fn filter_by_str_drops_unknown_properties_and_operators() {
    let json = r#"[[{"property": "missing", "operator": "Equal", "value": 1}],
                   [{"property": "title", "operator": "Resembles", "value": "x"}]]"#;
    let q = Query::<Task>::new().filter_by_str(json).unwrap();
    assert!(q.spec().filter.is_none());
}

#[test]
fn filter_by_str_rejects_malformed_json() {
    let err = Query::<Task>::new().filter_by_str("[[{").unwrap_err();
    assert!(matches!(err, QueryError::MalformedFilter(_)));
}

#[test]
fn empty_filter_string_is_no_filter() {
    let q = Query::<Task>::new().filter_by_str("  ").unwrap();
    assert!(q.spec().filter.is_none());
}

#[test]
fn operator_parsing_accepts_short_forms() {
    assert_eq!("gte".parse::<FilterOperator>().unwrap(), FilterOperator::GreaterOrEqual);
    assert_eq!("!=".parse::<FilterOperator>().unwrap(), FilterOperator::NotEqual);
    assert_eq!(
        "notstartswithignorecase".parse::<FilterOperator>().unwrap(),
        FilterOperator::NotStartsWithIgnoreCase
    );
    assert!("like".parse::<FilterOperator>().is_err());
}

// ── Coercion ─────────────────────────────────────────────────────

#[test]
fn coercion_per_scalar_type() {
    assert_eq!(coerce(ScalarType::Int, &json!("42")), Some(json!(42)));
    assert_eq!(coerce(ScalarType::Int, &json!(4.0)), Some(json!(4)));
    assert_eq!(coerce(ScalarType::Int, &json!("4.5")), None);
    assert_eq!(coerce(ScalarType::Float, &json!("2.5")), Some(json!(2.5)));
    assert_eq!(coerce(ScalarType::Decimal, &json!("10.25")), Some(json!("10.25")));
    assert_eq!(coerce(ScalarType::Bool, &json!("TRUE")), Some(json!(true)));
    assert_eq!(coerce(ScalarType::Bool, &json!("maybe")), None);
    assert_eq!(coerce(ScalarType::Enum(STATUSES), &json!("closed")), Some(json!("Closed")));
    assert_eq!(coerce(ScalarType::Enum(STATUSES), &json!(1)), Some(json!("Active")));
    assert_eq!(
        coerce(ScalarType::Uuid, &json!("67E55044-10B1-426F-9247-BB680E5FE0C8")),
        Some(json!("67e55044-10b1-426f-9247-bb680e5fe0c8"))
    );
    assert_eq!(coerce(ScalarType::Uuid, &json!("not-a-uuid")), None);
    assert_eq!(
        coerce(ScalarType::Url, &json!("https://example.com")),
        Some(json!("https://example.com/"))
    );
    assert_eq!(
        coerce(ScalarType::DateTime, &json!("2024-05-01T10:00:00+02:00")),
        Some(json!("2024-05-01T10:00:00+02:00"))
    );
    assert_eq!(coerce(ScalarType::Text, &json!(12)), Some(json!("12")));
    assert_eq!(coerce(ScalarType::Int, &json!(null)), Some(json!(null)));
}

// ── Evaluation ───────────────────────────────────────────────────

#[test]
fn apply_filters_sorts_and_pages() {
    let spec = Query::<Task>::new()
        .filter(Condition::ge("priority", 2))
        .order_by_descending("priority")
        .skip(1)
        .take(1)
        .into_spec();
    let out = apply(&spec, &TASK_SCHEMA, rows(), |r| r);
    assert_eq!(ids(&out), vec![3]);
}

#[test]
fn decimal_and_datetime_compare_by_value() {
    let spec = Query::<Task>::new()
        .filter(Condition::gt("estimate", "2.5"))
        .filter(Condition::lt("due", "2024-05-01T00:00:00+00:00"))
        .into_spec();
    let out = apply(&spec, &TASK_SCHEMA, rows(), |r| r);
    assert_eq!(ids(&out), vec![3]);
}

#[test]
fn enum_sorts_by_declaration_order() {
    let spec = Query::<Task>::new().order_by("status").order_by("id").into_spec();
    let out = apply(&spec, &TASK_SCHEMA, rows(), |r| r);
    assert_eq!(ids(&out), vec![1, 4, 2, 3]);
}

#[test]
fn null_checks_and_negated_text_operators() {
    let mut data = rows();
    data[0].set("title", serde_json::Value::Null);

    let nulls = Query::<Task>::new().filter(Condition::is_null("title")).into_spec();
    assert_eq!(ids(&apply(&nulls, &TASK_SCHEMA, data.clone(), |r| r)), vec![1]);

    let not_write = Query::<Task>::new()
        .filter(Condition::new("title", FilterOperator::NotStartsWithIgnoreCase, "write"))
        .into_spec();
    assert_eq!(ids(&apply(&not_write, &TASK_SCHEMA, data, |r| r)), vec![2, 3]);
}

#[test]
fn filter_any_ors_its_conditions() {
    let spec = Query::<Task>::new()
        .filter_any([Condition::eq("id", 1), Condition::eq("id", 4)])
        .into_spec();
    assert_eq!(ids(&apply(&spec, &TASK_SCHEMA, rows(), |r| r)), vec![1, 4]);
}

// ── Aggregation ──────────────────────────────────────────────────

#[test]
fn sums_by_property_type() {
    let data = rows();
    let total = sum_values("priority", ScalarType::Int, data.iter().map(|r| r.value("priority"))).unwrap();
    assert_eq!(total, Some(Total::Int(11)));

    let total = sum_values("estimate", ScalarType::Decimal, data.iter().map(|r| r.value("estimate"))).unwrap();
    assert_eq!(total.unwrap().as_decimal().unwrap().to_string(), "13.00");

    let empty = sum_values("priority", ScalarType::Int, std::iter::empty()).unwrap();
    assert_eq!(empty, None);

    let err = sum_values("title", ScalarType::Text, data.iter().map(|r| r.value("title"))).unwrap_err();
    assert!(matches!(err, QueryError::NotNumeric(_)));
}

#[test]
fn float_totals_truncate_only_when_they_fit() {
    assert_eq!(Total::Float(41.9).as_i64(), Some(41));
    assert_eq!(Total::Float(-2.5).as_i64(), Some(-2));
    assert_eq!(Total::Float(1e300).as_i64(), None);
    assert_eq!(Total::Float(f64::NAN).as_i64(), None);
    assert_eq!(Total::Float(f64::NAN).as_decimal(), None);
}

#[test]
fn int_sum_overflow_is_an_error() {
    let values = [json!(i64::MAX), json!(1)];
    let err = sum_values("priority", ScalarType::Int, values.iter()).unwrap_err();
    assert!(matches!(err, QueryError::Overflow(_)));
}

proptest! {
    #[test]
    fn pagination_never_overlaps(page in 1i64..6, size in 1usize..4) {
        let data: Vec<Properties> = (1..=12).map(|i| row(i, "t", i, "Open")).collect();
        let a = Query::<Task>::new().order_by("id").paginate(page, size).into_spec();
        let b = Query::<Task>::new().order_by("id").paginate(page + 1, size).into_spec();
        let first = ids(&apply(&a, &TASK_SCHEMA, data.clone(), |r| r));
        let second = ids(&apply(&b, &TASK_SCHEMA, data, |r| r));
        prop_assert!(first.iter().all(|id| !second.contains(id)));
        prop_assert!(first.len() <= size);
    }
}
