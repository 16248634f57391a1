use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use unitwork_model::{
    ChangeType, DynEntity, Entity, EntitySchema, GraphNode, KeyAssignments, Properties, RecordRef, ScalarType,
};
use unitwork_query::eval::apply;
use unitwork_query::{sum_values, Condition, Query, Total};
use unitwork_repo::{
    AccessChecker, Aggregator, EntityFilter, EntityValidator, FiltersManager, Loader, Mutator, Repository,
    RepositoryConfig, RepositoryError, RepositoryResult, SaveSummary, Services, Transactional, UnitLock,
    ValidationContext, ValidationFailure, ValidatorRegistry,
};
use unitwork_types::{Identity, KeyValue};

// ── Fixture entity ───────────────────────────────────────────────

static ITEM_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::new("item")
        .key("id", ScalarType::Int)
        .text("name")
        .int("qty")
        .float("price")
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Item {
    id: i64,
    name: String,
    qty: i64,
    price: f64,
}

impl Item {
    fn new(name: &str, qty: i64) -> Self {
        Self {
            id: 0,
            name: name.into(),
            qty,
            price: 1.5,
        }
    }
}

impl GraphNode for Item {
    fn entity_type(&self) -> &'static str {
        "item"
    }
    fn key(&self) -> KeyValue {
        self.id.to_key()
    }
    fn scalars(&self) -> Properties {
        Properties::new()
            .with("id", &self.id)
            .with("name", &self.name)
            .with("qty", &self.qty)
            .with("price", &self.price)
    }
}

impl Entity for Item {
    type Id = i64;
    fn id(&self) -> i64 {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
    fn schema() -> &'static EntitySchema {
        &ITEM_SCHEMA
    }
}

// ── Fake backend ─────────────────────────────────────────────────

enum Op {
    Put(Item),
    Delete(i64),
}

#[derive(Default)]
struct State {
    rows: BTreeMap<i64, Item>,
    staged: Vec<Op>,
    next_id: i64,
    saves: usize,
    writes: usize,
    in_tx: bool,
    fail_tx: bool,
}

#[derive(Clone, Default)]
struct FakeBackend {
    state: Arc<Mutex<State>>,
    lock: UnitLock,
}

impl FakeBackend {
    fn seeded(items: &[(&str, i64)]) -> Self {
        let backend = Self::default();
        {
            let mut state = backend.state.lock().unwrap();
            for (name, qty) in items {
                state.next_id += 1;
                let mut item = Item::new(name, *qty);
                item.id = state.next_id;
                state.rows.insert(item.id, item);
            }
        }
        backend
    }

    fn saves(&self) -> usize {
        self.state.lock().unwrap().saves
    }

    fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    fn row(&self, id: i64) -> Option<Item> {
        self.state.lock().unwrap().rows.get(&id).cloned()
    }

    fn matching(&self, query: &Query<Item>) -> Vec<Item> {
        let rows: Vec<(Properties, Item)> = self
            .state
            .lock()
            .unwrap()
            .rows
            .values()
            .map(|i| (i.scalars(), i.clone()))
            .collect();
        apply(query.spec(), Item::schema(), rows, |(p, _)| p)
            .into_iter()
            .map(|(_, i)| i)
            .collect()
    }
}

#[async_trait]
impl Loader<Item> for FakeBackend {
    async fn get(&self, query: &Query<Item>) -> RepositoryResult<Option<Item>> {
        Ok(self.matching(query).into_iter().next())
    }

    async fn get_all(&self, query: &Query<Item>) -> RepositoryResult<Vec<Item>> {
        Ok(self.matching(query))
    }

    async fn get_persisted(&self, id: &i64) -> RepositoryResult<Option<Item>> {
        Ok(self.row(*id))
    }
}

#[async_trait]
impl Aggregator<Item> for FakeBackend {
    async fn count(&self, query: &Query<Item>) -> RepositoryResult<u64> {
        Ok(self.matching(query).len() as u64)
    }

    async fn sum(&self, query: &Query<Item>, property: &str) -> RepositoryResult<Option<Total>> {
        let descriptor = Item::schema()
            .resolve(property)
            .ok_or_else(|| RepositoryError::InvalidOperation(property.to_string()))?;
        let scalar_type = descriptor.scalar_type().unwrap_or(ScalarType::Json);
        let rows: Vec<Properties> = self.matching(query).iter().map(|i| i.scalars()).collect();
        Ok(sum_values(descriptor.name, scalar_type, rows.iter().map(|r| r.value(descriptor.name)))?)
    }
}

#[async_trait]
impl Mutator<Item> for FakeBackend {
    async fn add(&self, entity: &Item) -> RepositoryResult<KeyAssignments> {
        let mut state = self.state.lock().unwrap();
        let mut keys = KeyAssignments::new();
        let mut item = entity.clone();
        if item.id == 0 {
            state.next_id += 1;
            item.id = state.next_id;
            keys.assign(entity, item.id.to_key());
        }
        state.staged.push(Op::Put(item));
        Ok(keys)
    }

    async fn update(&self, entity: &Item, _base: Option<&Item>) -> RepositoryResult<KeyAssignments> {
        self.state.lock().unwrap().staged.push(Op::Put(entity.clone()));
        Ok(KeyAssignments::new())
    }

    async fn delete(&self, entity: &Item) -> RepositoryResult<()> {
        self.state.lock().unwrap().staged.push(Op::Delete(entity.id));
        Ok(())
    }

    async fn save(&self) -> RepositoryResult<SaveSummary> {
        let mut state = self.state.lock().unwrap();
        let staged = std::mem::take(&mut state.staged);
        let mut summary = SaveSummary::default();
        for op in staged {
            match op {
                Op::Put(item) => {
                    if state.rows.insert(item.id, item).is_some() {
                        summary.updated += 1;
                    } else {
                        summary.inserted += 1;
                    }
                }
                Op::Delete(id) => {
                    state.rows.remove(&id);
                    summary.deleted += 1;
                }
            }
        }
        state.saves += 1;
        state.writes += summary.total();
        Ok(summary)
    }

    async fn discard(&self) {
        self.state.lock().unwrap().staged.clear();
    }
}

#[async_trait]
impl Transactional for FakeBackend {
    async fn begin(&self) -> RepositoryResult<()> {
        self.state.lock().unwrap().in_tx = true;
        Ok(())
    }

    async fn commit(&self) -> RepositoryResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_tx {
            return Err(RepositoryError::backend(std::io::Error::other("disk full")));
        }
        state.in_tx = false;
        Ok(())
    }

    async fn rollback(&self) -> RepositoryResult<()> {
        self.state.lock().unwrap().in_tx = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.state.lock().unwrap().in_tx
    }

    fn unit_lock(&self) -> UnitLock {
        self.lock.clone()
    }
}

// ── Hooks ────────────────────────────────────────────────────────

type Log = Arc<Mutex<Vec<String>>>;

struct Recorder {
    tag: &'static str,
    log: Log,
}

#[async_trait]
impl EntityFilter<Item> for Recorder {
    async fn after_load(&self, entity: &mut Item) -> RepositoryResult<()> {
        if entity.id == 0 {
            entity.qty = 1;
        }
        Ok(())
    }

    async fn before_validate(&self, entity: &mut Item, _is_new: bool) -> RepositoryResult<bool> {
        self.log.lock().unwrap().push(format!("{}:validate:{}", self.tag, entity.name));
        Ok(true)
    }

    async fn after_save(&self, record: RecordRef<'_, Item>) -> RepositoryResult<()> {
        self.log.lock().unwrap().push(format!("{}:saved:{}", self.tag, record.item.name));
        Ok(())
    }
}

/// Answers every vetoing hook with a fixed value.
struct Verdict(bool);

#[async_trait]
impl EntityFilter<Item> for Verdict {
    async fn before_validate(&self, _entity: &mut Item, _is_new: bool) -> RepositoryResult<bool> {
        Ok(self.0)
    }

    async fn before_delete(&self, _entity: &Item) -> RepositoryResult<bool> {
        Ok(self.0)
    }
}

struct NameRequired;

#[async_trait]
impl EntityValidator<Item> for NameRequired {
    async fn validate(&self, entity: &Item, _ctx: ValidationContext<'_>) -> RepositoryResult<Vec<ValidationFailure>> {
        Ok(if entity.name.is_empty() {
            vec![ValidationFailure::new("name", "is required")]
        } else {
            Vec::new()
        })
    }
}

struct QtyNonNegative;

#[async_trait]
impl EntityValidator<Item> for QtyNonNegative {
    async fn validate(&self, entity: &Item, ctx: ValidationContext<'_>) -> RepositoryResult<Vec<ValidationFailure>> {
        Ok(if ctx.changed("qty") && entity.qty < 0 {
            vec![ValidationFailure::new("qty", "must not be negative")]
        } else {
            Vec::new()
        })
    }
}

struct DenySecret;

#[async_trait]
impl AccessChecker for DenySecret {
    async fn check(&self, entities: &[&dyn DynEntity]) -> RepositoryResult<()> {
        for entity in entities {
            if entity.downcast_ref::<Item>().is_some_and(|i| i.name == "secret") {
                return Err(RepositoryError::access_denied(entity.as_node()));
            }
        }
        Ok(())
    }
}

fn repo(backend: FakeBackend, services: Services) -> Repository<Item, FakeBackend> {
    Repository::new(backend, services.into_shared())
}

fn plain(backend: FakeBackend) -> Repository<Item, FakeBackend> {
    repo(backend, Services::new())
}

fn token() -> CancellationToken {
    CancellationToken::new()
}

// ── Loads and snapshots ──────────────────────────────────────────

#[tokio::test]
async fn update_right_after_load_is_a_noop() {
    let backend = FakeBackend::seeded(&[("apple", 3)]);
    let mut repo = plain(backend.clone());
    let cancel = token();

    let item = repo.get_by_id(&1, &cancel).await.unwrap().unwrap();
    let result = repo.update(item, &cancel).await.unwrap();

    assert!(result.is_success());
    assert!(result.changes.is_empty());
    assert_eq!(backend.saves(), 0);
}

#[tokio::test]
async fn mutating_a_loaded_entity_leaves_the_snapshot_alone() {
    let backend = FakeBackend::seeded(&[("apple", 3)]);
    let mut repo = plain(backend);
    let cancel = token();

    let mut item = repo.get_by_id(&1, &cancel).await.unwrap().unwrap();
    let explicit = repo.create_snapshot(&item);
    item.name = "pear".into();

    assert_eq!(repo.snapshot(&1).unwrap().name, "apple");
    assert_eq!(explicit.name, "apple");
    assert!(repo.has_changes(&item, &cancel).await.unwrap());
}

#[tokio::test]
async fn get_returns_none_for_missing_ids() {
    let mut repo = plain(FakeBackend::seeded(&[("apple", 3)]));
    assert!(repo.get_by_id(&42, &token()).await.unwrap().is_none());
    assert!(repo.get_by_ids(&[], &token()).await.unwrap().is_empty());
}

#[tokio::test]
async fn get_all_and_get_by_ids_snapshot_everything() {
    let mut repo = plain(FakeBackend::seeded(&[("a", 1), ("b", 2), ("c", 3)]));
    let cancel = token();

    let some = repo.get_by_ids(&[1, 3], &cancel).await.unwrap();
    assert_eq!(some.iter().map(|i| i.id).collect::<Vec<_>>(), vec![1, 3]);
    assert!(repo.snapshot(&3).is_some());
    assert!(repo.snapshot(&2).is_none());

    let query = repo.query().filter(Condition::ge("qty", 2)).order_by_descending("qty");
    let all = repo.get_all(query, &cancel).await.unwrap();
    assert_eq!(all.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(), vec!["c", "b"]);
}

#[tokio::test]
async fn new_entity_runs_after_load() {
    let log = Log::default();
    let filters = FiltersManager::builder()
        .typed::<Item, _>(Recorder { tag: "r", log })
        .build();
    let repo = repo(FakeBackend::default(), Services::new().with_filters(filters));
    let item = repo.new_entity(&token()).await.unwrap();
    assert_eq!(item.qty, 1);
}

/// Fills in a price on every entity it sees.
struct DefaultPrice;

#[async_trait]
impl EntityFilter<Item> for DefaultPrice {
    async fn after_load(&self, entity: &mut Item) -> RepositoryResult<()> {
        entity.price = 9.0;
        Ok(())
    }
}

#[tokio::test]
async fn after_load_defaults_are_part_of_the_snapshot() {
    let backend = FakeBackend::seeded(&[("apple", 3)]);
    let filters = FiltersManager::builder().typed::<Item, _>(DefaultPrice).build();
    let mut repo = repo(backend.clone(), Services::new().with_filters(filters));
    let cancel = token();

    let item = repo.get_by_id(&1, &cancel).await.unwrap().unwrap();
    assert_eq!(item.price, 9.0);
    assert_eq!(repo.snapshot(&1).unwrap().price, 9.0);

    let result = repo.update(item, &cancel).await.unwrap();
    assert!(result.is_success());
    assert!(result.changes.is_empty(), "{:?}", result.changes);
    assert_eq!(backend.saves(), 0);
    assert_eq!(backend.writes(), 0);
}

// ── Mutations ────────────────────────────────────────────────────

#[tokio::test]
async fn add_assigns_key_saves_and_snapshots() {
    let backend = FakeBackend::default();
    let log = Log::default();
    let filters = FiltersManager::builder()
        .typed::<Item, _>(Recorder {
            tag: "r",
            log: Arc::clone(&log),
        })
        .build();
    let mut repo = repo(backend.clone(), Services::new().with_filters(filters));

    let result = repo.add(Item::new("apple", 3), &token()).await.unwrap();
    assert!(result.is_success());
    assert!(result.changes.is_empty());
    assert_eq!(result.entity.id, 1);
    assert_eq!(backend.row(1).unwrap().name, "apple");
    assert!(repo.snapshot(&1).is_some());
    assert_eq!(*log.lock().unwrap(), vec!["r:validate:apple", "r:saved:apple"]);
}

#[tokio::test]
async fn update_reports_modified_properties() {
    let backend = FakeBackend::seeded(&[("apple", 3)]);
    let mut repo = plain(backend.clone());
    let cancel = token();

    let mut item = repo.get_by_id(&1, &cancel).await.unwrap().unwrap();
    item.qty = 7;
    let result = repo.update(item, &cancel).await.unwrap();

    assert_eq!(result.changes.len(), 1);
    assert_eq!(result.changes[0].name, "qty");
    assert_eq!(result.changes[0].change_type, ChangeType::Modified);
    assert_eq!(backend.row(1).unwrap().qty, 7);
    assert_eq!(repo.snapshot(&1).unwrap().qty, 7);
}

#[tokio::test]
async fn update_external_uses_the_callers_base() {
    let backend = FakeBackend::seeded(&[("apple", 3)]);
    let mut repo = plain(backend.clone());

    let base = backend.row(1).unwrap();
    let mut edited = base.clone();
    edited.name = "pear".into();

    let result = repo.update_external(edited, Some(base), &token()).await.unwrap();
    assert_eq!(result.changes.len(), 1);
    assert_eq!(result.changes[0].original_value, serde_json::json!("apple"));
    assert_eq!(backend.row(1).unwrap().name, "pear");
}

#[tokio::test]
async fn update_external_of_an_unknown_entity_reports_added_properties() {
    let backend = FakeBackend::default();
    let mut repo = plain(backend.clone());
    let mut item = Item::new("fresh", 2);
    item.id = 9;

    let result = repo.update_external(item, None, &token()).await.unwrap();
    assert!(result.is_success());
    assert!(result.changes.iter().all(|c| c.change_type == ChangeType::Added));
    assert_eq!(result.changes.len(), 4);
    assert!(backend.row(9).is_some());
}

#[tokio::test]
async fn validation_failures_are_collected_from_every_validator() {
    let backend = FakeBackend::default();
    let validators = ValidatorRegistry::new()
        .typed::<Item, _>(NameRequired)
        .typed::<Item, _>(QtyNonNegative);
    let mut repo = repo(backend.clone(), Services::new().with_validators(validators));

    let result = repo.add(Item::new("", -1), &token()).await.unwrap();
    assert!(!result.is_success());
    let names: Vec<&str> = result.errors.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["name", "qty"]);
    assert_eq!(backend.saves(), 0);

    let err = result.into_result().unwrap_err();
    assert!(matches!(err, RepositoryError::Validation(ref f) if f.len() == 2));
}

#[tokio::test]
async fn last_filter_decides_the_veto() {
    let allow_last = FiltersManager::builder()
        .typed::<Item, _>(Verdict(false))
        .typed::<Item, _>(Verdict(true))
        .build();
    let mut repo_a = repo(FakeBackend::default(), Services::new().with_filters(allow_last));
    let result = repo_a.add(Item::new("apple", 1), &token()).await.unwrap();
    assert!(result.is_success());

    let veto_last = FiltersManager::builder()
        .typed::<Item, _>(Verdict(true))
        .typed::<Item, _>(Verdict(false))
        .build();
    let backend = FakeBackend::default();
    let mut repo_b = repo(backend.clone(), Services::new().with_filters(veto_last));
    let result = repo_b.add(Item::new("apple", 1), &token()).await.unwrap();
    assert!(!result.is_success());
    assert_eq!(result.errors, vec![ValidationFailure::vetoed("before_validate")]);
    assert_eq!(backend.saves(), 0);
}

#[tokio::test]
async fn delete_reports_whether_anything_was_deleted() {
    let backend = FakeBackend::seeded(&[("apple", 3)]);
    let mut repo = plain(backend.clone());
    let cancel = token();

    assert!(!repo.delete_by_id(&5, &cancel).await.unwrap());
    let ghost = Item {
        id: 5,
        ..Item::new("ghost", 0)
    };
    assert!(!repo.delete(&ghost, &cancel).await.unwrap());

    assert!(repo.delete_by_id(&1, &cancel).await.unwrap());
    assert!(backend.row(1).is_none());
    assert!(repo.snapshot(&1).is_none());
}

#[tokio::test]
async fn vetoed_delete_returns_false() {
    let backend = FakeBackend::seeded(&[("apple", 3)]);
    let filters = FiltersManager::builder().typed::<Item, _>(Verdict(false)).build();
    let mut repo = repo(backend.clone(), Services::new().with_filters(filters));
    assert!(!repo.delete_by_id(&1, &token()).await.unwrap());
    assert!(backend.row(1).is_some());
}

#[tokio::test]
async fn access_denied_propagates() {
    let backend = FakeBackend::seeded(&[("secret", 1)]);
    let mut repo = repo(backend, Services::new().with_access(DenySecret));
    let cancel = token();

    let err = repo.get_by_id(&1, &cancel).await.unwrap_err();
    assert!(matches!(err, RepositoryError::AccessDenied { ref id, .. } if id == "1"));

    let err = repo.add(Item::new("secret", 1), &cancel).await.unwrap_err();
    assert!(matches!(err, RepositoryError::AccessDenied { .. }));
}

// ── Batches ──────────────────────────────────────────────────────

#[tokio::test]
async fn batch_saves_once_and_runs_after_save_in_order() {
    let backend = FakeBackend::default();
    let log = Log::default();
    let filters = FiltersManager::builder()
        .typed::<Item, _>(Recorder {
            tag: "r",
            log: Arc::clone(&log),
        })
        .build();
    let mut repo = repo(backend.clone(), Services::new().with_filters(filters));
    let cancel = token();

    assert!(repo.begin_batch());
    assert!(!repo.begin_batch());
    for name in ["a", "b", "c"] {
        assert!(repo.add(Item::new(name, 1), &cancel).await.unwrap().is_success());
    }
    assert_eq!(backend.saves(), 0);
    log.lock().unwrap().clear();

    assert!(repo.commit_batch(&cancel).await.unwrap());
    assert_eq!(backend.saves(), 1);
    assert_eq!(backend.writes(), 3);
    assert_eq!(*log.lock().unwrap(), vec!["r:saved:a", "r:saved:b", "r:saved:c"]);
    assert!(!repo.commit_batch(&cancel).await.unwrap());
}

#[tokio::test]
async fn rollback_batch_discards_staged_changes() {
    let backend = FakeBackend::default();
    let mut repo = plain(backend.clone());
    let cancel = token();

    assert!(!repo.rollback_batch(&cancel).await.unwrap());
    repo.begin_batch();
    repo.add(Item::new("a", 1), &cancel).await.unwrap();
    assert!(repo.rollback_batch(&cancel).await.unwrap());
    assert!(!repo.in_batch());

    repo.begin_batch();
    assert!(repo.commit_batch(&cancel).await.unwrap());
    assert_eq!(backend.writes(), 0);
}

// ── Transactions, aggregates, locking ────────────────────────────

#[tokio::test]
async fn transaction_boundaries_report_failure_as_false() {
    let backend = FakeBackend::default();
    let repo = plain(backend.clone());
    let cancel = token();

    assert!(!repo.commit_transaction(&cancel).await.unwrap());
    assert!(!repo.rollback_transaction(&cancel).await.unwrap());
    assert!(repo.begin_transaction(&cancel).await.unwrap());
    assert!(repo.begin_transaction(&cancel).await.unwrap());

    backend.state.lock().unwrap().fail_tx = true;
    assert!(!repo.commit_transaction(&cancel).await.unwrap());
    assert!(repo.rollback_transaction(&cancel).await.unwrap());
}

#[tokio::test]
async fn count_and_sums() {
    let repo = plain(FakeBackend::seeded(&[("a", 2), ("b", 5)]));
    let cancel = token();

    assert_eq!(repo.count(repo.query(), &cancel).await.unwrap(), 2);
    assert_eq!(repo.sum::<i64>(repo.query(), "QTY", &cancel).await.unwrap(), 7);
    assert_eq!(repo.sum::<f64>(repo.query(), "price", &cancel).await.unwrap(), 3.0);

    let none = repo.query().filter(Condition::gt("qty", 100));
    assert_eq!(repo.sum::<i64>(none.clone(), "qty", &cancel).await.unwrap(), 0);
    assert_eq!(repo.sum::<Option<i64>>(none, "qty", &cancel).await.unwrap(), None);
}

#[tokio::test]
async fn narrow_sums_report_overflow() {
    let repo = plain(FakeBackend::seeded(&[("a", 2_000_000_000), ("b", 2_000_000_000)]));
    let cancel = token();

    assert_eq!(repo.sum::<i64>(repo.query(), "qty", &cancel).await.unwrap(), 4_000_000_000);
    let err = repo.sum::<i32>(repo.query(), "qty", &cancel).await.unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidOperation(ref m) if m.contains("qty")), "{err}");
    let err = repo.sum::<Option<i32>>(repo.query(), "qty", &cancel).await.unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidOperation(_)), "{err}");

    let one = repo.query().filter(Condition::eq("name", "a"));
    assert_eq!(repo.sum::<i32>(one, "qty", &cancel).await.unwrap(), 2_000_000_000);
}

#[tokio::test]
async fn held_lock_times_out() {
    let backend = FakeBackend::seeded(&[("a", 1)]);
    let config = RepositoryConfig {
        lock_timeout_ms: 20,
        ..Default::default()
    };
    let repo = repo(backend.clone(), Services::new().with_config(config));

    let held = backend
        .unit_lock()
        .acquire(Duration::from_secs(1), &token())
        .await
        .unwrap();
    assert!(!backend.unit_lock().is_free());
    let err = repo.count(repo.query(), &token()).await.unwrap_err();
    assert!(matches!(err, RepositoryError::LockTimeout(_)));

    drop(held);
    assert!(backend.unit_lock().is_free());
    assert_eq!(repo.count(repo.query(), &token()).await.unwrap(), 1);
}

#[tokio::test]
async fn cancelled_operations_surface_cancellation() {
    let mut repo = plain(FakeBackend::seeded(&[("a", 1)]));
    let cancel = token();
    cancel.cancel();

    let err = repo.get_by_id(&1, &cancel).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Cancelled));
    let err = repo.begin_transaction(&cancel).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Cancelled));
}

#[test]
fn config_loads_from_toml() {
    let config = RepositoryConfig::from_toml_str("lock_timeout_ms = 250\nmax_differences = 10\n").unwrap();
    assert_eq!(config.lock_timeout(), Duration::from_millis(250));
    assert_eq!(config.max_differences, Some(10));
    assert!(!config.log_changes);

    assert!(matches!(
        RepositoryConfig::from_toml_str("lock_timeout_ms = \"soon\""),
        Err(RepositoryError::Config(_))
    ));
}
