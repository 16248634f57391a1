//! Shared fixtures for the tracking tests: a small project graph with a
//! reference (`owner`) and a collection (`tasks`).

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tokio_util::sync::CancellationToken;
use unitwork_model::{Collection, DynEntity, Entity, EntitySchema, GraphNode, Properties, Reference, ScalarType};
use unitwork_repo::{Repository, Services};
use unitwork_tracking::{MemoryRowStore, RowStore, TrackedBackend, TrackedSession};
use unitwork_types::{Identity, KeyValue};

// ── Schemas ──────────────────────────────────────────────────────

static PERSON_SCHEMA: LazyLock<EntitySchema> =
    LazyLock::new(|| EntitySchema::new("person").key("id", ScalarType::Int).text("name"));

static TASK_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::new("task")
        .key("id", ScalarType::Int)
        .text("title")
        .bool("done")
        .int("hours")
});

static PROJECT_SCHEMA: LazyLock<EntitySchema> = LazyLock::new(|| {
    EntitySchema::new("project")
        .key("id", ScalarType::Int)
        .text("name")
        .float("budget")
        .reference("owner", "person")
        .collection("tasks", "task")
});

// ── Entities ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Person {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub done: bool,
    pub hours: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub budget: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<Box<Person>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<Task>>,
}

pub fn person(name: &str) -> Person {
    Person {
        id: 0,
        name: name.into(),
    }
}

pub fn task(title: &str, hours: i64) -> Task {
    Task {
        id: 0,
        title: title.into(),
        done: false,
        hours,
    }
}

pub fn project(name: &str) -> Project {
    Project {
        id: 0,
        name: name.into(),
        budget: 1000.0,
        owner: None,
        tasks: None,
    }
}

impl Project {
    pub fn with_owner(mut self, owner: Person) -> Self {
        self.owner = Some(Box::new(owner));
        self
    }

    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    /// Titles of the loaded tasks, in order.
    pub fn titles(&self) -> Vec<String> {
        self.tasks
            .iter()
            .flatten()
            .map(|t| t.title.clone())
            .collect()
    }

    pub fn task(&self, title: &str) -> Task {
        self.tasks
            .iter()
            .flatten()
            .find(|t| t.title == title)
            .cloned()
            .unwrap_or_else(|| panic!("no task {title}"))
    }
}

impl GraphNode for Person {
    fn entity_type(&self) -> &'static str {
        "person"
    }
    fn key(&self) -> KeyValue {
        self.id.to_key()
    }
    fn scalars(&self) -> Properties {
        Properties::new().with("id", &self.id).with("name", &self.name)
    }
}

impl Entity for Person {
    type Id = i64;
    fn id(&self) -> i64 {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
    fn schema() -> &'static EntitySchema {
        &PERSON_SCHEMA
    }
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
            .with("done", &self.done)
            .with("hours", &self.hours)
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

impl GraphNode for Project {
    fn entity_type(&self) -> &'static str {
        "project"
    }
    fn key(&self) -> KeyValue {
        self.id.to_key()
    }
    fn scalars(&self) -> Properties {
        Properties::new()
            .with("id", &self.id)
            .with("name", &self.name)
            .with("budget", &self.budget)
    }
    fn references(&self) -> Vec<Reference<'_>> {
        vec![Reference::of("owner", self.owner.as_deref())]
    }
    fn collections(&self) -> Vec<Collection<'_>> {
        vec![Collection::of("tasks", self.tasks.as_deref())]
    }
    fn related_mut(&mut self) -> Vec<&mut dyn DynEntity> {
        let mut related: Vec<&mut dyn DynEntity> = Vec::new();
        if let Some(owner) = self.owner.as_deref_mut() {
            related.push(owner);
        }
        if let Some(tasks) = self.tasks.as_mut() {
            related.extend(tasks.iter_mut().map(|t| t as &mut dyn DynEntity));
        }
        related
    }
}

impl Entity for Project {
    type Id = i64;
    fn id(&self) -> i64 {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
    fn schema() -> &'static EntitySchema {
        &PROJECT_SCHEMA
    }
}

// ── Wiring ───────────────────────────────────────────────────────

pub type MemoryRepo<E> = Repository<E, TrackedBackend<E, MemoryRowStore>>;

pub fn memory_session() -> TrackedSession<MemoryRowStore> {
    TrackedSession::new(MemoryRowStore::new())
}

/// A project repository over `session`. The person and task schemas are
/// registered so nested includes resolve.
pub fn project_repo<S: RowStore + 'static>(
    session: &TrackedSession<S>,
    services: Arc<Services>,
) -> Repository<Project, TrackedBackend<Project, S>> {
    session.register(Person::schema());
    session.register(Task::schema());
    Repository::new(TrackedBackend::new(session.clone()), services)
}

pub fn repo_for<E: Entity, S: RowStore + 'static>(
    session: &TrackedSession<S>,
    services: Arc<Services>,
) -> Repository<E, TrackedBackend<E, S>> {
    Repository::new(TrackedBackend::new(session.clone()), services)
}

pub fn cancel() -> CancellationToken {
    CancellationToken::new()
}

/// Routes `RUST_LOG`-filtered output to the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Adds a project owned by Ada with tasks for every title, one hour
/// apart, and returns it with keys assigned.
pub async fn seed_project<S: RowStore + 'static>(
    repo: &mut Repository<Project, TrackedBackend<Project, S>>,
    name: &str,
    titles: &[&str],
) -> Project {
    let tasks = titles
        .iter()
        .enumerate()
        .map(|(i, title)| task(title, i as i64 + 1))
        .collect();
    let graph = project(name).with_owner(person("Ada")).with_tasks(tasks);
    repo.add(graph, &cancel())
        .await
        .unwrap()
        .into_result()
        .unwrap()
}

/// Loads a project with its owner and tasks.
pub async fn load_full<S: RowStore + 'static>(
    repo: &mut Repository<Project, TrackedBackend<Project, S>>,
    id: i64,
) -> Project {
    repo.get_by_id_with(&id, |q| q.include("owner").include("tasks"), &cancel())
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("project {id} missing"))
}
