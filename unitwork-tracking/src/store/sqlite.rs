//! SQLite row store.
//!
//! Rows are JSON documents in `rows`; references and collection
//! memberships live in `refs` and `members`. Query specs compile to SQL
//! over `json_extract` when every condition and sort key has a direct SQL
//! form, and fall back to in-memory evaluation otherwise.

use super::RowStore;
use crate::row::{ChangeSet, RelationKind, Row, RowInsert, RowUpdate};
use crate::{TrackingError, TrackingResult};
use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;
use unitwork_model::{EntitySchema, Properties, ScalarType};
use unitwork_query::{eval, Condition, FilterOperator, Predicate, QuerySpec, TextMatch};
use unitwork_repo::SaveSummary;
use unitwork_types::{KeyValue, NodeKey};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS rows (
        entity_type TEXT NOT NULL,
        key TEXT NOT NULL,
        data TEXT NOT NULL,
        PRIMARY KEY (entity_type, key)
    );

    CREATE TABLE IF NOT EXISTS refs (
        entity_type TEXT NOT NULL,
        key TEXT NOT NULL,
        name TEXT NOT NULL,
        target_type TEXT NOT NULL,
        target_key TEXT NOT NULL,
        PRIMARY KEY (entity_type, key, name)
    );
    CREATE INDEX IF NOT EXISTS idx_refs_target ON refs(target_type, target_key);

    CREATE TABLE IF NOT EXISTS members (
        entity_type TEXT NOT NULL,
        key TEXT NOT NULL,
        name TEXT NOT NULL,
        position INTEGER NOT NULL,
        member_type TEXT NOT NULL,
        member_key TEXT NOT NULL,
        PRIMARY KEY (entity_type, key, name, member_type, member_key)
    );
    CREATE INDEX IF NOT EXISTS idx_members_member ON members(member_type, member_key);

    CREATE TABLE IF NOT EXISTS relations (
        entity_type TEXT NOT NULL,
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        PRIMARY KEY (entity_type, name)
    );

    CREATE TABLE IF NOT EXISTS sequences (
        entity_type TEXT PRIMARY KEY,
        last INTEGER NOT NULL
    );
";

/// Row store backed by a single SQLite connection.
pub struct SqliteRowStore {
    conn: Arc<Mutex<Connection>>,
    in_tx: AtomicBool,
}

impl SqliteRowStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> TrackingResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> TrackingResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> TrackingResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            in_tx: AtomicBool::new(false),
        })
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> TrackingResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> TrackingResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap();
            f(&mut conn)
        })
        .await?
    }
}

// ── Rows and links ───────────────────────────────────────────────

fn decode_node(entity_type: String, key: &str) -> TrackingResult<NodeKey> {
    Ok(NodeKey::new(entity_type, KeyValue::decode(key)?))
}

fn fetch_row(conn: &Connection, node: &NodeKey) -> TrackingResult<Option<Properties>> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM rows WHERE entity_type = ?1 AND key = ?2",
            params![node.entity_type, node.key.encode()],
            |row| row.get(0),
        )
        .optional()?;
    match data {
        Some(data) => Ok(Some(serde_json::from_str(&data)?)),
        None => Ok(None),
    }
}

fn check_relation(conn: &Connection, entity_type: &str, name: &str, kind: RelationKind) -> TrackingResult<()> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT kind FROM relations WHERE entity_type = ?1 AND name = ?2",
            params![entity_type, name],
            |row| row.get(0),
        )
        .optional()?;
    match stored.as_deref().and_then(RelationKind::parse) {
        Some(stored) if stored != kind => Err(TrackingError::unsupported(
            entity_type,
            name,
            format!("persisted as a {}, used as a {}", stored.as_str(), kind.as_str()),
        )),
        _ => Ok(()),
    }
}

fn register_relation(conn: &Connection, entity_type: &str, name: &str, kind: RelationKind) -> TrackingResult<()> {
    check_relation(conn, entity_type, name, kind)?;
    conn.execute(
        "INSERT OR IGNORE INTO relations (entity_type, name, kind) VALUES (?1, ?2, ?3)",
        params![entity_type, name, kind.as_str()],
    )?;
    Ok(())
}

fn add_member(conn: &Connection, node: &NodeKey, name: &str, member: &NodeKey) -> TrackingResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO members (entity_type, key, name, position, member_type, member_key)
         VALUES (?1, ?2, ?3,
                 (SELECT COALESCE(MAX(position), -1) + 1 FROM members
                  WHERE entity_type = ?1 AND key = ?2 AND name = ?3),
                 ?4, ?5)",
        params![node.entity_type, node.key.encode(), name, member.entity_type, member.key.encode()],
    )?;
    Ok(())
}

fn set_reference(conn: &Connection, node: &NodeKey, name: &str, target: Option<&NodeKey>) -> TrackingResult<()> {
    match target {
        Some(target) => conn.execute(
            "INSERT OR REPLACE INTO refs (entity_type, key, name, target_type, target_key) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![node.entity_type, node.key.encode(), name, target.entity_type, target.key.encode()],
        )?,
        None => conn.execute(
            "DELETE FROM refs WHERE entity_type = ?1 AND key = ?2 AND name = ?3",
            params![node.entity_type, node.key.encode(), name],
        )?,
    };
    Ok(())
}

fn insert_row(conn: &Connection, insert: &RowInsert) -> TrackingResult<()> {
    let node = &insert.node;
    if fetch_row(conn, node)?.is_some() {
        return Err(TrackingError::DuplicateKey(node.clone()));
    }
    conn.execute(
        "INSERT INTO rows (entity_type, key, data) VALUES (?1, ?2, ?3)",
        params![node.entity_type, node.key.encode(), serde_json::to_string(&insert.scalars)?],
    )?;
    for (name, target) in &insert.references {
        register_relation(conn, &node.entity_type, name, RelationKind::Reference)?;
        set_reference(conn, node, name, Some(target))?;
    }
    for (name, members) in &insert.collections {
        register_relation(conn, &node.entity_type, name, RelationKind::Collection)?;
        for member in members {
            add_member(conn, node, name, member)?;
        }
    }
    if let KeyValue::Int(key) = node.key {
        conn.execute(
            "INSERT INTO sequences (entity_type, last) VALUES (?1, ?2)
             ON CONFLICT(entity_type) DO UPDATE SET last = MAX(last, excluded.last)",
            params![node.entity_type, key],
        )?;
    }
    Ok(())
}

fn update_row(conn: &Connection, update: &RowUpdate) -> TrackingResult<()> {
    let node = &update.node;
    let mut scalars = fetch_row(conn, node)?.ok_or_else(|| TrackingError::ConcurrencyConflict(node.clone()))?;
    if !update.scalars.is_empty() {
        for (name, value) in update.scalars.iter() {
            scalars.set(name, value.clone());
        }
        conn.execute(
            "UPDATE rows SET data = ?3 WHERE entity_type = ?1 AND key = ?2",
            params![node.entity_type, node.key.encode(), serde_json::to_string(&scalars)?],
        )?;
    }
    for (name, target) in &update.references {
        register_relation(conn, &node.entity_type, name, RelationKind::Reference)?;
        set_reference(conn, node, name, target.as_ref())?;
    }
    for (name, delta) in &update.collections {
        register_relation(conn, &node.entity_type, name, RelationKind::Collection)?;
        for member in &delta.removed {
            conn.execute(
                "DELETE FROM members WHERE entity_type = ?1 AND key = ?2 AND name = ?3
                 AND member_type = ?4 AND member_key = ?5",
                params![node.entity_type, node.key.encode(), name, member.entity_type, member.key.encode()],
            )?;
        }
        for member in &delta.added {
            add_member(conn, node, name, member)?;
        }
    }
    Ok(())
}

fn delete_row(conn: &Connection, node: &NodeKey) -> TrackingResult<()> {
    let key = node.key.encode();
    let removed = conn.execute(
        "DELETE FROM rows WHERE entity_type = ?1 AND key = ?2",
        params![node.entity_type, key],
    )?;
    if removed == 0 {
        return Err(TrackingError::ConcurrencyConflict(node.clone()));
    }
    conn.execute(
        "DELETE FROM refs WHERE (entity_type = ?1 AND key = ?2) OR (target_type = ?1 AND target_key = ?2)",
        params![node.entity_type, key],
    )?;
    conn.execute(
        "DELETE FROM members WHERE (entity_type = ?1 AND key = ?2) OR (member_type = ?1 AND member_key = ?2)",
        params![node.entity_type, key],
    )?;
    Ok(())
}

fn read_rows(conn: &Connection, entity_type: &str, sql: &str, values: &[SqlValue]) -> TrackingResult<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let raw = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    raw.into_iter()
        .map(|(key, data)| {
            Ok(Row {
                node: decode_node(entity_type.to_string(), &key)?,
                scalars: serde_json::from_str(&data)?,
            })
        })
        .collect()
}

// ── Query compilation ────────────────────────────────────────────

/// The `WHERE` tail of a compiled select: filter, order and page.
struct SqlPlan {
    tail: String,
    values: Vec<SqlValue>,
}

/// Types whose JSON form compares in SQL the way it compares in memory.
fn sql_comparable(scalar_type: ScalarType) -> bool {
    matches!(
        scalar_type,
        ScalarType::Int | ScalarType::Float | ScalarType::Bool | ScalarType::Text | ScalarType::Uuid
    )
}

fn column(schema: &EntitySchema, property: &str) -> Option<(String, ScalarType)> {
    if property.contains('.') {
        return None;
    }
    let descriptor = schema.property(property)?;
    let scalar_type = descriptor.scalar_type().filter(|t| sql_comparable(*t))?;
    Some((format!("json_extract(data, '$.{}')", descriptor.name), scalar_type))
}

fn sql_value(scalar_type: ScalarType, value: &Value) -> Option<SqlValue> {
    match scalar_type {
        ScalarType::Int => value.as_i64().map(SqlValue::Integer),
        ScalarType::Float => value.as_f64().map(SqlValue::Real),
        ScalarType::Bool => value.as_bool().map(|b| SqlValue::Integer(i64::from(b))),
        ScalarType::Text | ScalarType::Uuid => value.as_str().map(|s| SqlValue::Text(s.to_string())),
        _ => None,
    }
}

fn compile_condition(schema: &EntitySchema, condition: &Condition, values: &mut Vec<SqlValue>) -> Option<String> {
    let (col, scalar_type) = column(schema, &condition.property)?;
    let op = condition.operator;

    if op.takes_no_value() {
        return match op {
            FilterOperator::IsNull => Some(format!("({col} IS NULL)")),
            FilterOperator::NotNull => Some(format!("({col} IS NOT NULL)")),
            _ => None,
        };
    }

    if op.takes_list() {
        let items = condition.value.as_array()?;
        let mut bound = Vec::with_capacity(items.len());
        for item in items {
            bound.push(sql_value(scalar_type, item)?);
        }
        let negated = op == FilterOperator::NotIn;
        if bound.is_empty() {
            return Some(if negated { "1".into() } else { "0".into() });
        }
        let marks = vec!["?"; bound.len()].join(", ");
        values.extend(bound);
        return Some(if negated {
            format!("({col} IS NULL OR {col} NOT IN ({marks}))")
        } else {
            format!("COALESCE({col} IN ({marks}), 0)")
        });
    }

    if let Some((kind, ignore_case, negated)) = op.text_match() {
        if scalar_type != ScalarType::Text {
            return None;
        }
        let needle = sql_value(scalar_type, &condition.value)?;
        let (hay, pat) = if ignore_case {
            (format!("lower({col})"), "lower(?)".to_string())
        } else {
            (col.clone(), "?".to_string())
        };
        let test = match kind {
            TextMatch::Contains => {
                values.push(needle);
                format!("instr({hay}, {pat}) > 0")
            }
            TextMatch::StartsWith => {
                values.extend([needle.clone(), needle]);
                format!("substr({hay}, 1, length({pat})) = {pat}")
            }
            TextMatch::EndsWith => {
                values.extend([needle.clone(), needle.clone(), needle]);
                format!("(length({hay}) >= length({pat}) AND substr({hay}, length({hay}) - length({pat}) + 1) = {pat})")
            }
        };
        return Some(if negated {
            format!("({col} IS NOT NULL AND NOT ({test}))")
        } else {
            format!("COALESCE({test}, 0)")
        });
    }

    let bound = sql_value(scalar_type, &condition.value)?;
    let sql = match op {
        FilterOperator::Equal => format!("COALESCE({col} = ?, 0)"),
        FilterOperator::NotEqual => format!("({col} IS NULL OR {col} <> ?)"),
        FilterOperator::EqualIgnoreCase if scalar_type == ScalarType::Text => {
            format!("COALESCE(lower({col}) = lower(?), 0)")
        }
        FilterOperator::NotEqualIgnoreCase if scalar_type == ScalarType::Text => {
            format!("NOT COALESCE(lower({col}) = lower(?), 0)")
        }
        FilterOperator::Greater => format!("COALESCE({col} > ?, 0)"),
        FilterOperator::GreaterOrEqual => format!("COALESCE({col} >= ?, 0)"),
        FilterOperator::Less => format!("COALESCE({col} < ?, 0)"),
        FilterOperator::LessOrEqual => format!("COALESCE({col} <= ?, 0)"),
        _ => return None,
    };
    values.push(bound);
    Some(sql)
}

fn compile_predicate(schema: &EntitySchema, predicate: &Predicate, values: &mut Vec<SqlValue>) -> Option<String> {
    match predicate {
        Predicate::Condition(c) => compile_condition(schema, c, values),
        Predicate::All(items) | Predicate::Any(items) => {
            if items.is_empty() {
                return Some(if matches!(predicate, Predicate::All(_)) { "1".into() } else { "0".into() });
            }
            let joiner = if matches!(predicate, Predicate::All(_)) { " AND " } else { " OR " };
            let parts = items
                .iter()
                .map(|p| compile_predicate(schema, p, values))
                .collect::<Option<Vec<_>>>()?;
            Some(format!("({})", parts.join(joiner)))
        }
        Predicate::Not(inner) => Some(format!("(NOT {})", compile_predicate(schema, inner, values)?)),
    }
}

fn compile(schema: &EntitySchema, spec: &QuerySpec) -> Option<SqlPlan> {
    let mut values = vec![SqlValue::Text(schema.entity_type().to_string())];
    let mut tail = "entity_type = ?".to_string();
    if let Some(filter) = &spec.filter {
        tail.push_str(" AND ");
        tail.push_str(&compile_predicate(schema, filter, &mut values)?);
    }
    let mut order = Vec::with_capacity(spec.order.len() + 1);
    for key in &spec.order {
        let (col, _) = column(schema, &key.property)?;
        order.push(format!("{col} {}", if key.descending { "DESC" } else { "ASC" }));
    }
    order.push("rowid".to_string());
    tail.push_str(" ORDER BY ");
    tail.push_str(&order.join(", "));
    if spec.limit.is_some() || spec.offset.is_some() {
        tail.push_str(" LIMIT ? OFFSET ?");
        let limit = spec.limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let offset = i64::try_from(spec.offset.unwrap_or(0)).unwrap_or(i64::MAX);
        values.push(SqlValue::Integer(limit));
        values.push(SqlValue::Integer(offset));
    }
    Some(SqlPlan { tail, values })
}

// ── RowStore ─────────────────────────────────────────────────────

#[async_trait]
impl RowStore for SqliteRowStore {
    async fn fetch(&self, node: &NodeKey) -> TrackingResult<Option<Properties>> {
        let node = node.clone();
        self.blocking(move |conn| fetch_row(conn, &node)).await
    }

    async fn load_reference(&self, node: &NodeKey, property: &str) -> TrackingResult<Option<NodeKey>> {
        let node = node.clone();
        let property = property.to_string();
        self.blocking(move |conn| {
            check_relation(conn, &node.entity_type, &property, RelationKind::Reference)?;
            let target: Option<(String, String)> = conn
                .query_row(
                    "SELECT target_type, target_key FROM refs WHERE entity_type = ?1 AND key = ?2 AND name = ?3",
                    params![node.entity_type, node.key.encode(), property],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            target.map(|(t, k)| decode_node(t, &k)).transpose()
        })
        .await
    }

    async fn load_collection(&self, node: &NodeKey, property: &str) -> TrackingResult<Vec<NodeKey>> {
        let node = node.clone();
        let property = property.to_string();
        self.blocking(move |conn| {
            check_relation(conn, &node.entity_type, &property, RelationKind::Collection)?;
            let mut stmt = conn.prepare(
                "SELECT member_type, member_key FROM members
                 WHERE entity_type = ?1 AND key = ?2 AND name = ?3 ORDER BY position",
            )?;
            let raw = stmt
                .query_map(params![node.entity_type, node.key.encode(), property], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            raw.into_iter().map(|(t, k)| decode_node(t, &k)).collect()
        })
        .await
    }

    async fn select(&self, schema: &EntitySchema, spec: &QuerySpec) -> TrackingResult<Vec<Row>> {
        let entity_type = schema.entity_type().to_string();
        if let Some(plan) = compile(schema, spec) {
            let sql = format!("SELECT key, data FROM rows WHERE {}", plan.tail);
            return self
                .blocking(move |conn| read_rows(conn, &entity_type, &sql, &plan.values))
                .await;
        }
        debug!("Query on {} has no SQL form, evaluating in memory", entity_type);
        let rows = self
            .blocking(move |conn| {
                let values = [SqlValue::Text(entity_type.clone())];
                read_rows(
                    conn,
                    &entity_type,
                    "SELECT key, data FROM rows WHERE entity_type = ? ORDER BY rowid",
                    &values,
                )
            })
            .await?;
        Ok(eval::apply(spec, schema, rows, |row| &row.scalars))
    }

    async fn count(&self, schema: &EntitySchema, spec: &QuerySpec) -> TrackingResult<u64> {
        let Some(plan) = compile(schema, spec) else {
            return Ok(self.select(schema, spec).await?.len() as u64);
        };
        self.blocking(move |conn| {
            let sql = format!("SELECT COUNT(*) FROM (SELECT 1 FROM rows WHERE {})", plan.tail);
            let count: i64 = conn.query_row(&sql, params_from_iter(plan.values.iter()), |row| row.get(0))?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
        .await
    }

    async fn next_key(&self, entity_type: &str) -> TrackingResult<i64> {
        let entity_type = entity_type.to_string();
        self.blocking(move |conn| {
            Ok(conn.query_row(
                "INSERT INTO sequences (entity_type, last) VALUES (?1, 1)
                 ON CONFLICT(entity_type) DO UPDATE SET last = last + 1
                 RETURNING last",
                params![entity_type],
                |row| row.get(0),
            )?)
        })
        .await
    }

    async fn apply(&self, changes: &ChangeSet) -> TrackingResult<SaveSummary> {
        let changes = changes.clone();
        self.blocking(move |conn| {
            let sp = conn.savepoint()?;
            for insert in &changes.inserts {
                insert_row(&sp, insert)?;
            }
            for update in &changes.updates {
                update_row(&sp, update)?;
            }
            for node in &changes.deletes {
                delete_row(&sp, node)?;
            }
            sp.commit()?;
            let summary = SaveSummary {
                inserted: changes.inserts.len(),
                updated: changes.updates.len(),
                deleted: changes.deletes.len(),
            };
            debug!("Applied {} change(s) to sqlite store", summary.total());
            Ok(summary)
        })
        .await
    }

    async fn begin(&self) -> TrackingResult<()> {
        if self.in_tx.load(Ordering::SeqCst) {
            return Err(TrackingError::Storage("a transaction is already active".into()));
        }
        self.blocking(|conn| Ok(conn.execute_batch("BEGIN")?)).await?;
        self.in_tx.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> TrackingResult<()> {
        if !self.in_tx.load(Ordering::SeqCst) {
            return Err(TrackingError::Storage("no active transaction".into()));
        }
        self.blocking(|conn| Ok(conn.execute_batch("COMMIT")?)).await?;
        self.in_tx.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> TrackingResult<()> {
        if !self.in_tx.load(Ordering::SeqCst) {
            return Err(TrackingError::Storage("no active transaction".into()));
        }
        self.in_tx.store(false, Ordering::SeqCst);
        self.blocking(|conn| Ok(conn.execute_batch("ROLLBACK")?)).await
    }

    fn in_transaction(&self) -> bool {
        self.in_tx.load(Ordering::SeqCst)
    }
}
