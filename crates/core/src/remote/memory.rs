//! In-process remote store
//!
//! Behaves like the hosted backend as far as the board store can observe:
//! generated ids and timestamps, column defaults, foreign keys, cascading
//! board and column deletes, and the atomic board creation procedure. The
//! tables can be persisted to a JSON file, and writes can be made to fail
//! on demand.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::board::{DEFAULT_BOARD_COLOR, DEFAULT_COLUMNS, DEFAULT_COLUMN_COLOR};
use crate::error::Error;
use crate::Result;

use super::store::{Filter, Query, RemoteStore, Table};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    #[serde(default)]
    boards: Vec<Value>,
    #[serde(default)]
    columns: Vec<Value>,
    #[serde(default)]
    tasks: Vec<Value>,
    #[serde(default)]
    profiles: Vec<Value>,
}

impl Tables {
    fn rows(&self, table: Table) -> &Vec<Value> {
        match table {
            Table::Boards => &self.boards,
            Table::Columns => &self.columns,
            Table::Tasks => &self.tasks,
            Table::Profiles => &self.profiles,
        }
    }

    fn rows_mut(&mut self, table: Table) -> &mut Vec<Value> {
        match table {
            Table::Boards => &mut self.boards,
            Table::Columns => &mut self.columns,
            Table::Tasks => &mut self.tasks,
            Table::Profiles => &mut self.profiles,
        }
    }

    fn contains(&self, table: Table, id: &str) -> bool {
        self.rows(table).iter().any(|row| text(&row["id"]) == id)
    }

    /// Remove a row and everything that references it
    fn remove_cascading(&mut self, table: Table, id: &str) -> usize {
        let before = self.rows(table).len();
        self.rows_mut(table).retain(|row| text(&row["id"]) != id);
        let removed = before - self.rows(table).len();

        match table {
            Table::Boards => {
                let column_ids: Vec<String> = self
                    .columns
                    .iter()
                    .filter(|row| text(&row["board_id"]) == id)
                    .map(|row| text(&row["id"]))
                    .collect();
                for column_id in column_ids {
                    self.remove_cascading(Table::Columns, &column_id);
                }
            }
            Table::Columns => {
                self.tasks.retain(|row| text(&row["column_id"]) != id);
            }
            Table::Tasks | Table::Profiles => {}
        }
        removed
    }
}

/// Remote store kept in memory, optionally mirrored to a JSON file
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    file_path: Option<PathBuf>,
    pending_failures: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    /// Create an empty store that lives only in memory
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by the given JSON file
    ///
    /// If the file doesn't exist, it will be created on first write.
    pub async fn open(file_path: impl Into<PathBuf>) -> Result<Self> {
        let file_path = file_path.into();
        let tables = if file_path.exists() {
            let content = tokio::fs::read_to_string(&file_path).await.map_err(|e| {
                Error::Remote(format!("Failed to read store file: {}", e))
            })?;
            if content.trim().is_empty() {
                Tables::default()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    Error::Remote(format!("Failed to parse store file: {}", e))
                })?
            }
        } else {
            Tables::default()
        };

        Ok(Self {
            tables: Arc::new(RwLock::new(tables)),
            file_path: Some(file_path),
            ..Self::default()
        })
    }

    /// Make the next `count` writes fail with a remote error
    pub fn fail_next_writes(&self, count: usize) {
        self.pending_failures.store(count, AtomicOrdering::SeqCst);
    }

    /// Number of write calls received, failed ones included
    pub fn write_count(&self) -> usize {
        self.writes.load(AtomicOrdering::SeqCst)
    }

    /// Read a single row straight from the tables
    pub async fn row(&self, table: Table, id: Uuid) -> Option<Value> {
        let id = id.to_string();
        let tables = self.tables.read().await;
        tables
            .rows(table)
            .iter()
            .find(|row| text(&row["id"]) == id)
            .cloned()
    }

    fn begin_write(&self, operation: &str, table: Table) -> Result<()> {
        self.writes.fetch_add(1, AtomicOrdering::SeqCst);
        let injected = self
            .pending_failures
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok();
        if injected {
            debug!(operation, %table, "injected write failure");
            return Err(Error::Remote(format!(
                "{} on {} failed: injected failure",
                operation, table
            )));
        }
        Ok(())
    }

    async fn persist(&self, tables: &Tables) -> Result<()> {
        let Some(path) = &self.file_path else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(tables)?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Value> = tables
            .rows(table)
            .iter()
            .filter(|row| query.filters.iter().all(|filter| matches(row, filter)))
            .cloned()
            .collect();

        if let Some(order) = &query.order {
            rows.sort_by(|left, right| {
                let ordering = compare(&left[&order.column], &right[&order.column]);
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        debug!(%table, rows = rows.len(), "select");
        Ok(rows)
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value> {
        self.begin_write("insert", table)?;
        let Value::Object(fields) = row else {
            return Err(Error::Remote(format!("Row for {} must be an object", table)));
        };

        let mut tables = self.tables.write().await;
        let row = with_defaults(table, fields);
        let id = text(&row["id"]);
        if tables.contains(table, &id) {
            return Err(Error::Remote(format!(
                "duplicate key value violates unique constraint on {} ({})",
                table, id
            )));
        }
        check_references(&tables, table, &row)?;

        tables.rows_mut(table).push(row.clone());
        self.persist(&tables).await?;
        debug!(%table, %id, "insert");
        Ok(row)
    }

    async fn update(&self, table: Table, id: Uuid, patch: Value) -> Result<()> {
        self.begin_write("update", table)?;
        let Value::Object(patch) = patch else {
            return Err(Error::Remote(format!("Patch for {} must be an object", table)));
        };

        let mut tables = self.tables.write().await;
        let id = id.to_string();
        let Some(index) = tables
            .rows(table)
            .iter()
            .position(|row| text(&row["id"]) == id)
        else {
            // Like the backend, an update matching no row is not an error
            debug!(%table, %id, "update matched no rows");
            return Ok(());
        };

        let mut updated = tables.rows(table)[index].clone();
        if let Value::Object(fields) = &mut updated {
            for (key, value) in patch {
                if key != "id" {
                    fields.insert(key, value);
                }
            }
        }
        check_references(&tables, table, &updated)?;
        tables.rows_mut(table)[index] = updated;
        self.persist(&tables).await?;
        debug!(%table, %id, "update");
        Ok(())
    }

    async fn delete(&self, table: Table, id: Uuid) -> Result<()> {
        self.begin_write("delete", table)?;
        let mut tables = self.tables.write().await;
        let removed = tables.remove_cascading(table, &id.to_string());
        if removed > 0 {
            self.persist(&tables).await?;
        }
        debug!(%table, %id, removed, "delete");
        Ok(())
    }

    async fn create_board_with_columns(
        &self,
        owner: Uuid,
        name: &str,
        description: Option<&str>,
        color: &str,
    ) -> Result<Uuid> {
        self.begin_write("create_board_with_columns", Table::Boards)?;
        let mut tables = self.tables.write().await;

        let board = with_defaults(
            Table::Boards,
            object(json!({
                "name": name,
                "description": description,
                "color": color,
                "user_id": owner,
            })),
        );
        let board_id = text(&board["id"]);
        tables.boards.push(board);

        for (position, (title, column_color)) in DEFAULT_COLUMNS.iter().enumerate() {
            let column = with_defaults(
                Table::Columns,
                object(json!({
                    "title": title,
                    "board_id": board_id,
                    "position": position,
                    "color": column_color,
                })),
            );
            tables.columns.push(column);
        }

        self.persist(&tables).await?;
        debug!(%board_id, "create_board_with_columns");
        Uuid::parse_str(&board_id).map_err(|e| Error::Remote(e.to_string()))
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(fields) => fields,
        _ => Map::new(),
    }
}

/// Fill in what the backend generates or defaults on insert
fn with_defaults(table: Table, mut fields: Map<String, Value>) -> Value {
    let now = json!(Utc::now());
    let mut default = |key: &str, value: Value| {
        if fields.get(key).map_or(true, Value::is_null) {
            fields.insert(key.to_string(), value);
        }
    };

    default("id", json!(Uuid::new_v4()));
    default("created_at", now.clone());
    match table {
        Table::Boards => {
            default("color", json!(DEFAULT_BOARD_COLOR));
            default("updated_at", now);
        }
        Table::Columns => {
            default("color", json!(DEFAULT_COLUMN_COLOR));
        }
        Table::Tasks => {
            default("priority", json!("medium"));
            default("labels", json!([]));
            default("updated_at", now);
        }
        Table::Profiles => {
            default("updated_at", now);
        }
    }
    Value::Object(fields)
}

fn check_references(tables: &Tables, table: Table, row: &Value) -> Result<()> {
    let reference = match table {
        Table::Columns => Some(("board_id", Table::Boards)),
        Table::Tasks => Some(("column_id", Table::Columns)),
        Table::Boards | Table::Profiles => None,
    };
    if let Some((key, parent)) = reference {
        let parent_id = text(&row[key]);
        if !tables.contains(parent, &parent_id) {
            return Err(Error::Remote(format!(
                "insert or update on {} violates foreign key {} ({})",
                table, key, parent_id
            )));
        }
    }
    Ok(())
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn matches(row: &Value, filter: &Filter) -> bool {
    match filter {
        Filter::Eq { column, value } => text(&row[column]) == *value,
        Filter::In { column, values } => {
            let actual = text(&row[column]);
            values.iter().any(|value| *value == actual)
        }
    }
}

fn compare(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => {
            let l = l.as_f64().unwrap_or_default();
            let r = r.as_f64().unwrap_or_default();
            l.partial_cmp(&r).unwrap_or(Ordering::Equal)
        }
        (Value::String(l), Value::String(r)) => {
            match (
                DateTime::parse_from_rfc3339(l),
                DateTime::parse_from_rfc3339(r),
            ) {
                (Ok(l), Ok(r)) => l.cmp(&r),
                _ => l.cmp(r),
            }
        }
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        _ => text(left).cmp(&text(right)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn board_with_columns(store: &MemoryStore) -> (Uuid, Vec<Value>) {
        let board_id = store
            .create_board_with_columns(Uuid::new_v4(), "Roadmap", None, "#000000")
            .await
            .unwrap();
        let columns = store
            .select(
                Table::Columns,
                &Query::new().eq("board_id", board_id).order_by("position", true),
            )
            .await
            .unwrap();
        (board_id, columns)
    }

    #[tokio::test]
    async fn test_create_board_with_default_columns() {
        let store = MemoryStore::new();
        let (board_id, columns) = board_with_columns(&store).await;

        let titles: Vec<&str> = columns.iter().filter_map(|c| c["title"].as_str()).collect();
        assert_eq!(titles, vec!["To Do", "In Progress", "Done"]);

        let board = store.row(Table::Boards, board_id).await.unwrap();
        assert_eq!(board["name"], "Roadmap");
        assert_eq!(board["color"], "#000000");
    }

    #[tokio::test]
    async fn test_insert_applies_defaults_and_foreign_keys() {
        let store = MemoryStore::new();
        let (_, columns) = board_with_columns(&store).await;

        let task = store
            .insert(
                Table::Tasks,
                json!({ "title": "Task", "column_id": columns[0]["id"], "position": 0 }),
            )
            .await
            .unwrap();
        assert_eq!(task["priority"], "medium");
        assert_eq!(task["labels"], json!([]));
        assert!(task["id"].is_string());

        let orphan = store
            .insert(
                Table::Tasks,
                json!({ "title": "Orphan", "column_id": Uuid::new_v4(), "position": 0 }),
            )
            .await;
        assert!(matches!(orphan, Err(Error::Remote(_))));
    }

    #[tokio::test]
    async fn test_delete_board_cascades() {
        let store = MemoryStore::new();
        let (board_id, columns) = board_with_columns(&store).await;
        store
            .insert(
                Table::Tasks,
                json!({ "title": "Task", "column_id": columns[1]["id"], "position": 0 }),
            )
            .await
            .unwrap();

        store.delete(Table::Boards, board_id).await.unwrap();

        for table in [Table::Boards, Table::Columns, Table::Tasks] {
            let rows = store.select(table, &Query::new()).await.unwrap();
            assert!(rows.is_empty(), "{} should be empty", table);
        }
    }

    #[tokio::test]
    async fn test_injected_failures_affect_writes_only() {
        let store = MemoryStore::new();
        let (_, columns) = board_with_columns(&store).await;
        let column_id = Uuid::parse_str(columns[0]["id"].as_str().unwrap()).unwrap();

        store.fail_next_writes(1);
        let failed = store
            .update(Table::Columns, column_id, json!({ "title": "Renamed" }))
            .await;
        assert!(matches!(failed, Err(Error::Remote(_))));
        assert_eq!(columns.len(), store.select(Table::Columns, &Query::new()).await.unwrap().len());

        store
            .update(Table::Columns, column_id, json!({ "title": "Renamed" }))
            .await
            .unwrap();
        let row = store.row(Table::Columns, column_id).await.unwrap();
        assert_eq!(row["title"], "Renamed");
    }

    #[tokio::test]
    async fn test_order_by_timestamp_descending() {
        let store = MemoryStore::new();
        for (name, created_at) in [
            ("old", "2024-01-01T00:00:00Z"),
            ("new", "2024-01-01T00:00:00.5Z"),
        ] {
            store
                .insert(
                    Table::Boards,
                    json!({ "name": name, "user_id": Uuid::new_v4(), "created_at": created_at }),
                )
                .await
                .unwrap();
        }

        let rows = store
            .select(Table::Boards, &Query::new().order_by("created_at", false))
            .await
            .unwrap();
        let names: Vec<&str> = rows.iter().filter_map(|r| r["name"].as_str()).collect();
        assert_eq!(names, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn test_file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = MemoryStore::open(path.clone()).await.unwrap();
        let (board_id, _) = board_with_columns(&store).await;

        let reopened = MemoryStore::open(path).await.unwrap();
        assert!(reopened.row(Table::Boards, board_id).await.is_some());
        let columns = reopened.select(Table::Columns, &Query::new()).await.unwrap();
        assert_eq!(columns.len(), 3);
    }
}
