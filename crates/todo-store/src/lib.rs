use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: i64,
    pub todo: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            todo: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("todo text cannot be empty")]
    EmptyTodo,
    #[error("failed to create database directory {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl StoreError {
    /// Bad input from the caller, as opposed to a persistence failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::EmptyTodo)
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

pub struct TodoStore {
    conn: Connection,
}

impl TodoStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let store = Self {
            conn: Connection::open(db_path)?,
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
              version INTEGER PRIMARY KEY,
              name TEXT NOT NULL,
              applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;

        // AUTOINCREMENT keeps ids monotonic: a deleted id is never handed out again.
        self.apply_migration(
            1,
            "todos_table",
            r#"
            CREATE TABLE IF NOT EXISTS todos (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              todo TEXT NOT NULL,
              created_at TEXT NOT NULL,
              updated_at TEXT NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    fn apply_migration(&self, version: i64, name: &str, sql: &str) -> Result<()> {
        let applied = self
            .conn
            .query_row(
                "SELECT 1 FROM schema_migrations WHERE version = ?1 LIMIT 1",
                params![version],
                |_| Ok(()),
            )
            .optional()?;
        if applied.is_some() {
            return Ok(());
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![version, name],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn list_all(&self) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, todo, created_at, updated_at
             FROM todos
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], Task::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn create(&self, text: &str) -> Result<i64> {
        if text.trim().is_empty() {
            return Err(StoreError::EmptyTodo);
        }
        let now = now_timestamp();
        self.conn.execute(
            "INSERT INTO todos (todo, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![text, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Case-insensitive substring match; an empty query matches every task.
    ///
    /// Filtering happens here rather than with `LIKE`, which only folds ASCII
    /// and treats `%`/`_` in the query as wildcards.
    pub fn search(&self, query: &str) -> Result<Vec<Task>> {
        let needle = query.to_lowercase();
        let tasks = self.list_all()?;
        if needle.is_empty() {
            return Ok(tasks);
        }
        Ok(tasks
            .into_iter()
            .filter(|task| task.todo.to_lowercase().contains(&needle))
            .collect())
    }

    /// Returns whether a row was removed; a missing id is a silent no-op.
    pub fn delete_by_id(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM todos WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn get(&self, id: i64) -> Result<Option<Task>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, todo, created_at, updated_at FROM todos WHERE id = ?1",
                params![id],
                Task::from_row,
            )
            .optional()?)
    }

    pub fn update_text(&self, id: i64, text: &str) -> Result<bool> {
        if text.trim().is_empty() {
            return Err(StoreError::EmptyTodo);
        }
        let changed = self.conn.execute(
            "UPDATE todos SET todo = ?1, updated_at = ?2 WHERE id = ?3",
            params![text, now_timestamp(), id],
        )?;
        Ok(changed > 0)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(1) FROM todos", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
