//! SQLite-backed local store and connection management.

use crate::database::{DatabaseError, DbResult, LocalStore};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Current schema version. Incremented when the schema changes.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Main database connection and schema manager
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open a database at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Ok(Self { conn })
    }

    /// Create a new in-memory database for testing
    pub fn in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Initialize the database schema
    pub fn initialize_schema(&self) -> DbResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS db_metadata (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO db_metadata (id, version, created_at) VALUES (1, ?1, ?2)",
            rusqlite::params![CURRENT_SCHEMA_VERSION, chrono::Utc::now().timestamp()],
        )?;

        Ok(())
    }

    /// Validate the database schema version.
    pub fn validate_schema_version(&self) -> DbResult<()> {
        let version: i32 = self
            .conn
            .query_row("SELECT version FROM db_metadata WHERE id = 1", [], |row| {
                row.get(0)
            })?;

        if version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        Err(DatabaseError::SchemaMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: version,
        })
    }

    /// Read the raw JSON text stored under `key`.
    pub fn get_value(&self, key: &str) -> DbResult<Option<Value>> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;

        raw.map(|text| {
            serde_json::from_str(&text)
                .map_err(|e| DatabaseError::Serialization(format!("{}: {}", key, e)))
        })
        .transpose()
    }

    /// Upsert the JSON value stored under `key`.
    pub fn set_value(&self, key: &str, value: &Value) -> DbResult<()> {
        let text = serde_json::to_string(value)
            .map_err(|e| DatabaseError::Serialization(format!("{}: {}", key, e)))?;

        self.conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            rusqlite::params![key, text, chrono::Utc::now().timestamp()],
        )?;

        Ok(())
    }

    /// Delete `key` if present.
    pub fn remove_value(&self, key: &str) -> DbResult<()> {
        self.conn.execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
        Ok(())
    }
}

/// [`LocalStore`] over a SQLite database; survives process restarts.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = Database::open(path)?;
        db.initialize_schema()?;
        db.validate_schema_version()?;
        Ok(Self::from_database(db))
    }

    /// In-memory store, mainly for tests.
    pub fn in_memory() -> DbResult<Self> {
        let db = Database::in_memory()?;
        db.initialize_schema()?;
        Ok(Self::from_database(db))
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    fn with_db<T>(&self, op: &str, f: impl FnOnce(&Database) -> DbResult<T>) -> DbResult<T> {
        let db = self
            .db
            .lock()
            .map_err(|_| DatabaseError::LockPoisoned(op.to_string()))?;
        f(&db)
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn get(&self, key: &str) -> DbResult<Option<Value>> {
        self.with_db("kv get", |db| db.get_value(key))
    }

    async fn set(&self, key: &str, value: Value) -> DbResult<()> {
        self.with_db("kv set", |db| db.set_value(key, &value))
    }

    async fn remove(&self, key: &str) -> DbResult<()> {
        self.with_db("kv remove", |db| db.remove_value(key))
    }
}
