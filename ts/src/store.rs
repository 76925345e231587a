//! Store - SQLite-backed persistence with a JSONL audit log and optional git sync
//!
//! Each `Record` type gets its own SQLite table named after `collection_name()`,
//! plus a companion `<collection>__index` table holding the EAV rows produced by
//! `indexed_fields()` so that `Store::list` can filter without deserializing
//! every row. Every `create`/`update` also appends the record as one line of
//! JSON to `<base_dir>/<collection>.jsonl`, which is the durable append-only
//! trail `sync()` commits to git.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::filter::{Filter, FilterOp, IndexValue};
use crate::record::Record;

/// A handle to a directory holding a SQLite database, per-collection JSONL
/// logs, and (optionally) a git working tree.
pub struct Store {
    conn: Connection,
    base_dir: PathBuf,
}

fn sql_ident(name: &str) -> Result<&str> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(StoreError::NotFound(format!("invalid collection name: {name}")))
    }
}

impl Store {
    /// Open (creating if necessary) a store rooted at `base_dir`.
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        debug!(base_dir = %base_dir.display(), "Store::open: called");
        fs::create_dir_all(&base_dir)?;
        let db_path = base_dir.join("store.sqlite3");
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Self { conn, base_dir })
    }

    /// Open an in-memory store, useful for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            base_dir: PathBuf::new(),
        })
    }

    fn ensure_table(&self, collection: &str) -> Result<()> {
        let collection = sql_ident(collection)?;
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{collection}\" (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS \"{collection}__index\" (
                id TEXT NOT NULL,
                field TEXT NOT NULL,
                value_text TEXT,
                value_num REAL,
                PRIMARY KEY (id, field)
            );
            CREATE INDEX IF NOT EXISTS \"{collection}__index_field\" ON \"{collection}__index\" (field, value_text);"
        ))?;
        Ok(())
    }

    fn jsonl_path(&self, collection: &str) -> PathBuf {
        self.base_dir.join(format!("{collection}.jsonl"))
    }

    /// Size in bytes of a collection's JSONL audit log (0 if not yet written, or
    /// if this store is in-memory).
    pub fn jsonl_size_bytes(&self, collection: &str) -> u64 {
        fs::metadata(self.jsonl_path(collection)).map(|m| m.len()).unwrap_or(0)
    }

    fn append_jsonl<T: Record>(&self, record: &T) -> Result<()> {
        if self.base_dir.as_os_str().is_empty() {
            return Ok(());
        }
        let line = serde_json::to_string(record)?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.jsonl_path(T::collection_name()))?;
        writeln!(f, "{line}")?;
        Ok(())
    }

    fn write_index<T: Record>(&self, record: &T) -> Result<()> {
        let collection = T::collection_name();
        self.conn
            .execute(&format!("DELETE FROM \"{collection}__index\" WHERE id = ?1"), params![
                record.id()
            ])?;
        for (field, value) in record.indexed_fields() {
            self.conn.execute(
                &format!(
                    "INSERT INTO \"{collection}__index\" (id, field, value_text, value_num) VALUES (?1, ?2, ?3, ?4)"
                ),
                params![record.id(), field, value.as_text(), value.as_number()],
            )?;
        }
        Ok(())
    }

    /// Insert a new record. Fails with `AlreadyExists` if the id is taken.
    pub fn create<T: Record>(&mut self, record: T) -> Result<String> {
        let collection = T::collection_name();
        debug!(collection, id = record.id(), "Store::create: called");
        self.ensure_table(collection)?;
        let data = serde_json::to_string(&record)?;
        let inserted = self.conn.execute(
            &format!("INSERT OR IGNORE INTO \"{collection}\" (id, data, updated_at) VALUES (?1, ?2, ?3)"),
            params![record.id(), data, record.updated_at()],
        )?;
        if inserted == 0 {
            return Err(StoreError::AlreadyExists(record.id().to_string()));
        }
        self.write_index(&record)?;
        self.append_jsonl(&record)?;
        Ok(record.id().to_string())
    }

    /// Fetch a record by id.
    pub fn get<T: Record>(&self, id: &str) -> Result<Option<T>> {
        let collection = T::collection_name();
        self.ensure_table(collection)?;
        let data: Option<String> = self
            .conn
            .query_row(&format!("SELECT data FROM \"{collection}\" WHERE id = ?1"), params![id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    /// Overwrite an existing record. Fails with `NotFound` if the id is unknown.
    pub fn update<T: Record>(&mut self, record: T) -> Result<()> {
        let collection = T::collection_name();
        debug!(collection, id = record.id(), "Store::update: called");
        self.ensure_table(collection)?;
        let data = serde_json::to_string(&record)?;
        let updated = self.conn.execute(
            &format!("UPDATE \"{collection}\" SET data = ?2, updated_at = ?3 WHERE id = ?1"),
            params![record.id(), data, record.updated_at()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(record.id().to_string()));
        }
        self.write_index(&record)?;
        self.append_jsonl(&record)?;
        Ok(())
    }

    /// Overwrite an existing record only if it currently matches `guard`
    /// (an indexed-field equality check evaluated against the row's current
    /// index entries, not the new record's). Returns `false` without writing
    /// anything if the guard fails to match, or if the id doesn't exist.
    ///
    /// This is how the Executor's assignment pass claims `assignee IS NULL`
    /// tasks, and how task state transitions guard on an expected prior
    /// status, without a separate locking scheme: the guard and the write
    /// happen in one statement, so two concurrent callers can't both win.
    pub fn update_if<T: Record>(&mut self, record: T, guard: &Filter) -> Result<bool> {
        let collection = T::collection_name();
        debug!(collection, id = record.id(), field = %guard.field, "Store::update_if: called");
        self.ensure_table(collection)?;

        let (cmp, use_numeric) = match guard.op {
            FilterOp::Eq => ("=", false),
            FilterOp::Ne => ("!=", false),
            FilterOp::Lt => ("<", true),
            FilterOp::Lte => ("<=", true),
            FilterOp::Gt => (">", true),
            FilterOp::Gte => (">=", true),
        };
        let value_col = if use_numeric { "value_num" } else { "value_text" };

        let data = serde_json::to_string(&record)?;
        let sql = format!(
            "UPDATE \"{collection}\" SET data = ?2, updated_at = ?3 \
             WHERE id = ?1 AND id IN (SELECT id FROM \"{collection}__index\" WHERE field = ?4 AND {value_col} {cmp} ?5)"
        );
        let updated = if use_numeric {
            self.conn
                .execute(&sql, params![record.id(), data, record.updated_at(), guard.field, guard.value.as_number()])?
        } else {
            self.conn
                .execute(&sql, params![record.id(), data, record.updated_at(), guard.field, guard.value.as_text()])?
        };
        if updated == 0 {
            debug!(collection, id = record.id(), "Store::update_if: guard did not match, no write");
            return Ok(false);
        }
        self.write_index(&record)?;
        self.append_jsonl(&record)?;
        Ok(true)
    }

    /// Overwrite an existing record only if it currently has no value at all
    /// for `field` in the index table (used for `assignee IS NULL` claims).
    pub fn update_if_absent<T: Record>(&mut self, record: T, field: &str) -> Result<bool> {
        let collection = T::collection_name();
        debug!(collection, id = record.id(), field, "Store::update_if_absent: called");
        self.ensure_table(collection)?;
        let data = serde_json::to_string(&record)?;
        let updated = self.conn.execute(
            &format!(
                "UPDATE \"{collection}\" SET data = ?2, updated_at = ?3 \
                 WHERE id = ?1 AND id NOT IN (SELECT id FROM \"{collection}__index\" WHERE field = ?4)"
            ),
            params![record.id(), data, record.updated_at(), field],
        )?;
        if updated == 0 {
            debug!(collection, id = record.id(), "Store::update_if_absent: field already present, no write");
            return Ok(false);
        }
        self.write_index(&record)?;
        self.append_jsonl(&record)?;
        Ok(true)
    }

    /// Delete a record by id. A no-op if the id is unknown.
    pub fn delete<T: Record>(&mut self, id: &str) -> Result<()> {
        let collection = T::collection_name();
        self.ensure_table(collection)?;
        self.conn
            .execute(&format!("DELETE FROM \"{collection}\" WHERE id = ?1"), params![id])?;
        self.conn
            .execute(&format!("DELETE FROM \"{collection}__index\" WHERE id = ?1"), params![id])?;
        Ok(())
    }

    /// List records of type `T` matching every filter (AND semantics).
    pub fn list<T: Record>(&self, filters: &[Filter]) -> Result<Vec<T>> {
        let collection = T::collection_name();
        self.ensure_table(collection)?;

        let mut sql = format!("SELECT data FROM \"{collection}\" WHERE 1=1");
        let mut owned_params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        for filter in filters {
            let (cmp, use_numeric) = match filter.op {
                FilterOp::Eq => ("=", false),
                FilterOp::Ne => ("!=", false),
                FilterOp::Lt => ("<", true),
                FilterOp::Lte => ("<=", true),
                FilterOp::Gt => (">", true),
                FilterOp::Gte => (">=", true),
            };
            let value_col = if use_numeric { "value_num" } else { "value_text" };
            sql.push_str(&format!(
                " AND id IN (SELECT id FROM \"{collection}__index\" WHERE field = ? AND {value_col} {cmp} ?)"
            ));
            owned_params.push(Box::new(filter.field.clone()));
            if use_numeric {
                owned_params.push(Box::new(filter.value.as_number().unwrap_or(0.0)));
            } else {
                owned_params.push(Box::new(filter.value.as_text()));
            }
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = owned_params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), |row| row.get::<_, String>(0))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    /// Recompute and rewrite the index table for every row of `T`'s collection.
    /// Returns the number of records reindexed.
    pub fn rebuild_indexes<T: Record>(&mut self) -> Result<usize> {
        let collection = T::collection_name();
        self.ensure_table(collection)?;
        let mut stmt = self.conn.prepare(&format!("SELECT data FROM \"{collection}\""))?;
        let rows: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        let mut count = 0;
        for data in rows {
            let record: T = serde_json::from_str(&data)?;
            self.write_index(&record)?;
            count += 1;
        }
        Ok(count)
    }

    /// Flush pending writes and, if `base_dir` is (or can become) a git working
    /// tree, stage and commit the JSONL audit logs. Git failures are logged and
    /// swallowed: sync must never fail a process merely because git is absent.
    pub fn sync(&self) -> Result<()> {
        if self.base_dir.as_os_str().is_empty() {
            return Ok(());
        }
        debug!(base_dir = %self.base_dir.display(), "Store::sync: called");

        if !self.base_dir.join(".git").exists() {
            let init = std::process::Command::new("git")
                .arg("init")
                .arg("-q")
                .current_dir(&self.base_dir)
                .status();
            if let Err(e) = init {
                warn!(error = %e, "Store::sync: git init failed, continuing without git");
                return Ok(());
            }
        }

        let add = std::process::Command::new("git")
            .args(["add", "-A"])
            .current_dir(&self.base_dir)
            .status();
        if add.is_err() {
            warn!("Store::sync: git add failed, continuing without git");
            return Ok(());
        }

        let _ = std::process::Command::new("git")
            .args(["commit", "-q", "-m", "taskstore sync"])
            .current_dir(&self.base_dir)
            .status();

        Ok(())
    }
}
