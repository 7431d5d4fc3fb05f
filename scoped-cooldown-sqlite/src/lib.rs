//! SQLite cooldown store for `scoped-cooldown` (companion crate).
//!
//! Layout: one table per bucket dimension, `{prefix}_user`, `{prefix}_guild`, `{prefix}_channel`,
//! `{prefix}_category` and `{prefix}_role`. Each row is one scope keyed by `user_id` plus the
//! dimension's id column; each registered action is a nullable `TEXT` column holding the encoded
//! record. Action columns are added on first use.
//!
//! All statements run on one connection through `spawn_blocking`. Conditional writes run inside
//! `BEGIN IMMEDIATE`, so they also hold across processes sharing the database file.

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, ToSql, TransactionBehavior};
use scoped_cooldown::{
    BucketDimension, CooldownKey, CooldownRecord, CooldownStore, ScopeKey, StoreError,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Default database file.
pub const DEFAULT_PATH: &str = "CustomCooldowns.db";
/// Default table prefix.
pub const DEFAULT_TABLE_PREFIX: &str = "cooldowns";

/// Settings for [`SqliteCooldownStore::open`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file; created if missing.
    pub path: PathBuf,
    /// Prefix for the five dimension tables.
    pub table_prefix: String,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_PATH),
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
            busy_timeout_ms: 5_000,
        }
    }
}

/// Cooldown store backed by a SQLite database.
#[derive(Clone)]
pub struct SqliteCooldownStore {
    conn: Arc<Mutex<Connection>>,
    prefix: Arc<str>,
    // slots known to exist, so ALTER TABLE runs at most once per process
    slots: Arc<Mutex<HashSet<(BucketDimension, String)>>>,
}

impl std::fmt::Debug for SqliteCooldownStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCooldownStore")
            .field("prefix", &self.prefix)
            .field("conn", &"<rusqlite::Connection>")
            .finish()
    }
}

impl SqliteCooldownStore {
    /// Open (or create) the database described by `config`.
    pub fn open(config: &SqliteConfig) -> Result<Self, StoreError> {
        let conn = Connection::open(&config.path).map_err(StoreError::backend)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(StoreError::backend)?;
        // WAL for concurrent readers across processes
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(StoreError::backend)?;
        Self::from_connection(conn, &config.table_prefix)
    }

    /// Private in-memory database, gone when the store is dropped.
    pub fn open_in_memory(prefix: &str) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::backend)?;
        Self::from_connection(conn, prefix)
    }

    /// Use an existing connection; creates the dimension tables if missing.
    pub fn from_connection(conn: Connection, prefix: &str) -> Result<Self, StoreError> {
        if prefix.is_empty() || prefix.contains('\0') {
            return Err(StoreError::backend(format!("invalid table prefix {prefix:?}")));
        }
        conn.execute_batch(&schema(prefix)).map_err(StoreError::backend)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            prefix: Arc::from(prefix),
            slots: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Table prefix in use.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Raw payload stored for `key`, bypassing the decoder.
    pub async fn raw(&self, key: &CooldownKey) -> Result<Option<String>, StoreError> {
        let sql = KeySql::new(&self.prefix, key);
        self.run(move |conn| sql.select(conn)).await
    }

    /// Store `raw` for `key` as-is, bypassing the encoder.
    pub async fn put_raw(
        &self,
        key: &CooldownKey,
        raw: impl Into<String>,
    ) -> Result<(), StoreError> {
        self.ensure_slot(key.dimension(), &key.action).await?;
        let sql = KeySql::new(&self.prefix, key);
        let raw = raw.into();
        self.run(move |conn| sql.write(conn, &raw)).await
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard =
                conn.lock().map_err(|_| StoreError::backend("sqlite connection lock poisoned"))?;
            op(&mut guard)
        })
        .await
        .map_err(StoreError::backend)?
    }

    fn slot_known(&self, dimension: BucketDimension, action: &str) -> bool {
        self.slots
            .lock()
            .map(|slots| slots.contains(&(dimension, action.to_string())))
            .unwrap_or(false)
    }
}

#[async_trait]
impl CooldownStore for SqliteCooldownStore {
    async fn ensure_slot(
        &self,
        dimension: BucketDimension,
        action: &str,
    ) -> Result<(), StoreError> {
        if self.slot_known(dimension, action) {
            return Ok(());
        }
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} TEXT DEFAULT NULL",
            quote(&table_name(&self.prefix, dimension)),
            quote(action)
        );
        let added = self
            .run(move |conn| match conn.execute(&sql, []) {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(_, Some(msg)))
                    if msg.contains("duplicate column name") =>
                {
                    Ok(false)
                }
                Err(e) => Err(StoreError::backend(e)),
            })
            .await?;
        if added {
            debug!(
                target: "scoped_cooldown::sqlite",
                dimension = %dimension,
                action,
                "added cooldown column"
            );
        }
        if let Ok(mut slots) = self.slots.lock() {
            slots.insert((dimension, action.to_string()));
        }
        Ok(())
    }

    async fn ensure_scope_row(&self, scope: &ScopeKey) -> Result<(), StoreError> {
        let ids = identity(scope);
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
            quote(&table_name(&self.prefix, scope.dimension)),
            ids.iter().map(|(col, _)| quote(col)).collect::<Vec<_>>().join(", "),
            placeholders(1..=ids.len()),
        );
        self.run(move |conn| {
            let values: Vec<i64> = ids.iter().map(|(_, id)| *id).collect();
            conn.execute(&sql, rusqlite::params_from_iter(values))
                .map_err(StoreError::backend)?;
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &CooldownKey) -> Result<Option<CooldownRecord>, StoreError> {
        match self.raw(key).await? {
            Some(raw) => Ok(Some(CooldownRecord::decode(&raw)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &CooldownKey, record: &CooldownRecord) -> Result<(), StoreError> {
        let raw = record.encode()?;
        let sql = KeySql::new(&self.prefix, key);
        self.run(move |conn| sql.write(conn, &raw)).await
    }

    async fn clear(&self, key: &CooldownKey) -> Result<(), StoreError> {
        let sql = KeySql::new(&self.prefix, key);
        self.run(move |conn| sql.clear(conn)).await
    }

    async fn compare_and_swap(
        &self,
        key: &CooldownKey,
        expected: Option<&CooldownRecord>,
        next: Option<&CooldownRecord>,
    ) -> Result<bool, StoreError> {
        let expected = expected.cloned();
        let encoded = next.map(CooldownRecord::encode).transpose()?;
        let sql = KeySql::new(&self.prefix, key);
        self.run(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(StoreError::backend)?;
            let current = sql
                .select(&tx)?
                .and_then(|raw| CooldownRecord::decode(&raw).ok());
            if current != expected {
                return Ok(false); // Race detected; dropping tx rolls back
            }
            match &encoded {
                Some(raw) => sql.write(&tx, raw)?,
                None => sql.clear(&tx)?,
            }
            tx.commit().map_err(StoreError::backend)?;
            Ok(true)
        })
        .await
    }
}

/// Prepared SQL text for one key.
struct KeySql {
    select: String,
    upsert: String,
    clear: String,
    ids: Vec<i64>,
}

impl KeySql {
    fn new(prefix: &str, key: &CooldownKey) -> Self {
        let table = quote(&table_name(prefix, key.dimension()));
        let column = quote(&key.action);
        let identity = identity(&key.scope);
        let n = identity.len();
        let cols: Vec<String> = identity.iter().map(|(c, _)| quote(c)).collect();
        let filter = cols
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{c} = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");

        Self {
            select: format!("SELECT {column} FROM {table} WHERE {filter}"),
            upsert: format!(
                "INSERT INTO {table} ({}, {column}) VALUES ({}) \
                 ON CONFLICT ({}) DO UPDATE SET {column} = excluded.{column}",
                cols.join(", "),
                placeholders(1..=n + 1),
                cols.join(", "),
            ),
            clear: format!("UPDATE {table} SET {column} = NULL WHERE {filter}"),
            ids: identity.into_iter().map(|(_, id)| id).collect(),
        }
    }

    fn id_params(&self) -> Vec<&dyn ToSql> {
        self.ids.iter().map(|id| id as &dyn ToSql).collect()
    }

    fn select(&self, conn: &Connection) -> Result<Option<String>, StoreError> {
        conn.query_row(&self.select, self.id_params().as_slice(), |row| {
            row.get::<_, Option<String>>(0)
        })
        .optional()
        .map(Option::flatten)
        .map_err(StoreError::backend)
    }

    fn write(&self, conn: &Connection, raw: &str) -> Result<(), StoreError> {
        let mut params = self.id_params();
        params.push(&raw);
        conn.execute(&self.upsert, params.as_slice()).map_err(StoreError::backend)?;
        Ok(())
    }

    fn clear(&self, conn: &Connection) -> Result<(), StoreError> {
        conn.execute(&self.clear, self.id_params().as_slice()).map_err(StoreError::backend)?;
        Ok(())
    }
}

fn schema(prefix: &str) -> String {
    BucketDimension::ALL
        .iter()
        .map(|&dimension| {
            let table = quote(&table_name(prefix, dimension));
            match dimension.scope_column() {
                None => format!(
                    "CREATE TABLE IF NOT EXISTS {table} (\"user_id\" INTEGER NOT NULL PRIMARY KEY);"
                ),
                Some(col) => format!(
                    "CREATE TABLE IF NOT EXISTS {table} (\
                     \"user_id\" INTEGER NOT NULL, \"{col}\" INTEGER NOT NULL, \
                     PRIMARY KEY (\"user_id\", \"{col}\"));"
                ),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn table_name(prefix: &str, dimension: BucketDimension) -> String {
    format!("{prefix}_{}", dimension.as_str())
}

/// Identity columns and values of a scope row.
fn identity(scope: &ScopeKey) -> Vec<(&'static str, i64)> {
    let mut ids = vec![("user_id", to_sql_id(scope.user_id))];
    if let Some(col) = scope.dimension.scope_column() {
        ids.push((col, to_sql_id(scope.scope_id)));
    }
    ids
}

/// SQLite integers are signed; ids are stored by bit pattern.
fn to_sql_id(id: u64) -> i64 {
    id as i64
}

/// Double-quote an identifier, doubling embedded quotes.
fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn placeholders(range: std::ops::RangeInclusive<usize>) -> String {
    range.map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}
