//! Storage backend: one verb set over either an embedded SQLite file or a
//! networked Postgres database.
//!
//! Call sites write SQL with `?` placeholders; the Postgres arm rewrites
//! them to `$1..$n`. The upsert form
//! `INSERT … ON CONFLICT(…) DO UPDATE SET …` is accepted verbatim by both
//! engines, as is `INSERT … RETURNING id`. Timestamps are RFC 3339 TEXT in
//! both dialects so rows decode identically.

use std::collections::HashMap;

use lineage_common::DatabaseConfig;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row};
use thiserror::Error;
use tracing::{info, warn};

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

/// A dynamically typed bind parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::Real(v) => Some(*v as i64),
            SqlValue::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Real(v) => Some(*v),
            SqlValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// SQLite has no bool type; integers 0/1 count.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(v) => Some(*v),
            SqlValue::Int(v) => Some(*v != 0),
            _ => None,
        }
    }
}

impl From<Option<String>> for SqlValue {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(s) => SqlValue::Text(s),
            None => SqlValue::Null,
        }
    }
}

pub type SqlRow = HashMap<String, SqlValue>;

enum DbPool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Connect per config. A networked config is attempted first; on
    /// connection failure the embedded backend takes over with a warning,
    /// so a flaky Postgres never blocks research.
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self> {
        if cfg.is_networked() {
            match Self::connect_postgres(cfg).await {
                Ok(db) => {
                    info!(host = cfg.host.as_str(), database = cfg.database.as_str(), "Connected to Postgres");
                    return Ok(db);
                }
                Err(e) => {
                    warn!(error = %e, "Postgres connection failed, falling back to SQLite");
                }
            }
        }
        Self::open_sqlite(&cfg.sqlite_path).await
    }

    /// Connect to the networked backend only, no embedded fallback.
    /// Used where silently writing to a different database would be worse
    /// than failing (e.g. store migration).
    pub async fn connect_postgres(cfg: &DatabaseConfig) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .database(&cfg.database)
            .username(&cfg.user)
            .password(&cfg.password);
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect_with(options)
            .await?;
        Ok(Self { pool: DbPool::Postgres(pool) })
    }

    pub async fn open_sqlite(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self { pool: DbPool::Sqlite(pool) })
    }

    pub fn dialect(&self) -> Dialect {
        match self.pool {
            DbPool::Sqlite(_) => Dialect::Sqlite,
            DbPool::Postgres(_) => Dialect::Postgres,
        }
    }

    /// Run a statement; returns affected row count.
    pub async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        match &self.pool {
            DbPool::Sqlite(pool) => {
                let query = bind_sqlite(sqlx::query(sql), params);
                Ok(query.execute(pool).await?.rows_affected())
            }
            DbPool::Postgres(pool) => {
                let sql = rewrite_placeholders(sql);
                let query = bind_postgres(sqlx::query(&sql), params);
                Ok(query.execute(pool).await?.rows_affected())
            }
        }
    }

    pub async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        match &self.pool {
            DbPool::Sqlite(pool) => {
                let query = bind_sqlite(sqlx::query(sql), params);
                let rows = query.fetch_all(pool).await?;
                Ok(rows.iter().map(sqlite_row_to_map).collect())
            }
            DbPool::Postgres(pool) => {
                let sql = rewrite_placeholders(sql);
                let query = bind_postgres(sqlx::query(&sql), params);
                let rows = query.fetch_all(pool).await?;
                Ok(rows.iter().map(postgres_row_to_map).collect())
            }
        }
    }

    pub async fn fetch_one(&self, sql: &str, params: &[SqlValue]) -> Result<Option<SqlRow>> {
        match &self.pool {
            DbPool::Sqlite(pool) => {
                let query = bind_sqlite(sqlx::query(sql), params);
                let row = query.fetch_optional(pool).await?;
                Ok(row.as_ref().map(sqlite_row_to_map))
            }
            DbPool::Postgres(pool) => {
                let sql = rewrite_placeholders(sql);
                let query = bind_postgres(sqlx::query(&sql), params);
                let row = query.fetch_optional(pool).await?;
                Ok(row.as_ref().map(postgres_row_to_map))
            }
        }
    }

    pub async fn close(&self) {
        match &self.pool {
            DbPool::Sqlite(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
        }
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;
type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

fn bind_sqlite<'q>(mut query: SqliteQuery<'q>, params: &'q [SqlValue]) -> SqliteQuery<'q> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Bool(v) => query.bind(*v),
        };
    }
    query
}

fn bind_postgres<'q>(mut query: PgQuery<'q>, params: &'q [SqlValue]) -> PgQuery<'q> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Bool(v) => query.bind(*v),
        };
    }
    query
}

/// `?` → `$1..$n`. Call-site SQL never embeds literal question marks.
fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0u32;
    for ch in sql.chars() {
        if ch == '?' {
            n += 1;
            out.push('$');
            out.push_str(&n.to_string());
        } else {
            out.push(ch);
        }
    }
    out
}

fn sqlite_row_to_map(row: &SqliteRow) -> SqlRow {
    let mut map = HashMap::with_capacity(row.columns().len());
    for column in row.columns() {
        let idx = column.ordinal();
        let value = decode_sqlite(row, idx);
        map.insert(column.name().to_string(), value);
    }
    map
}

fn decode_sqlite(row: &SqliteRow, idx: usize) -> SqlValue {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return match v {
            Some(i) => SqlValue::Int(i),
            None => SqlValue::Null,
        };
    }
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
        return SqlValue::Real(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<bool>, _>(idx) {
        return SqlValue::Bool(v);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return match v {
            Some(s) => SqlValue::Text(s),
            None => SqlValue::Null,
        };
    }
    SqlValue::Null
}

fn postgres_row_to_map(row: &PgRow) -> SqlRow {
    let mut map = HashMap::with_capacity(row.columns().len());
    for column in row.columns() {
        let idx = column.ordinal();
        let value = decode_postgres(row, idx);
        map.insert(column.name().to_string(), value);
    }
    map
}

fn decode_postgres(row: &PgRow, idx: usize) -> SqlValue {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return match v {
            Some(i) => SqlValue::Int(i),
            None => SqlValue::Null,
        };
    }
    if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
        return SqlValue::Int(v as i64);
    }
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
        return SqlValue::Real(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
        return SqlValue::Real(v as f64);
    }
    if let Ok(Some(v)) = row.try_get::<Option<bool>, _>(idx) {
        return SqlValue::Bool(v);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return match v {
            Some(s) => SqlValue::Text(s),
            None => SqlValue::Null,
        };
    }
    SqlValue::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_rewrite_numbers_in_order() {
        assert_eq!(
            rewrite_placeholders("INSERT INTO t (a, b) VALUES (?, ?) ON CONFLICT(a) DO UPDATE SET b = ?"),
            "INSERT INTO t (a, b) VALUES ($1, $2) ON CONFLICT(a) DO UPDATE SET b = $3"
        );
        assert_eq!(rewrite_placeholders("SELECT 1"), "SELECT 1");
    }

    #[tokio::test]
    async fn sqlite_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::open_sqlite(path.to_str().unwrap()).await.unwrap();
        assert_eq!(db.dialect(), Dialect::Sqlite);

        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, score REAL, ok BOOLEAN)", &[])
            .await
            .unwrap();
        db.execute(
            "INSERT INTO t (name, score, ok) VALUES (?, ?, ?)",
            &[SqlValue::Text("dubois".into()), SqlValue::Real(92.5), SqlValue::Bool(true)],
        )
        .await
        .unwrap();

        let row = db
            .fetch_one("SELECT * FROM t WHERE name = ?", &[SqlValue::Text("dubois".into())])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["name"].as_str(), Some("dubois"));
        assert_eq!(row["score"].as_f64(), Some(92.5));
        assert_eq!(row["ok"].as_bool(), Some(true));

        let missing = db
            .fetch_one("SELECT * FROM t WHERE name = ?", &[SqlValue::Text("nobody".into())])
            .await
            .unwrap();
        assert!(missing.is_none());
        db.close().await;
    }
}
