//! Durable record of which `(person, source)` pairs have been searched.
//!
//! Reads go through an in-memory cache populated once from the table and
//! updated by writes. The cache is eventually consistent across processes;
//! that is enough because upserts are idempotent and the orchestrator
//! tolerates a rare re-search.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::backend::{Database, Dialect, Result, SqlValue};

const CREATE_TABLE_SQLITE: &str = "
CREATE TABLE IF NOT EXISTS search_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    person_id TEXT NOT NULL,
    source_key TEXT NOT NULL,
    searched_at TEXT NOT NULL,
    result_count INTEGER DEFAULT 0,
    had_error BOOLEAN DEFAULT FALSE,
    error_message TEXT,
    UNIQUE(person_id, source_key)
)";

const CREATE_TABLE_POSTGRES: &str = "
CREATE TABLE IF NOT EXISTS search_log (
    id SERIAL PRIMARY KEY,
    person_id TEXT NOT NULL,
    source_key TEXT NOT NULL,
    searched_at TEXT NOT NULL,
    result_count INTEGER DEFAULT 0,
    had_error BOOLEAN DEFAULT FALSE,
    error_message TEXT,
    UNIQUE(person_id, source_key)
)";

#[derive(Debug, Default)]
struct Cache {
    loaded: bool,
    by_person: HashMap<String, HashSet<String>>,
}

pub struct SearchLog {
    db: Arc<Database>,
    cache: Mutex<Cache>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchLogStats {
    pub total_people: u64,
    pub total_searches: u64,
    pub by_source: Vec<(String, u64)>,
}

impl SearchLog {
    pub async fn new(db: Arc<Database>) -> Result<Self> {
        let create = match db.dialect() {
            Dialect::Sqlite => CREATE_TABLE_SQLITE,
            Dialect::Postgres => CREATE_TABLE_POSTGRES,
        };
        db.execute(create, &[]).await?;
        Ok(Self { db, cache: Mutex::new(Cache::default()) })
    }

    async fn ensure_cache(&self, cache: &mut Cache) -> Result<()> {
        if cache.loaded {
            return Ok(());
        }
        let rows = self.db.fetch_all("SELECT person_id, source_key FROM search_log", &[]).await?;
        for row in rows {
            let (Some(person_id), Some(source_key)) =
                (row["person_id"].as_str(), row["source_key"].as_str())
            else {
                continue;
            };
            cache
                .by_person
                .entry(person_id.to_string())
                .or_default()
                .insert(source_key.to_string());
        }
        cache.loaded = true;
        Ok(())
    }

    pub async fn is_processed(&self, person_id: &str, source_key: &str) -> Result<bool> {
        let mut cache = self.cache.lock().await;
        self.ensure_cache(&mut cache).await?;
        Ok(cache
            .by_person
            .get(person_id)
            .map(|sources| sources.contains(source_key))
            .unwrap_or(false))
    }

    /// Upsert a search attempt; a collision refreshes `searched_at` and the
    /// result fields.
    pub async fn mark_processed(
        &self,
        person_id: &str,
        source_key: &str,
        result_count: i64,
        had_error: bool,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut cache = self.cache.lock().await;
        self.db
            .execute(
                "INSERT INTO search_log (person_id, source_key, searched_at, result_count, had_error, error_message)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT (person_id, source_key)
                 DO UPDATE SET searched_at = excluded.searched_at,
                               result_count = excluded.result_count,
                               had_error = excluded.had_error,
                               error_message = excluded.error_message",
                &[
                    SqlValue::Text(person_id.to_string()),
                    SqlValue::Text(source_key.to_string()),
                    SqlValue::Text(Utc::now().to_rfc3339()),
                    SqlValue::Int(result_count),
                    SqlValue::Bool(had_error),
                    error_message.map(str::to_string).into(),
                ],
            )
            .await?;

        cache
            .by_person
            .entry(person_id.to_string())
            .or_default()
            .insert(source_key.to_string());
        Ok(())
    }

    /// Set difference of `all_sources` against what this person already has.
    pub async fn unprocessed_sources(
        &self,
        person_id: &str,
        all_sources: &[String],
    ) -> Result<Vec<String>> {
        let mut cache = self.cache.lock().await;
        self.ensure_cache(&mut cache).await?;
        let done = cache.by_person.get(person_id);
        Ok(all_sources
            .iter()
            .filter(|source| done.map(|d| !d.contains(*source)).unwrap_or(true))
            .cloned()
            .collect())
    }

    pub async fn stats(&self) -> Result<SearchLogStats> {
        let mut stats = SearchLogStats::default();

        if let Some(row) = self
            .db
            .fetch_one("SELECT COUNT(DISTINCT person_id) AS cnt FROM search_log", &[])
            .await?
        {
            stats.total_people = row["cnt"].as_i64().unwrap_or(0) as u64;
        }
        if let Some(row) = self.db.fetch_one("SELECT COUNT(*) AS cnt FROM search_log", &[]).await? {
            stats.total_searches = row["cnt"].as_i64().unwrap_or(0) as u64;
        }
        let rows = self
            .db
            .fetch_all(
                "SELECT source_key, COUNT(*) AS cnt FROM search_log GROUP BY source_key ORDER BY cnt DESC",
                &[],
            )
            .await?;
        for row in rows {
            if let (Some(source), Some(count)) = (row["source_key"].as_str(), row["cnt"].as_i64()) {
                stats.by_source.push((source.to_string(), count as u64));
            }
        }
        Ok(stats)
    }

    /// Drop all history; the next run re-searches everything.
    pub async fn clear(&self) -> Result<()> {
        let mut cache = self.cache.lock().await;
        self.db.execute("DELETE FROM search_log", &[]).await?;
        *cache = Cache::default();
        Ok(())
    }

    pub async fn refresh_cache(&self) -> Result<()> {
        let mut cache = self.cache.lock().await;
        *cache = Cache::default();
        self.ensure_cache(&mut cache).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_log() -> (tempfile::TempDir, SearchLog) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.db");
        let db = Database::open_sqlite(path.to_str().unwrap()).await.unwrap();
        let log = SearchLog::new(Arc::new(db)).await.unwrap();
        (dir, log)
    }

    #[tokio::test]
    async fn mark_and_query() {
        let (_dir, log) = test_log().await;
        assert!(!log.is_processed("p1", "geneanet").await.unwrap());

        log.mark_processed("p1", "geneanet", 3, false, None).await.unwrap();
        assert!(log.is_processed("p1", "geneanet").await.unwrap());
        assert!(!log.is_processed("p1", "findagrave").await.unwrap());
        assert!(!log.is_processed("p2", "geneanet").await.unwrap());
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let (_dir, log) = test_log().await;
        log.mark_processed("p1", "geneanet", 0, true, Some("timeout")).await.unwrap();
        log.mark_processed("p1", "geneanet", 5, false, None).await.unwrap();

        let stats = log.stats().await.unwrap();
        assert_eq!(stats.total_searches, 1);
        assert_eq!(stats.total_people, 1);
        assert_eq!(stats.by_source, vec![("geneanet".to_string(), 1)]);
    }

    #[tokio::test]
    async fn unprocessed_is_set_difference() {
        let (_dir, log) = test_log().await;
        let all = vec!["findagrave".to_string(), "geneanet".to_string(), "wikitree".to_string()];
        log.mark_processed("p1", "geneanet", 1, false, None).await.unwrap();

        let remaining = log.unprocessed_sources("p1", &all).await.unwrap();
        assert_eq!(remaining, vec!["findagrave".to_string(), "wikitree".to_string()]);

        let untouched = log.unprocessed_sources("p2", &all).await.unwrap();
        assert_eq!(untouched.len(), 3);
    }

    #[tokio::test]
    async fn clear_resets_everything() {
        let (_dir, log) = test_log().await;
        log.mark_processed("p1", "geneanet", 1, false, None).await.unwrap();
        log.clear().await.unwrap();
        assert!(!log.is_processed("p1", "geneanet").await.unwrap());
        assert_eq!(log.stats().await.unwrap().total_searches, 0);
    }

    #[tokio::test]
    async fn cache_survives_refresh() {
        let (_dir, log) = test_log().await;
        log.mark_processed("p1", "anom", 2, false, None).await.unwrap();
        log.refresh_cache().await.unwrap();
        assert!(log.is_processed("p1", "anom").await.unwrap());
    }
}
