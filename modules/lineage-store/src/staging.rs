//! Staged findings: candidate records parked for human review.
//!
//! Rows are created `pending` by the orchestrator and move one way to
//! `approved` or `rejected` through the review action. Submission to the
//! roster reads approved rows without touching them.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::backend::{Database, Dialect, Result, SqlRow, SqlValue};

const CREATE_TABLE_SQLITE: &str = "
CREATE TABLE IF NOT EXISTS staged_findings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    person_id TEXT NOT NULL,
    person_name TEXT NOT NULL,
    source_key TEXT NOT NULL,
    source_url TEXT,
    extracted_record TEXT,
    match_score REAL,
    search_params TEXT,
    staged_at TEXT NOT NULL,
    status TEXT DEFAULT 'pending' CHECK (status IN ('pending', 'approved', 'rejected')),
    reviewed_at TEXT,
    notes TEXT
)";

const CREATE_TABLE_POSTGRES: &str = "
CREATE TABLE IF NOT EXISTS staged_findings (
    id SERIAL PRIMARY KEY,
    person_id TEXT NOT NULL,
    person_name TEXT NOT NULL,
    source_key TEXT NOT NULL,
    source_url TEXT,
    extracted_record TEXT,
    match_score REAL,
    search_params TEXT,
    staged_at TEXT NOT NULL,
    status TEXT DEFAULT 'pending' CHECK (status IN ('pending', 'approved', 'rejected')),
    reviewed_at TEXT,
    notes TEXT
)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingStatus {
    Pending,
    Approved,
    Rejected,
}

impl FindingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingStatus::Pending => "pending",
            FindingStatus::Approved => "approved",
            FindingStatus::Rejected => "rejected",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "approved" => FindingStatus::Approved,
            "rejected" => FindingStatus::Rejected,
            _ => FindingStatus::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StagedFinding {
    pub id: i64,
    pub person_id: String,
    pub person_name: String,
    pub source_key: String,
    pub source_url: Option<String>,
    pub extracted_record: Value,
    pub match_score: f64,
    pub search_params: Value,
    pub staged_at: String,
    pub status: FindingStatus,
    pub reviewed_at: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StagingSummary {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    pub by_source: Vec<(String, u64)>,
}

pub struct StagingStore {
    db: Arc<Database>,
}

impl StagingStore {
    pub async fn new(db: Arc<Database>) -> Result<Self> {
        let create = match db.dialect() {
            Dialect::Sqlite => CREATE_TABLE_SQLITE,
            Dialect::Postgres => CREATE_TABLE_POSTGRES,
        };
        db.execute(create, &[]).await?;
        Ok(Self { db })
    }

    /// Append a pending finding; returns its id.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_finding(
        &self,
        person_id: &str,
        person_name: &str,
        source_key: &str,
        source_url: Option<&str>,
        extracted_record: &Value,
        match_score: f64,
        search_params: &Value,
    ) -> Result<i64> {
        let row = self
            .db
            .fetch_one(
                "INSERT INTO staged_findings
                 (person_id, person_name, source_key, source_url,
                  extracted_record, match_score, search_params, staged_at, status)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending')
                 RETURNING id",
                &[
                    SqlValue::Text(person_id.to_string()),
                    SqlValue::Text(person_name.to_string()),
                    SqlValue::Text(source_key.to_string()),
                    source_url.map(str::to_string).into(),
                    SqlValue::Text(serde_json::to_string(extracted_record)?),
                    SqlValue::Real(match_score),
                    SqlValue::Text(serde_json::to_string(search_params)?),
                    SqlValue::Text(Utc::now().to_rfc3339()),
                ],
            )
            .await?;
        Ok(row.and_then(|r| r["id"].as_i64()).unwrap_or(0))
    }

    pub async fn get_pending(&self) -> Result<Vec<StagedFinding>> {
        let rows = self
            .db
            .fetch_all("SELECT * FROM staged_findings WHERE status = 'pending' ORDER BY id", &[])
            .await?;
        Ok(rows.iter().map(row_to_finding).collect())
    }

    pub async fn get_by_person(&self, person_id: &str) -> Result<Vec<StagedFinding>> {
        let rows = self
            .db
            .fetch_all(
                "SELECT * FROM staged_findings WHERE person_id = ? ORDER BY id",
                &[SqlValue::Text(person_id.to_string())],
            )
            .await?;
        Ok(rows.iter().map(row_to_finding).collect())
    }

    pub async fn get_approved(&self) -> Result<Vec<StagedFinding>> {
        let rows = self
            .db
            .fetch_all("SELECT * FROM staged_findings WHERE status = 'approved' ORDER BY id", &[])
            .await?;
        Ok(rows.iter().map(row_to_finding).collect())
    }

    pub async fn approve(&self, id: i64, notes: Option<&str>) -> Result<()> {
        self.transition(id, FindingStatus::Approved, notes).await
    }

    pub async fn reject(&self, id: i64, notes: Option<&str>) -> Result<()> {
        self.transition(id, FindingStatus::Rejected, notes).await
    }

    /// Terminal states are immutable: only pending rows transition.
    async fn transition(&self, id: i64, to: FindingStatus, notes: Option<&str>) -> Result<()> {
        self.db
            .execute(
                "UPDATE staged_findings
                 SET status = ?, reviewed_at = ?, notes = ?
                 WHERE id = ? AND status = 'pending'",
                &[
                    SqlValue::Text(to.as_str().to_string()),
                    SqlValue::Text(Utc::now().to_rfc3339()),
                    notes.map(str::to_string).into(),
                    SqlValue::Int(id),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn summary(&self) -> Result<StagingSummary> {
        let mut summary = StagingSummary::default();
        summary.total = self.count("SELECT COUNT(*) AS cnt FROM staged_findings").await?;
        summary.pending =
            self.count("SELECT COUNT(*) AS cnt FROM staged_findings WHERE status = 'pending'").await?;
        summary.approved =
            self.count("SELECT COUNT(*) AS cnt FROM staged_findings WHERE status = 'approved'").await?;
        summary.rejected =
            self.count("SELECT COUNT(*) AS cnt FROM staged_findings WHERE status = 'rejected'").await?;

        let rows = self
            .db
            .fetch_all(
                "SELECT source_key, COUNT(*) AS cnt FROM staged_findings GROUP BY source_key ORDER BY cnt DESC",
                &[],
            )
            .await?;
        for row in rows {
            if let (Some(source), Some(count)) = (row["source_key"].as_str(), row["cnt"].as_i64()) {
                summary.by_source.push((source.to_string(), count as u64));
            }
        }
        Ok(summary)
    }

    async fn count(&self, sql: &str) -> Result<u64> {
        Ok(self
            .db
            .fetch_one(sql, &[])
            .await?
            .and_then(|row| row["cnt"].as_i64())
            .unwrap_or(0) as u64)
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.db.execute("DELETE FROM staged_findings", &[]).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}

fn row_to_finding(row: &SqlRow) -> StagedFinding {
    let json_col = |name: &str| -> Value {
        row.get(name)
            .and_then(|v| v.as_str())
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or(Value::Null)
    };
    let text_col =
        |name: &str| -> Option<String> { row.get(name).and_then(|v| v.as_str()).map(String::from) };

    StagedFinding {
        id: row.get("id").and_then(|v| v.as_i64()).unwrap_or(0),
        person_id: text_col("person_id").unwrap_or_default(),
        person_name: text_col("person_name").unwrap_or_default(),
        source_key: text_col("source_key").unwrap_or_default(),
        source_url: text_col("source_url"),
        extracted_record: json_col("extracted_record"),
        match_score: row.get("match_score").and_then(|v| v.as_f64()).unwrap_or(0.0),
        search_params: json_col("search_params"),
        staged_at: text_col("staged_at").unwrap_or_default(),
        status: FindingStatus::parse(text_col("status").as_deref().unwrap_or("pending")),
        reviewed_at: text_col("reviewed_at"),
        notes: text_col("notes"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_store() -> (tempfile::TempDir, StagingStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staging.db");
        let db = Database::open_sqlite(path.to_str().unwrap()).await.unwrap();
        let store = StagingStore::new(Arc::new(db)).await.unwrap();
        (dir, store)
    }

    fn sample_record() -> Value {
        json!({"name": "DUBOIS Marie", "birth_year": 1880, "match_score": 92})
    }

    #[tokio::test]
    async fn add_and_fetch_pending() {
        let (_dir, store) = test_store().await;
        let id = store
            .add_finding(
                "p1",
                "Marie Dubois",
                "geneanet",
                Some("https://example.test/r/1"),
                &sample_record(),
                92.0,
                &json!({"surname": "Dubois"}),
            )
            .await
            .unwrap();
        assert!(id > 0);

        let pending = store.get_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, FindingStatus::Pending);
        assert_eq!(pending[0].extracted_record["name"], "DUBOIS Marie");
        assert_eq!(pending[0].match_score, 92.0);
    }

    #[tokio::test]
    async fn lifecycle_is_one_way() {
        let (_dir, store) = test_store().await;
        let id = store
            .add_finding("p1", "Marie Dubois", "geneanet", None, &sample_record(), 92.0, &json!({}))
            .await
            .unwrap();

        store.approve(id, Some("looks right")).await.unwrap();
        let approved = store.get_approved().await.unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].notes.as_deref(), Some("looks right"));
        assert!(approved[0].reviewed_at.is_some());

        // A terminal row never transitions again.
        store.reject(id, Some("changed my mind")).await.unwrap();
        let still_approved = store.get_approved().await.unwrap();
        assert_eq!(still_approved.len(), 1);
        assert_eq!(still_approved[0].notes.as_deref(), Some("looks right"));
    }

    #[tokio::test]
    async fn summary_counts_by_status_and_source() {
        let (_dir, store) = test_store().await;
        for (person, source) in [("p1", "geneanet"), ("p1", "findagrave"), ("p2", "geneanet")] {
            store
                .add_finding(person, "Someone", source, None, &sample_record(), 85.0, &json!({}))
                .await
                .unwrap();
        }
        store.approve(1, None).await.unwrap();
        store.reject(2, None).await.unwrap();

        let summary = store.summary().await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.approved, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.by_source[0], ("geneanet".to_string(), 2));
    }

    #[tokio::test]
    async fn clear_all_empties_the_store() {
        let (_dir, store) = test_store().await;
        store
            .add_finding("p1", "A", "geneanet", None, &sample_record(), 90.0, &json!({}))
            .await
            .unwrap();
        store.clear_all().await.unwrap();
        assert_eq!(store.summary().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn by_person_filters() {
        let (_dir, store) = test_store().await;
        store
            .add_finding("p1", "A", "geneanet", None, &sample_record(), 80.0, &json!({}))
            .await
            .unwrap();
        store
            .add_finding("p2", "B", "geneanet", None, &sample_record(), 80.0, &json!({}))
            .await
            .unwrap();
        assert_eq!(store.get_by_person("p1").await.unwrap().len(), 1);
        assert_eq!(store.get_by_person("p3").await.unwrap().len(), 0);
    }
}
