//! One-shot migration of the durable stores between backends, for moving
//! an embedded database onto a networked one (or back).
//!
//! Rows are copied with plain inserts through the shared verb set, so the
//! same code serves any backend pair. Search-log rows upsert on their
//! unique key; staged findings are appended (their autoincrement ids are
//! not carried over).

use tracing::{info, warn};

use crate::backend::{Database, Result, SqlRow, SqlValue};
use crate::search_log::SearchLog;
use crate::staging::StagingStore;

#[derive(Debug, Default)]
pub struct MigrationReport {
    pub search_log_rows: u64,
    pub staged_findings: u64,
    pub skipped: u64,
}

impl std::fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Migration complete: {} search-log rows, {} staged findings, {} skipped",
            self.search_log_rows, self.staged_findings, self.skipped
        )
    }
}

/// Copy both durable tables from `source` into `dest`. Destination tables
/// are created first; existing search-log rows are refreshed, staged
/// findings accumulate.
pub async fn migrate(source: &Database, dest: &std::sync::Arc<Database>) -> Result<MigrationReport> {
    // Ensure destination tables exist.
    let _ = SearchLog::new(std::sync::Arc::clone(dest)).await?;
    let _ = StagingStore::new(std::sync::Arc::clone(dest)).await?;

    let mut report = MigrationReport::default();

    let rows = source
        .fetch_all(
            "SELECT person_id, source_key, searched_at, result_count, had_error, error_message
             FROM search_log",
            &[],
        )
        .await?;
    for row in &rows {
        let params = [
            text_param(row, "person_id"),
            text_param(row, "source_key"),
            text_param(row, "searched_at"),
            SqlValue::Int(row.get("result_count").and_then(|v| v.as_i64()).unwrap_or(0)),
            SqlValue::Bool(row.get("had_error").and_then(|v| v.as_bool()).unwrap_or(false)),
            text_param(row, "error_message"),
        ];
        match dest
            .execute(
                "INSERT INTO search_log (person_id, source_key, searched_at, result_count, had_error, error_message)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT (person_id, source_key)
                 DO UPDATE SET searched_at = excluded.searched_at,
                               result_count = excluded.result_count,
                               had_error = excluded.had_error,
                               error_message = excluded.error_message",
                &params,
            )
            .await
        {
            Ok(_) => report.search_log_rows += 1,
            Err(e) => {
                warn!(error = %e, "Skipping unmigratable search-log row");
                report.skipped += 1;
            }
        }
    }

    let rows = source
        .fetch_all(
            "SELECT person_id, person_name, source_key, source_url, extracted_record,
                    match_score, search_params, staged_at, status, reviewed_at, notes
             FROM staged_findings ORDER BY id",
            &[],
        )
        .await?;
    for row in &rows {
        let params = [
            text_param(row, "person_id"),
            text_param(row, "person_name"),
            text_param(row, "source_key"),
            text_param(row, "source_url"),
            text_param(row, "extracted_record"),
            SqlValue::Real(row.get("match_score").and_then(|v| v.as_f64()).unwrap_or(0.0)),
            text_param(row, "search_params"),
            text_param(row, "staged_at"),
            match row.get("status").and_then(|v| v.as_str()) {
                Some(status) => SqlValue::Text(status.to_string()),
                None => SqlValue::Text("pending".to_string()),
            },
            text_param(row, "reviewed_at"),
            text_param(row, "notes"),
        ];
        match dest
            .execute(
                "INSERT INTO staged_findings
                 (person_id, person_name, source_key, source_url, extracted_record,
                  match_score, search_params, staged_at, status, reviewed_at, notes)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                &params,
            )
            .await
        {
            Ok(_) => report.staged_findings += 1,
            Err(e) => {
                warn!(error = %e, "Skipping unmigratable staged finding");
                report.skipped += 1;
            }
        }
    }

    info!(
        search_log = report.search_log_rows,
        staged = report.staged_findings,
        skipped = report.skipped,
        "Store migration finished"
    );
    Ok(report)
}

fn text_param(row: &SqlRow, column: &str) -> SqlValue {
    match row.get(column).and_then(|v| v.as_str()) {
        Some(s) => SqlValue::Text(s.to_string()),
        None => SqlValue::Null,
    }
}
