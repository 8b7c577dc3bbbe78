//! Persisted error journal: a capped JSON document of recent errors plus
//! running `source:type` counts, kept together so the aggregates survive
//! the FIFO trim.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use lineage_common::ErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

const MAX_ERRORS: usize = 1000;
const MAX_MESSAGE_LEN: usize = 500;
const MAX_STACK_LEN: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub timestamp: String,
    pub source: String,
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Journal {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
    #[serde(default)]
    counts: HashMap<String, u64>,
    #[serde(default)]
    last_updated: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ErrorSummary {
    pub total_errors: usize,
    pub by_source: Vec<(String, u64)>,
    pub by_type: Vec<(String, u64)>,
    pub top_errors: Vec<(String, u64)>,
}

pub struct ErrorLog {
    path: PathBuf,
    journal: Mutex<Journal>,
}

impl ErrorLog {
    /// Load the journal at `path`, starting fresh if absent or corrupted.
    pub fn open(path: PathBuf) -> Self {
        let journal = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self { path, journal: Mutex::new(journal) }
    }

    pub fn log(
        &self,
        source: &str,
        kind: ErrorKind,
        message: &str,
        search_params: Option<Value>,
        stack_trace: Option<String>,
    ) {
        let entry = ErrorEntry {
            timestamp: Utc::now().to_rfc3339(),
            source: source.to_string(),
            error_type: kind.as_str().to_string(),
            message: truncate(message, MAX_MESSAGE_LEN),
            search_params,
            stack_trace: stack_trace.map(|s| truncate(&s, MAX_STACK_LEN)),
        };

        let Ok(mut journal) = self.journal.lock() else {
            return;
        };
        let key = format!("{source}:{}", kind.as_str());
        *journal.counts.entry(key).or_insert(0) += 1;
        journal.errors.push(entry);
        if journal.errors.len() > MAX_ERRORS {
            let excess = journal.errors.len() - MAX_ERRORS;
            journal.errors.drain(..excess);
        }
        journal.last_updated = Some(Utc::now().to_rfc3339());
        self.save(&journal);
    }

    pub fn summary(&self) -> ErrorSummary {
        let Ok(journal) = self.journal.lock() else {
            return ErrorSummary::default();
        };

        let mut by_source: HashMap<String, u64> = HashMap::new();
        let mut by_type: HashMap<String, u64> = HashMap::new();
        for entry in &journal.errors {
            *by_source.entry(entry.source.clone()).or_insert(0) += 1;
            *by_type.entry(entry.error_type.clone()).or_insert(0) += 1;
        }

        let mut top_errors: Vec<(String, u64)> =
            journal.counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
        top_errors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_errors.truncate(10);

        ErrorSummary {
            total_errors: journal.errors.len(),
            by_source: sorted_desc(by_source),
            by_type: sorted_desc(by_type),
            top_errors,
        }
    }

    pub fn clear(&self) {
        let Ok(mut journal) = self.journal.lock() else {
            return;
        };
        *journal = Journal::default();
        self.save(&journal);
    }

    fn save(&self, journal: &Journal) {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let body = serde_json::to_string_pretty(journal)?;
            std::fs::write(&self.path, body)
        };
        if let Err(e) = write() {
            warn!(path = %self.path.display(), error = %e, "Failed to persist error journal");
        }
    }
}

fn sorted_desc(map: HashMap<String, u64>) -> Vec<(String, u64)> {
    let mut entries: Vec<_> = map.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log() -> (tempfile::TempDir, ErrorLog) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("error_log.json");
        (dir, ErrorLog::open(path))
    }

    #[test]
    fn counts_and_summary() {
        let (_dir, log) = temp_log();
        log.log("geneanet", ErrorKind::Timeout, "navigation timeout", None, None);
        log.log("geneanet", ErrorKind::Timeout, "navigation timeout", None, None);
        log.log("anom", ErrorKind::RateLimit, "429", None, None);

        let summary = log.summary();
        assert_eq!(summary.total_errors, 3);
        assert_eq!(summary.by_source[0], ("geneanet".to_string(), 2));
        assert_eq!(summary.top_errors[0], ("geneanet:TIMEOUT".to_string(), 2));
    }

    #[test]
    fn journal_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("error_log.json");
        {
            let log = ErrorLog::open(path.clone());
            log.log("filae", ErrorKind::Unknown, "boom", None, Some("stack".into()));
        }
        let reopened = ErrorLog::open(path);
        let summary = reopened.summary();
        assert_eq!(summary.total_errors, 1);
        assert_eq!(summary.by_type[0].0, "UNKNOWN");
    }

    #[test]
    fn trims_to_cap_but_keeps_counts() {
        let (_dir, log) = temp_log();
        for _ in 0..(MAX_ERRORS + 50) {
            log.log("wikitree", ErrorKind::RateLimit, "429 too many", None, None);
        }
        let summary = log.summary();
        assert_eq!(summary.total_errors, MAX_ERRORS);
        assert_eq!(summary.top_errors[0].1, (MAX_ERRORS + 50) as u64);
    }

    #[test]
    fn clear_wipes_entries_and_counts() {
        let (_dir, log) = temp_log();
        log.log("anom", ErrorKind::Navigation, "nav failed", None, None);
        log.clear();
        let summary = log.summary();
        assert_eq!(summary.total_errors, 0);
        assert!(summary.top_errors.is_empty());
    }

    #[test]
    fn long_messages_are_truncated() {
        let (_dir, log) = temp_log();
        log.log("geni", ErrorKind::Unknown, &"x".repeat(2000), None, Some("y".repeat(5000)));
        let journal = log.journal.lock().unwrap();
        assert_eq!(journal.errors[0].message.len(), 500);
        assert_eq!(journal.errors[0].stack_trace.as_ref().unwrap().len(), 1000);
    }
}
