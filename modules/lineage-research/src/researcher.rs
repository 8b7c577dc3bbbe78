//! The research control loop.
//!
//! For each roster person: build a query, prune sources already searched
//! (durable) or at their daily limit (this session), fan the remainder out
//! in parallel, stage scoring matches, and record progress so interrupted
//! or repeated runs never redo finished work.
//!
//! Outcome policy: transient and broken sources count as "tried" (marked
//! processed, with the error recorded); human-gated conditions (bot
//! checks, daily limits) are "not tried" and will be retried on a later
//! run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use lineage_common::{
    CandidateRecord, ErrorKind, Outcome, Person, Query, ANCIENT_CUTOFF_YEAR, DEFAULT_BIRTH_YEAR,
};
use lineage_extract::{extract_with_fallback, Source};
use lineage_store::{ErrorLog, SearchLog, StagingStore};
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::fetch::FetchError;
use crate::rate_limiter::RateLimiter;
use crate::traits::{ContentFetcher, PersonSource};

#[derive(Debug, Clone)]
pub struct ResearchOptions {
    /// Restrict to these source keys (None = all active).
    pub sources: Option<Vec<String>>,
    /// Cap on people pulled from the roster (None = full scan).
    pub limit: Option<usize>,
    /// Staging threshold; sentinel records bypass it.
    pub min_score: f64,
    pub parallel: bool,
    pub max_workers: usize,
    pub verbose: bool,
}

impl Default for ResearchOptions {
    fn default() -> Self {
        Self {
            sources: None,
            limit: None,
            min_score: 80.0,
            parallel: true,
            max_workers: 16,
            verbose: false,
        }
    }
}

/// Stats from one research run.
#[derive(Debug, Default)]
pub struct RunStats {
    pub people_processed: u64,
    /// People for whom at least one source was actually searched.
    pub people_searched: u64,
    pub sources_searched: u64,
    pub findings_staged: u64,
    /// Sources that raised a bot check this run; the operator must clear
    /// them in the browser.
    pub bot_check_sources: Vec<String>,
    /// Sources that hit their daily quota this run.
    pub daily_limit_sources: Vec<String>,
    pub errors: u64,
    pub elapsed_secs: f64,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Research Run Complete ===")?;
        writeln!(f, "People processed:  {}", self.people_processed)?;
        writeln!(f, "People searched:   {}", self.people_searched)?;
        writeln!(f, "Source searches:   {}", self.sources_searched)?;
        writeln!(f, "Findings staged:   {}", self.findings_staged)?;
        writeln!(f, "Errors:            {}", self.errors)?;
        if !self.bot_check_sources.is_empty() {
            writeln!(
                f,
                "Bot checks:        {} (complete verification in the browser, then re-run)",
                self.bot_check_sources.join(", ")
            )?;
        }
        if !self.daily_limit_sources.is_empty() {
            writeln!(
                f,
                "Daily limits:      {} (retried on the next run)",
                self.daily_limit_sources.join(", ")
            )?;
        }
        write!(
            f,
            "Total time:        {:.1}s ({:.1}s per person)",
            self.elapsed_secs,
            self.elapsed_secs / self.people_processed.max(1) as f64
        )
    }
}

struct SourceResult {
    key: String,
    outcome: Outcome,
    staged: u64,
    elapsed_secs: f64,
}

pub struct Researcher {
    registry: Vec<Source>,
    fetcher: Arc<dyn ContentFetcher>,
    rate_limiter: Arc<RateLimiter>,
    search_log: Arc<SearchLog>,
    staging: Arc<StagingStore>,
    error_log: Arc<ErrorLog>,
    shutdown: watch::Receiver<bool>,
}

impl Researcher {
    pub fn new(
        registry: Vec<Source>,
        fetcher: Arc<dyn ContentFetcher>,
        rate_limiter: Arc<RateLimiter>,
        search_log: Arc<SearchLog>,
        staging: Arc<StagingStore>,
        error_log: Arc<ErrorLog>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self { registry, fetcher, rate_limiter, search_log, staging, error_log, shutdown }
    }

    /// Run research over the roster. People are processed in iterator
    /// order; sources fan out per person up to `max_workers`.
    pub async fn run(
        &self,
        roster: &mut dyn PersonSource,
        opts: &ResearchOptions,
    ) -> Result<RunStats> {
        let source_keys = self.resolve_source_keys(opts);
        anyhow::ensure!(!source_keys.is_empty(), "no active sources selected");

        info!(
            sources = source_keys.join(",").as_str(),
            parallel = opts.parallel,
            max_workers = opts.max_workers,
            min_score = opts.min_score,
            "Starting research run"
        );

        let mut stats = RunStats::default();
        let started = Instant::now();
        // Sources that hit their quota this session; cleared on restart.
        let daily_limit_skips: Mutex<HashSet<String>> = Mutex::new(HashSet::new());

        loop {
            if *self.shutdown.borrow() {
                info!("Interrupt received, stopping at person boundary");
                break;
            }
            if let Some(limit) = opts.limit {
                if stats.people_processed >= limit as u64 {
                    break;
                }
            }
            let Some(person) = roster.next_person().await.context("roster iteration failed")?
            else {
                break;
            };
            stats.people_processed += 1;

            let Some(query) = build_query(&person) else {
                if opts.verbose {
                    println!(
                        "[{}] {} - SKIP ({})",
                        stats.people_processed,
                        person.name_full,
                        skip_reason(&person)
                    );
                }
                continue;
            };

            let mut candidates = self
                .search_log
                .unprocessed_sources(&person.id, &source_keys)
                .await
                .context("reading search log")?;
            {
                let skips = daily_limit_skips.lock().await;
                candidates.retain(|key| !skips.contains(key));
            }
            if candidates.is_empty() {
                println!(
                    "[{}] {} - SKIP (all sources already searched or at daily limit)",
                    stats.people_processed, person.name_full
                );
                continue;
            }

            stats.people_searched += 1;
            println!(
                "\n[{}] {} (searched: {})",
                stats.people_processed, person.name_full, stats.people_searched
            );
            println!(
                "    Search: {}, {} (~{}{})",
                query.surname,
                query.given_name,
                query.birth_year.map(|y| y.to_string()).unwrap_or_else(|| "?".into()),
                if query.is_estimated_year { " est." } else { "" }
            );

            let results: Vec<SourceResult> = if opts.parallel && candidates.len() > 1 {
                println!("    Searching {} sources in parallel...", candidates.len());
                stream::iter(candidates.iter().map(|key| {
                    self.search_source(&person, &query, key, opts, &daily_limit_skips)
                }))
                .buffer_unordered(opts.max_workers.max(1))
                .collect()
                .await
            } else {
                let mut sequential = Vec::with_capacity(candidates.len());
                for key in &candidates {
                    sequential
                        .push(self.search_source(&person, &query, key, opts, &daily_limit_skips).await);
                }
                sequential
            };

            let mut person_staged = 0u64;
            for result in results {
                stats.sources_searched += 1;
                person_staged += result.staged;
                stats.findings_staged += result.staged;
                match &result.outcome {
                    Outcome::Records(records) => {
                        if !records.is_empty() || opts.verbose {
                            println!(
                                "    {}: {} results, {} staged ({:.1}s)",
                                result.key,
                                records.len(),
                                result.staged,
                                result.elapsed_secs
                            );
                        }
                    }
                    Outcome::BotCheck(_) => {
                        stats.bot_check_sources.push(result.key.clone());
                        println!(
                            "    {}: BOT CHECK ({:.1}s) - complete verification in the browser and retry",
                            result.key, result.elapsed_secs
                        );
                    }
                    Outcome::DailyLimit(_) => {
                        if !stats.daily_limit_sources.contains(&result.key) {
                            stats.daily_limit_sources.push(result.key.clone());
                        }
                        println!(
                            "    {}: DAILY LIMIT ({:.1}s) - skipped for the rest of this run",
                            result.key, result.elapsed_secs
                        );
                    }
                    Outcome::Error { kind, message } => {
                        stats.errors += 1;
                        if opts.verbose {
                            let short: String = message.chars().take(60).collect();
                            println!(
                                "    {}: ERROR {} ({:.1}s) - {}",
                                result.key, kind, result.elapsed_secs, short
                            );
                        }
                    }
                }
            }
            if person_staged > 0 {
                println!("    -> Staged {person_staged} findings");
            } else {
                println!("    -> No matches");
            }
        }

        stats.elapsed_secs = started.elapsed().as_secs_f64();
        Ok(stats)
    }

    fn resolve_source_keys(&self, opts: &ResearchOptions) -> Vec<String> {
        let active: Vec<&Source> = self.registry.iter().filter(|s| !s.disabled).collect();
        match &opts.sources {
            Some(requested) => active
                .iter()
                .filter(|s| requested.iter().any(|r| r == s.key))
                .map(|s| s.key.to_string())
                .collect(),
            None => active.iter().map(|s| s.key.to_string()).collect(),
        }
    }

    /// Search one source for one person. Never returns an error: every
    /// failure mode folds into the outcome so that one broken source
    /// cannot stop the others.
    async fn search_source(
        &self,
        person: &Person,
        query: &Query,
        key: &str,
        opts: &ResearchOptions,
        daily_limit_skips: &Mutex<HashSet<String>>,
    ) -> SourceResult {
        let started = Instant::now();
        let Some(source) = self.registry.iter().find(|s| s.key == key) else {
            return SourceResult {
                key: key.to_string(),
                outcome: Outcome::Error {
                    kind: ErrorKind::Unknown,
                    message: format!("unknown source key {key}"),
                },
                staged: 0,
                elapsed_secs: 0.0,
            };
        };

        let fetched = self
            .rate_limiter
            .retry_with_backoff(key, || self.fetcher.fetch(source, query))
            .await;

        let query_json = serde_json::to_value(query).ok();
        let outcome = match fetched {
            Err(FetchError::BotCheck { source_name: display }) => {
                // Not marked processed: retried once the operator clears it.
                self.error_log.log(
                    key,
                    ErrorKind::BotCheck,
                    &format!("bot verification on {display}"),
                    query_json,
                    None,
                );
                Outcome::BotCheck(display)
            }
            Err(FetchError::DailyLimit { source_name: display }) => {
                // Not marked processed: the quota resets tomorrow.
                daily_limit_skips.lock().await.insert(key.to_string());
                self.error_log.log(
                    key,
                    ErrorKind::DailyLimit,
                    &format!("daily limit on {display}"),
                    query_json,
                    None,
                );
                Outcome::DailyLimit(display)
            }
            Err(err) => {
                let message = err.to_string();
                let kind = ErrorKind::classify(&message);
                self.error_log.log(key, kind, &message, query_json, None);
                // Broken sources count as tried so retries do not hammer
                // them; the error log records why.
                self.mark_processed(&person.id, key, 0, true, Some(&message)).await;
                Outcome::Error { kind, message }
            }
            Ok(fetched) => {
                let records =
                    extract_with_fallback(source, &fetched.payload, query, fetched.url.as_deref());
                let staged = self.stage_matches(person, query, &records, opts).await;

                let sentinel = records.iter().find(|r| r.is_sentinel());
                if let Some(sentinel_record) = sentinel {
                    let kind = if sentinel_record.name == "PARSE_ERROR" {
                        ErrorKind::ParseError
                    } else {
                        ErrorKind::ParseFailed
                    };
                    self.error_log.log(
                        key,
                        kind,
                        "extractor yielded no records for a page with results",
                        serde_json::to_value(query).ok(),
                        None,
                    );
                    self.mark_processed(
                        &person.id,
                        key,
                        records.len() as i64,
                        true,
                        Some(kind.as_str()),
                    )
                    .await;
                } else {
                    self.mark_processed(&person.id, key, records.len() as i64, false, None).await;
                }

                return SourceResult {
                    key: key.to_string(),
                    outcome: Outcome::Records(records),
                    staged,
                    elapsed_secs: started.elapsed().as_secs_f64(),
                };
            }
        };

        SourceResult {
            key: key.to_string(),
            outcome,
            staged: 0,
            elapsed_secs: started.elapsed().as_secs_f64(),
        }
    }

    /// Insert records above the threshold; sentinels always stage so the
    /// parser regression shows up in review.
    async fn stage_matches(
        &self,
        person: &Person,
        query: &Query,
        records: &[CandidateRecord],
        opts: &ResearchOptions,
    ) -> u64 {
        let search_params = match serde_json::to_value(query) {
            Ok(v) => v,
            Err(_) => serde_json::Value::Null,
        };

        let mut staged = 0u64;
        for record in records {
            if !record.is_sentinel() && (record.match_score as f64) < opts.min_score {
                continue;
            }
            let extracted = match serde_json::to_value(record) {
                Ok(v) => v,
                Err(e) => {
                    warn!(source = record.source.as_str(), error = %e, "Unserializable record");
                    continue;
                }
            };
            match self
                .staging
                .add_finding(
                    &person.id,
                    &person.name_full,
                    &record.source,
                    record.url.as_deref(),
                    &extracted,
                    record.match_score as f64,
                    &search_params,
                )
                .await
            {
                Ok(_) => staged += 1,
                Err(e) => {
                    warn!(source = record.source.as_str(), error = %e, "Failed to stage finding")
                }
            }
        }
        staged
    }

    async fn mark_processed(
        &self,
        person_id: &str,
        key: &str,
        result_count: i64,
        had_error: bool,
        message: Option<&str>,
    ) {
        if let Err(e) = self
            .search_log
            .mark_processed(person_id, key, result_count, had_error, message)
            .await
        {
            warn!(source = key, error = %e, "Failed to mark processed");
        }
    }
}

/// Build the search query, applying the birth-year policy. None means the
/// person is skipped entirely.
fn build_query(person: &Person) -> Option<Query> {
    if person.name_surname.trim().is_empty() {
        return None;
    }

    let mut query = Query::from_person(person);
    match person.effective_birth_year() {
        // No useful records exist before the cutoff era.
        Some(year) if year < ANCIENT_CUTOFF_YEAR => return None,
        Some(year) => {
            query.birth_year = Some(year);
            query.is_estimated_year = person.birth_year.is_none();
        }
        None => {
            query.birth_year = Some(DEFAULT_BIRTH_YEAR);
            query.is_estimated_year = true;
        }
    }
    Some(query)
}

fn skip_reason(person: &Person) -> String {
    if person.name_surname.trim().is_empty() {
        "no surname".to_string()
    } else if let Some(year) = person.effective_birth_year() {
        format!("born {year}, too ancient")
    } else {
        "unsearchable".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(surname: &str, birth_year: Option<i32>, estimated: Option<i32>) -> Person {
        Person {
            id: "p1".into(),
            name_full: format!("Test {surname}"),
            name_given: "Test".into(),
            name_surname: surname.into(),
            birth_year,
            estimated_birth_year: estimated,
            birth_place: None,
            death_year: None,
            death_place: None,
            sex: None,
        }
    }

    #[test]
    fn query_requires_surname() {
        assert!(build_query(&person("", Some(1880), None)).is_none());
        assert!(build_query(&person("  ", Some(1880), None)).is_none());
    }

    #[test]
    fn ancient_people_are_skipped() {
        assert!(build_query(&person("Plantagenet", Some(1150), None)).is_none());
        assert!(build_query(&person("Plantagenet", None, Some(1100))).is_none());
        assert!(build_query(&person("Smith", Some(1200), None)).is_some());
    }

    #[test]
    fn estimated_year_falls_back() {
        let q = build_query(&person("Smith", None, Some(1862))).unwrap();
        assert_eq!(q.birth_year, Some(1862));
        assert!(q.is_estimated_year);

        let q = build_query(&person("Smith", Some(1880), Some(1862))).unwrap();
        assert_eq!(q.birth_year, Some(1880));
        assert!(!q.is_estimated_year);
    }

    #[test]
    fn unknown_year_defaults_wide() {
        let q = build_query(&person("Smith", None, None)).unwrap();
        assert_eq!(q.birth_year, Some(DEFAULT_BIRTH_YEAR));
        assert!(q.is_estimated_year);
    }
}
