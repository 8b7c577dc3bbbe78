//! Non-research CLI actions: review, submission, summaries, maintenance.
//!
//! The review loop is the only writer that transitions staged findings;
//! submission reads approved rows and never touches their status.

use std::io::Write;

use anyhow::{Context, Result};
use kindred_client::{KindredClient, ResearchSubmission, SourceCitation, SubmitOutcome, AGENT_ID};
use lineage_store::{ErrorLog, SearchLog, StagedFinding, StagingStore};

/// Interactive review of pending findings: approve, reject, skip, quit.
pub async fn review_findings(staging: &StagingStore) -> Result<()> {
    let pending = staging.get_pending().await?;
    let summary = staging.summary().await?;

    println!("\n{}", "=".repeat(70));
    println!("STAGED FINDINGS REVIEW");
    println!("{}", "=".repeat(70));
    println!(
        "Pending: {} | Approved: {} | Rejected: {}",
        pending.len(),
        summary.approved,
        summary.rejected
    );

    if pending.is_empty() {
        println!("No pending findings to review.");
        return Ok(());
    }

    let mut reviewed = 0u32;
    for finding in &pending {
        print_finding(finding);

        let action = prompt("[a]pprove / [r]eject / [s]kip / [q]uit? ")?.to_lowercase();
        match action.as_str() {
            "a" => {
                let notes = prompt("Notes (optional): ")?;
                let notes = if notes.is_empty() { None } else { Some(notes.as_str()) };
                staging.approve(finding.id, notes).await?;
                println!("Approved");
                reviewed += 1;
            }
            "r" => {
                let notes = prompt("Reason: ")?;
                let notes = if notes.is_empty() { None } else { Some(notes.as_str()) };
                staging.reject(finding.id, notes).await?;
                println!("Rejected");
                reviewed += 1;
            }
            "q" => break,
            _ => {} // skip
        }
    }

    println!("\nReviewed {reviewed} findings this session.");
    Ok(())
}

fn print_finding(finding: &StagedFinding) {
    println!("\n{}", "-".repeat(70));
    println!("[Finding #{}] Score: {:.1}", finding.id, finding.match_score);
    println!("{}", "-".repeat(70));
    println!("PERSON IN DATABASE: {}", finding.person_name);
    println!("  ID: {}", finding.person_id);
    println!("  Searched: {}", finding.search_params);

    let record = &finding.extracted_record;
    println!("\nFOUND RECORD ({}):", finding.source_key);
    println!("  Name: {}", record["name"].as_str().unwrap_or("?"));
    println!(
        "  Birth: {} - {}",
        record["birth_year"].as_i64().map(|y| y.to_string()).unwrap_or_else(|| "?".into()),
        record["birth_place"].as_str().unwrap_or("?")
    );
    println!(
        "  Death: {} - {}",
        record["death_year"].as_i64().map(|y| y.to_string()).unwrap_or_else(|| "?".into()),
        record["death_place"].as_str().unwrap_or("?")
    );

    if let Some(raw) = record.get("raw_data").and_then(|r| r.as_object()) {
        let extras: Vec<_> = raw.iter().filter(|(_, v)| !v.is_null()).collect();
        if !extras.is_empty() {
            println!("\n  Additional data:");
            for (key, value) in extras {
                println!("    {key}: {value}");
            }
        }
    }

    if let Some(url) = &finding.source_url {
        println!("\n  URL: {url}");
    }
    println!();
}

/// Push approved findings to the roster. Asks for confirmation; rows stay
/// approved afterwards (submission is a read-only consumption).
pub async fn submit_approved(staging: &StagingStore, client: &KindredClient) -> Result<()> {
    let approved = staging.get_approved().await?;

    println!("\n{}", "=".repeat(70));
    println!("SUBMITTING APPROVED FINDINGS");
    println!("{}", "=".repeat(70));
    println!("Approved findings to submit: {}", approved.len());

    if approved.is_empty() {
        println!("No approved findings to submit.");
        return Ok(());
    }

    let confirm = prompt("\nProceed with submission? [y/N] ")?.to_lowercase();
    if confirm != "y" {
        println!("Cancelled.");
        return Ok(());
    }

    let mut submitted = 0u32;
    let mut errors = 0u32;
    for finding in &approved {
        match submit_one(client, finding).await {
            Ok(outcome) if outcome.success => {
                println!("Submitted finding #{} for {}", finding.id, finding.person_name);
                submitted += 1;
            }
            Ok(_) => {
                println!("Failed to submit finding #{}", finding.id);
                errors += 1;
            }
            Err(e) => {
                println!("Error submitting finding #{}: {e}", finding.id);
                errors += 1;
            }
        }
    }

    println!("\nSubmitted: {submitted} | Errors: {errors}");
    Ok(())
}

async fn submit_one(client: &KindredClient, finding: &StagedFinding) -> Result<SubmitOutcome> {
    let record = &finding.extracted_record;

    // Only fill roster gaps: a birth year the search already knew is not
    // a new finding.
    let searched_birth_year = finding.search_params.get("birth_year").and_then(|v| v.as_i64());
    let mut findings = serde_json::Map::new();
    if let Some(birth_year) = record.get("birth_year").and_then(|v| v.as_i64()) {
        if searched_birth_year.is_none() {
            findings.insert("birth_year".into(), birth_year.into());
        }
    }
    for key in ["birth_place", "death_year", "death_place"] {
        if let Some(value) = record.get(key).filter(|v| !v.is_null()) {
            findings.insert(key.into(), value.clone());
        }
    }

    let submission = ResearchSubmission {
        person_id: finding.person_id.clone(),
        source: SourceCitation::website(
            &finding.source_key,
            finding.source_url.as_deref().unwrap_or(""),
        ),
        confidence: "MEDIUM".to_string(),
        findings: if findings.is_empty() { None } else { Some(findings.into()) },
        new_father: None,
        new_mother: None,
        notes: Some(
            finding
                .notes
                .clone()
                .unwrap_or_else(|| format!("Enrichment from {}", finding.source_key)),
        ),
        agent_id: AGENT_ID.to_string(),
    };

    Ok(client.submit_research(&submission).await?)
}

/// Per-source quality breakdown of pending findings: where the matches
/// come from, how strong they are, and which parsers are limping
/// (sentinel rows).
pub async fn analyze_findings(staging: &StagingStore) -> Result<()> {
    let pending = staging.get_pending().await?;

    println!("\n{}", "=".repeat(70));
    println!("PENDING FINDINGS ANALYSIS");
    println!("{}", "=".repeat(70));
    if pending.is_empty() {
        println!("Nothing pending.");
        return Ok(());
    }

    #[derive(Default)]
    struct SourceQuality {
        count: u64,
        score_sum: f64,
        best: f64,
        sentinels: u64,
        with_death_info: u64,
        with_parents: u64,
    }

    let mut by_source: std::collections::BTreeMap<String, SourceQuality> = Default::default();
    for finding in &pending {
        let entry = by_source.entry(finding.source_key.clone()).or_default();
        entry.count += 1;
        entry.score_sum += finding.match_score;
        entry.best = entry.best.max(finding.match_score);

        let record = &finding.extracted_record;
        let name = record["name"].as_str().unwrap_or("");
        if name == "PARSE_FAILED" || name == "PARSE_ERROR" {
            entry.sentinels += 1;
        }
        if !record["death_year"].is_null() || !record["death_place"].is_null() {
            entry.with_death_info += 1;
        }
        let raw = &record["raw_data"];
        if !raw["father"].is_null() || !raw["mother"].is_null() || !raw["parents"].is_null() {
            entry.with_parents += 1;
        }
    }

    println!(
        "{:<18} {:>6} {:>8} {:>6} {:>9} {:>8} {:>9}",
        "source", "count", "avg", "best", "sentinels", "w/death", "w/parents"
    );
    for (source, q) in &by_source {
        println!(
            "{:<18} {:>6} {:>8.1} {:>6.0} {:>9} {:>8} {:>9}",
            source,
            q.count,
            q.score_sum / q.count as f64,
            q.best,
            q.sentinels,
            q.with_death_info,
            q.with_parents
        );
    }

    let sentinel_total: u64 = by_source.values().map(|q| q.sentinels).sum();
    if sentinel_total > 0 {
        println!("\n{sentinel_total} sentinel rows: those parsers need attention before their results can be trusted.");
    }
    Ok(())
}

/// Everything known about one person: roster details (when the API is
/// configured) and every staged finding for them.
pub async fn show_person(
    staging: &StagingStore,
    client: Option<&KindredClient>,
    person_id: &str,
) -> Result<()> {
    println!("\n{}", "=".repeat(70));
    println!("PERSON {person_id}");
    println!("{}", "=".repeat(70));

    match client {
        Some(client) => match client.person(person_id).await? {
            Some(person) => {
                println!("Roster: {}", person.name_full);
                println!(
                    "  Birth: {} {}",
                    person
                        .birth_year
                        .or(person.estimated_birth_year)
                        .map(|y| y.to_string())
                        .unwrap_or_else(|| "?".into()),
                    person.birth_place.as_deref().unwrap_or("")
                );
                println!(
                    "  Death: {} {}",
                    person.death_year.map(|y| y.to_string()).unwrap_or_else(|| "?".into()),
                    person.death_place.as_deref().unwrap_or("")
                );
            }
            None => println!("Roster: person not found"),
        },
        None => println!("Roster: API not configured, showing staged findings only"),
    }

    let findings = staging.get_by_person(person_id).await?;
    println!("\nStaged findings: {}", findings.len());
    for finding in &findings {
        println!(
            "  #{} [{}] {} score {:.0} - {}",
            finding.id,
            finding.status.as_str(),
            finding.source_key,
            finding.match_score,
            finding.extracted_record["name"].as_str().unwrap_or("?")
        );
    }
    Ok(())
}

pub async fn show_summary(staging: &StagingStore) -> Result<()> {
    let summary = staging.summary().await?;
    println!("\n{}", "=".repeat(50));
    println!("STAGED FINDINGS SUMMARY");
    println!("{}", "=".repeat(50));
    println!("Total findings: {}", summary.total);
    println!("Pending review: {}", summary.pending);
    println!("Approved: {}", summary.approved);
    println!("Rejected: {}", summary.rejected);
    println!("\nBy source:");
    for (source, count) in &summary.by_source {
        println!("  {source}: {count}");
    }
    Ok(())
}

pub async fn show_stats(search_log: &SearchLog) -> Result<()> {
    let stats = search_log.stats().await?;
    println!("\n{}", "=".repeat(50));
    println!("PROCESSING STATISTICS");
    println!("{}", "=".repeat(50));
    println!("Total people searched: {}", stats.total_people);
    println!("Total source searches: {}", stats.total_searches);
    println!("\nSearches by source:");
    for (source, count) in &stats.by_source {
        println!("  {source}: {count}");
    }
    Ok(())
}

pub fn show_errors(error_log: &ErrorLog) {
    let summary = error_log.summary();
    println!("\n{}", "=".repeat(50));
    println!("ERROR TRACKING SUMMARY");
    println!("{}", "=".repeat(50));
    println!("Total errors logged: {}", summary.total_errors);
    println!("\nBy source:");
    for (source, count) in &summary.by_source {
        println!("  {source}: {count}");
    }
    println!("\nBy error type:");
    for (kind, count) in &summary.by_type {
        println!("  {kind}: {count}");
    }
    println!("\nTop errors:");
    for (key, count) in &summary.top_errors {
        println!("  {key}: {count}");
    }
}

pub async fn reset_search_log(search_log: &SearchLog) -> Result<()> {
    search_log.clear().await?;
    println!("Processed tracking cleared - next run will search all sources");
    Ok(())
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    std::io::stdout().flush().context("flushing stdout")?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).context("reading stdin")?;
    Ok(line.trim().to_string())
}
