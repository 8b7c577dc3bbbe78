//! Fixture-driven contract checks over every registered extractor.
//!
//! Each descriptor names a fixture of real (captured or representative)
//! payload for its source. Every extractor that has a fixture on disk is
//! run against it and held to the shared contract; sources without a
//! captured fixture yet are skipped, not failed.

use std::path::{Path, PathBuf};

use lineage_common::Payload;
use lineage_extract::registry;

fn fixture_path(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(relative)
}

fn load_payload(path: &Path) -> Option<Payload> {
    let raw = std::fs::read_to_string(path).ok()?;
    if path.extension().map(|e| e == "json").unwrap_or(false) {
        serde_json::from_str(&raw).ok().map(Payload::Json)
    } else {
        Some(Payload::Html(raw))
    }
}

#[test]
fn extractors_honor_the_contract_on_fixtures() {
    let mut checked = 0;
    for source in registry() {
        let path = fixture_path(source.test_fixture);
        let Some(payload) = load_payload(&path) else {
            eprintln!("skipping {} (no fixture at {})", source.key, source.test_fixture);
            continue;
        };
        checked += 1;

        let query = source.test_params.to_query();
        let records = source.extractor.extract(&payload, &query);

        assert!(records.len() <= 20, "{}: more than one page of records", source.key);
        for record in &records {
            assert!(!record.name.trim().is_empty(), "{}: record without a name", source.key);
            assert!(
                (0..=100).contains(&record.match_score),
                "{}: score {} out of range",
                source.key,
                record.match_score
            );
            assert_eq!(record.source, source.key);
        }

        // Fixtures were captured from result pages: the indicator must
        // agree, and the extractor must find something.
        assert!(
            source.extractor.has_results_indicator(&payload),
            "{}: fixture should read as having results",
            source.key
        );
        assert!(!records.is_empty(), "{}: fixture produced no records", source.key);
    }
    assert!(checked >= 6, "expected at least six fixture-backed extractors, got {checked}");
}

#[test]
fn extractors_return_empty_on_empty_input() {
    for source in registry() {
        let query = source.test_params.to_query();
        assert!(
            source.extractor.extract(&Payload::Html(String::new()), &query).is_empty(),
            "{}: empty input must yield no records",
            source.key
        );
        assert!(
            source
                .extractor
                .extract(&Payload::Json(serde_json::Value::Null), &query)
                .is_empty(),
            "{}: null json must yield no records",
            source.key
        );
    }
}

#[test]
fn fixture_queries_produce_plausible_top_scores() {
    // The fixture queries describe the person the capture was made for,
    // so the best record should comfortably beat the neutral 50.
    for source in registry() {
        let path = fixture_path(source.test_fixture);
        let Some(payload) = load_payload(&path) else {
            continue;
        };
        let query = source.test_params.to_query();
        let records = source.extractor.extract(&payload, &query);
        let best = records.iter().map(|r| r.match_score).max().unwrap_or(0);
        assert!(best >= 70, "{}: best fixture score only {best}", source.key);
    }
}
