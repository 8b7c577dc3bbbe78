//! Matricula (central-European parish registers).
//!
//! The source is disabled in the registry: its public search is a
//! location-based register browser, not name-searchable. The extractor is
//! kept for the fixture-driven check and for operators who paste register
//! pages manually. Register items carry German labels (Pfarre, Diözese,
//! Taufen/Trauungen/Sterbefälle).

use std::sync::LazyLock;

use lineage_common::{CandidateRecord, Payload, Query};
use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::json;

use super::helpers::{select_by_class_pattern, sel, text_of};
use super::MAX_RECORDS;
use crate::registry::RecordExtractor;
use crate::score;

const SOURCE_KEY: &str = "matricula";

static ITEM_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)result|record|entry|hit").unwrap());
static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(1[5-9]\d{2}|20[0-2]\d)\b").unwrap());
static PARISH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(Pfarr\w*|Diöze\w*|Gemeinde|Parish)[:\s]+([^,\n]+)").unwrap());

const NO_RESULT_PHRASES: &[&str] = &["keine treffer", "no results", "nichts gefunden"];

pub struct MatriculaExtractor;

impl RecordExtractor for MatriculaExtractor {
    fn extract(&self, payload: &Payload, query: &Query) -> Vec<CandidateRecord> {
        let Some(html) = payload.as_html() else {
            return Vec::new();
        };
        let document = Html::parse_document(html);

        let mut items = select_by_class_pattern(&document, &["tr"], &ITEM_CLASS_RE);
        if items.is_empty() {
            items = select_by_class_pattern(&document, &["div", "li"], &ITEM_CLASS_RE);
        }

        let mut records = Vec::new();
        for item in items {
            if records.len() >= MAX_RECORDS {
                break;
            }
            if let Some(record) = extract_register(item, query) {
                records.push(record);
            }
        }

        if records.is_empty() {
            for link in document.select(&sel("a[href]")).take(MAX_RECORDS) {
                let Some(href) = link.value().attr("href") else { continue };
                if !Regex::new(r"/(register|matriken|book)/").unwrap().is_match(href) {
                    continue;
                }
                let name = text_of(link);
                if name.len() < 2 {
                    continue;
                }
                let mut record = CandidateRecord::new(SOURCE_KEY, name);
                record.url = Some(absolute(href));
                record.match_score = score::score(&record, query);
                records.push(record);
            }
        }
        records
    }

    fn has_results_indicator(&self, payload: &Payload) -> bool {
        let Some(html) = payload.as_html() else {
            return false;
        };
        let lower = html.to_lowercase();
        if NO_RESULT_PHRASES.iter().any(|p| lower.contains(p)) {
            return false;
        }
        lower.contains("matriken") || lower.contains("register")
    }
}

fn extract_register(item: ElementRef, query: &Query) -> Option<CandidateRecord> {
    let text = text_of(item);

    let url = item
        .select(&sel("a[href]"))
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(absolute);

    let name = item
        .select(&sel("strong, b, span"))
        .next()
        .map(text_of)
        .or_else(|| item.select(&sel("a")).next().map(text_of))
        .filter(|t| t.len() >= 2)?;

    let years: Vec<i32> = YEAR_RE.find_iter(&text).filter_map(|m| m.as_str().parse().ok()).collect();

    let location = PARISH_RE.captures(&text).map(|c| c[2].trim().to_string());

    let lower = text.to_lowercase();
    let record_type = if lower.contains("tauf") || lower.contains("baptism") {
        Some("baptism")
    } else if lower.contains("trau") || lower.contains("marriage") || lower.contains("heirat") {
        Some("marriage")
    } else if lower.contains("sterb") || lower.contains("death") || lower.contains("tod") {
        Some("death")
    } else {
        None
    };

    let mut record = CandidateRecord::new(SOURCE_KEY, name);
    record.birth_year = years.first().copied();
    record.death_year = years.get(1).copied();
    record.birth_place = location;
    record.url = url;
    record.raw_data.insert("record_type".into(), json!(record_type));
    record.match_score = score::score(&record, query);
    Some(record)
}

fn absolute(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("https://data.matricula-online.eu{href}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_register_entry() {
        let query = Query {
            surname: "Mueller".into(),
            given_name: "Johann".into(),
            birth_year: Some(1850),
            birth_year_end: None,
            location: None,
            country: None,
            region: None,
            is_estimated_year: false,
        };
        let html = r#"
        <div class="register-entry">
          <strong>Johann Mueller</strong>
          <a href="/register/AT-1234">Taufen 1848-1860</a>
          <p>Pfarre: Sankt Peter</p>
        </div>"#;
        let records = MatriculaExtractor.extract(&Payload::Html(html.into()), &query);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.name, "Johann Mueller");
        assert_eq!(r.birth_year, Some(1848));
        assert_eq!(r.birth_place.as_deref(), Some("Sankt Peter"));
        assert_eq!(r.raw_data["record_type"], "baptism");
    }
}
