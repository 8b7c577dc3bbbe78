//! Digitalarkivet (Norwegian national archive) person search.
//!
//! Result rows link to `/person/`, `/kilde/`, or `/source/` pages;
//! Norwegian administrative words (kommune, fylke, sogn, prestegjeld)
//! flag the location cell, and the collection name reveals whether the
//! hit is a church book, census, or emigration record.

use std::sync::LazyLock;

use lineage_common::{CandidateRecord, Payload, Query};
use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::json;

use super::helpers::{select_by_class_pattern, sel, text_of};
use super::MAX_RECORDS;
use crate::registry::RecordExtractor;
use crate::score;

const SOURCE_KEY: &str = "digitalarkivet";

static ROW_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)result|record|hit|person").unwrap());
static PERSON_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(person|kilde|source)/").unwrap());
static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(1[5-9]\d{2}|20[0-2]\d)\b").unwrap());

const LOCATION_WORDS: &[&str] = &["kommune", "fylke", "sogn", "prestegjeld"];
const NO_RESULT_PHRASES: &[&str] =
    &["ingen treff", "no results", "0 treff", "fant ingen", "no records found"];

pub struct DigitalarkivetExtractor;

impl RecordExtractor for DigitalarkivetExtractor {
    fn extract(&self, payload: &Payload, query: &Query) -> Vec<CandidateRecord> {
        let Some(html) = payload.as_html() else {
            return Vec::new();
        };
        let document = Html::parse_document(html);

        let mut rows = select_by_class_pattern(&document, &["tr"], &ROW_CLASS_RE);
        if rows.is_empty() {
            rows = select_by_class_pattern(&document, &["div", "li"], &ROW_CLASS_RE);
        }

        let mut records = Vec::new();
        if rows.is_empty() {
            // Bare person links as a last resort.
            for link in document.select(&sel("a[href]")).take(MAX_RECORDS) {
                let Some(href) = link.value().attr("href") else { continue };
                if !PERSON_HREF_RE.is_match(href) {
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
                if records.len() >= MAX_RECORDS {
                    break;
                }
            }
            return records;
        }

        for row in rows {
            if records.len() >= MAX_RECORDS {
                break;
            }
            if let Some(record) = extract_row(row, query) {
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
        PERSON_HREF_RE.is_match(html)
    }
}

fn extract_row(row: ElementRef, query: &Query) -> Option<CandidateRecord> {
    let text = text_of(row);

    let url = row
        .select(&sel("a[href]"))
        .find(|a| a.value().attr("href").map(|h| PERSON_HREF_RE.is_match(h)).unwrap_or(false))
        .and_then(|a| a.value().attr("href"))
        .map(absolute);

    let name = row
        .select(&sel("th, td, strong, b"))
        .next()
        .map(text_of)
        .filter(|t| t.len() >= 2)?;

    let years: Vec<i32> = YEAR_RE.find_iter(&text).filter_map(|m| m.as_str().parse().ok()).collect();

    let location = row
        .select(&sel("td, span"))
        .map(text_of)
        .find(|t| LOCATION_WORDS.iter().any(|w| t.to_lowercase().contains(w)));

    let lower = text.to_lowercase();
    let record_type = if lower.contains("kirkeb") || lower.contains("dåp") {
        Some("church")
    } else if lower.contains("folketelling") || lower.contains("census") {
        Some("census")
    } else if lower.contains("emigrant") || lower.contains("utvandring") {
        Some("emigration")
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
        format!("https://www.digitalarkivet.no{href}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_norwegian_row() {
        let query = Query {
            surname: "Hansen".into(),
            given_name: "Ole".into(),
            birth_year: Some(1850),
            birth_year_end: None,
            location: None,
            country: None,
            region: None,
            is_estimated_year: false,
        };
        let html = r#"
        <table><tr class="search-hit">
          <td><a href="/person/pf01038027003123">Ole Hansen</a></td>
          <td>1850</td>
          <td>Bergen kommune</td>
          <td>Folketelling 1865</td>
        </tr></table>"#;
        let records = DigitalarkivetExtractor.extract(&Payload::Html(html.into()), &query);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.name, "Ole Hansen");
        assert_eq!(r.birth_year, Some(1850));
        assert_eq!(r.birth_place.as_deref(), Some("Bergen kommune"));
        assert_eq!(r.raw_data["record_type"], "census");
    }
}
