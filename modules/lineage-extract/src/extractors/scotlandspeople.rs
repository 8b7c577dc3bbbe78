//! ScotlandsPeople record search results.
//!
//! Statutory register hits are table rows: surname and forename in their
//! own columns, the event year in a dedicated cell, and the reference
//! linking to the image ordering page.

use std::sync::LazyLock;

use lineage_common::{CandidateRecord, Payload, Query};
use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::json;

use super::helpers::{select_by_class_pattern, sel, text_of};
use super::MAX_RECORDS;
use crate::registry::RecordExtractor;
use crate::score;

const SOURCE_KEY: &str = "scotlandspeople";

static TABLE_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)result|record|search").unwrap());
static ITEM_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)result|record").unwrap());
static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(1[7-9]\d{2}|19\d{2}|20[0-2]\d)\b").unwrap());

const NO_RESULT_PHRASES: &[&str] = &["no results", "no records", "returned no", "0 results"];

pub struct ScotlandsPeopleExtractor;

impl RecordExtractor for ScotlandsPeopleExtractor {
    fn extract(&self, payload: &Payload, query: &Query) -> Vec<CandidateRecord> {
        let Some(html) = payload.as_html() else {
            return Vec::new();
        };
        let document = Html::parse_document(html);

        let mut records = Vec::new();
        for table in select_by_class_pattern(&document, &["table"], &TABLE_CLASS_RE) {
            for row in table.select(&sel("tr")).skip(1) {
                if records.len() >= MAX_RECORDS {
                    return records;
                }
                if let Some(record) = extract_row(row, query) {
                    records.push(record);
                }
            }
        }

        if records.is_empty() {
            for item in select_by_class_pattern(&document, &["div", "li"], &ITEM_CLASS_RE) {
                if records.len() >= MAX_RECORDS {
                    break;
                }
                let Some(link) = item.select(&sel("a[href]")).next() else { continue };
                let name = text_of(link);
                if name.is_empty() {
                    continue;
                }
                let text = text_of(item);
                let mut record = CandidateRecord::new(SOURCE_KEY, name);
                record.birth_year = YEAR_RE.find(&text).and_then(|m| m.as_str().parse().ok());
                record.url = link.value().attr("href").map(absolute);
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
        Regex::new(r"(?i)\d+\s+(records?|results?)").unwrap().is_match(html)
            || lower.contains("record-results")
    }
}

fn extract_row(row: ElementRef, query: &Query) -> Option<CandidateRecord> {
    let cells: Vec<String> = row.select(&sel("td, th")).map(text_of).collect();
    if cells.len() < 2 {
        return None;
    }
    let full_text = cells.join(" ");

    // Surname and forename columns when present, else the first cell.
    let name = if cells.len() >= 3 && !cells[0].is_empty() && !cells[1].is_empty() {
        format!("{} {}", cells[1], cells[0])
    } else {
        cells[0].clone()
    };
    if name.trim().len() < 2 {
        return None;
    }

    let url = row
        .select(&sel("a[href]"))
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(absolute);

    let years: Vec<i32> =
        YEAR_RE.find_iter(&full_text).filter_map(|m| m.as_str().parse().ok()).collect();

    // District/parish column: alphabetic, not the name cells.
    let location = cells
        .iter()
        .skip(2)
        .find(|text| {
            text.len() > 2
                && text.chars().any(|c| c.is_alphabetic())
                && !YEAR_RE.is_match(text)
        })
        .cloned();

    let mut record = CandidateRecord::new(SOURCE_KEY, name.trim().to_string());
    record.birth_year = years.first().copied();
    record.birth_place = location;
    record.url = url;
    record.raw_data.insert("cells".into(), json!(cells));
    record.match_score = score::score(&record, query);
    Some(record)
}

fn absolute(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("https://www.scotlandspeople.gov.uk{href}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_statutory_register_row() {
        let query = Query {
            surname: "MacDonald".into(),
            given_name: "James".into(),
            birth_year: Some(1860),
            birth_year_end: None,
            location: None,
            country: None,
            region: None,
            is_estimated_year: false,
        };
        let html = r#"
        <table class="search-results">
          <tr><th>Surname</th><th>Forename</th><th>Year</th><th>District</th></tr>
          <tr>
            <td>MACDONALD</td>
            <td>James</td>
            <td>1861</td>
            <td>Inverness</td>
            <td><a href="/view-image/123">View</a></td>
          </tr>
        </table>"#;
        let records = ScotlandsPeopleExtractor.extract(&Payload::Html(html.into()), &query);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.name, "James MACDONALD");
        assert_eq!(r.birth_year, Some(1861));
        assert_eq!(r.birth_place.as_deref(), Some("Inverness"));
        assert!(r.match_score > 70);
    }
}
