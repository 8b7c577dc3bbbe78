//! IrishGenealogy.ie civil records search.
//!
//! Results come back as tables (name in the first cell, years in their
//! own columns) or, in newer templates, as result divs/list items.

use std::sync::LazyLock;

use lineage_common::{CandidateRecord, Payload, Query};
use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::json;

use super::helpers::{select_by_class_pattern, sel, text_of};
use super::MAX_RECORDS;
use crate::registry::RecordExtractor;
use crate::score;

const SOURCE_KEY: &str = "irishgenealogy";

static TABLE_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)result|record|data").unwrap());
static ITEM_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)result|record").unwrap());
static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(1[7-9]\d{2}|19\d{2}|20[0-2]\d)\b").unwrap());
static YEAR_CELL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(1[89]\d{2}|19\d{2})$").unwrap());

const LOCATION_WORDS: &[&str] = &["County", "Co.", "Parish", "Dublin", "Cork", "Galway"];
const NO_RESULT_PHRASES: &[&str] = &["no records found", "no results", "0 records", "nothing matched"];

pub struct IrishGenealogyExtractor;

impl RecordExtractor for IrishGenealogyExtractor {
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
                if let Some(record) = extract_table_row(row, query) {
                    records.push(record);
                }
            }
        }

        if records.is_empty() {
            for item in select_by_class_pattern(&document, &["div", "li"], &ITEM_CLASS_RE) {
                if records.len() >= MAX_RECORDS {
                    break;
                }
                if let Some(record) = extract_item(item, query) {
                    records.push(record);
                }
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
        Regex::new(r"(?i)\d+\s+records?").unwrap().is_match(html) || lower.contains("civil-records")
    }
}

fn extract_table_row(row: ElementRef, query: &Query) -> Option<CandidateRecord> {
    let cells: Vec<String> = row.select(&sel("td, th")).map(text_of).collect();
    if cells.len() < 2 {
        return None;
    }
    let full_text = cells.join(" ");

    let name = cells.first().cloned().filter(|n| n.len() >= 2)?;

    let url = row
        .select(&sel("a[href]"))
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| {
            if href.starts_with("http") {
                href.to_string()
            } else {
                format!("https://civilrecords.irishgenealogy.ie{href}")
            }
        });

    // Year columns first, loose years as a fallback.
    let mut birth_year = None;
    let mut death_year = None;
    for cell in &cells {
        if YEAR_CELL_RE.is_match(cell) {
            let year = cell.parse().ok();
            if birth_year.is_none() {
                birth_year = year;
            } else if death_year.is_none() {
                death_year = year;
            }
        }
    }
    if birth_year.is_none() {
        let years: Vec<i32> =
            YEAR_RE.find_iter(&full_text).filter_map(|m| m.as_str().parse().ok()).collect();
        birth_year = years.first().copied();
        death_year = years.get(1).copied();
    }

    let location = cells
        .iter()
        .skip(1)
        .find(|text| LOCATION_WORDS.iter().any(|w| text.contains(w)))
        .cloned();

    let lower = full_text.to_lowercase();
    let record_type = if lower.contains("birth") || lower.contains("baptism") {
        Some("birth")
    } else if lower.contains("death") || lower.contains("burial") {
        Some("death")
    } else if lower.contains("marriage") {
        Some("marriage")
    } else {
        None
    };

    let mut record = CandidateRecord::new(SOURCE_KEY, name);
    record.birth_year = birth_year;
    record.death_year = death_year;
    record.birth_place = location;
    record.url = url;
    record.raw_data.insert("record_type".into(), json!(record_type));
    record.match_score = score::score(&record, query);
    Some(record)
}

fn extract_item(item: ElementRef, query: &Query) -> Option<CandidateRecord> {
    let link = item.select(&sel("a[href]")).next()?;
    let name = text_of(link);
    if name.is_empty() {
        return None;
    }
    let text = text_of(item);

    let mut record = CandidateRecord::new(SOURCE_KEY, name);
    record.birth_year = YEAR_RE.find(&text).and_then(|m| m.as_str().parse().ok());
    record.url = link.value().attr("href").map(|href| {
        if href.starts_with("http") {
            href.to_string()
        } else {
            format!("https://civilrecords.irishgenealogy.ie{href}")
        }
    });
    record.match_score = score::score(&record, query);
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_civil_record_row() {
        let query = Query {
            surname: "O'Brien".into(),
            given_name: "Patrick".into(),
            birth_year: Some(1870),
            birth_year_end: None,
            location: None,
            country: None,
            region: None,
            is_estimated_year: false,
        };
        let html = r#"
        <table class="results-table">
          <tr><th>Name</th><th>Year</th><th>District</th></tr>
          <tr>
            <td>Patrick O'Brien</td>
            <td>1870</td>
            <td>County Clare</td>
            <td><a href="/churchrecords/details/b123">Birth</a></td>
          </tr>
        </table>"#;
        let records = IrishGenealogyExtractor.extract(&Payload::Html(html.into()), &query);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.name, "Patrick O'Brien");
        assert_eq!(r.birth_year, Some(1870));
        assert_eq!(r.birth_place.as_deref(), Some("County Clare"));
        assert_eq!(r.raw_data["record_type"], "birth");
    }
}
