//! BillionGraves headstone search results.
//!
//! Result cards link to `/grave/{id}`; when no card containers are found
//! the grave links themselves are walked. Cemetery shows up as a text
//! fragment containing "Cemetery".

use std::sync::LazyLock;

use lineage_common::{CandidateRecord, Payload, Query};
use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::json;

use super::helpers::{select_by_class_pattern, sel, text_of};
use super::MAX_RECORDS;
use crate::registry::RecordExtractor;
use crate::score;

const SOURCE_KEY: &str = "billiongraves";

static CARD_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)result|record|grave-card").unwrap());
static GRAVE_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/grave/(\d+)").unwrap());
static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(1[5-9]\d{2}|20[0-2]\d)\b").unwrap());

const NO_RESULT_PHRASES: &[&str] = &["no results", "no records", "nothing found", "0 results"];

pub struct BillionGravesExtractor;

impl RecordExtractor for BillionGravesExtractor {
    fn extract(&self, payload: &Payload, query: &Query) -> Vec<CandidateRecord> {
        let Some(html) = payload.as_html() else {
            return Vec::new();
        };
        let document = Html::parse_document(html);

        let mut items = select_by_class_pattern(&document, &["div", "a", "tr"], &CARD_CLASS_RE);
        if items.is_empty() {
            items = document.select(&sel(r#"a[href*="/grave/"]"#)).collect();
        }

        let mut records = Vec::new();
        for item in items {
            if records.len() >= MAX_RECORDS {
                break;
            }
            if let Some(record) = extract_grave(item, query) {
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
        GRAVE_ID_RE.is_match(html)
    }
}

fn extract_grave(item: ElementRef, query: &Query) -> Option<CandidateRecord> {
    let (href, link_text) = if item.value().name() == "a" {
        (item.value().attr("href")?, text_of(item))
    } else {
        let link = item.select(&sel(r#"a[href*="/grave/"]"#)).next()?;
        (link.value().attr("href")?, text_of(link))
    };
    let grave_id = GRAVE_ID_RE.captures(href).map(|c| c[1].to_string())?;

    let name = item
        .select(&sel("h2, h3, h4, strong, b"))
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
        .unwrap_or(link_text);
    if name.is_empty() {
        return None;
    }

    let text = text_of(item);
    let years: Vec<i32> = YEAR_RE
        .find_iter(&text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();

    let cemetery = item
        .select(&sel("span, div, p"))
        .map(text_of)
        .find(|t| t.contains("Cemetery"));

    let mut record = CandidateRecord::new(SOURCE_KEY, name);
    record.birth_year = years.first().copied();
    record.death_year = years.get(1).copied();
    record.url = Some(if href.starts_with("http") {
        href.to_string()
    } else {
        format!("https://billiongraves.com{href}")
    });
    record.raw_data.insert("grave_id".into(), json!(grave_id));
    record.raw_data.insert("cemetery".into(), json!(cemetery));
    record.match_score = score::score(&record, query);
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_grave_card() {
        let query = Query {
            surname: "Smith".into(),
            given_name: "John".into(),
            birth_year: Some(1880),
            birth_year_end: None,
            location: None,
            country: None,
            region: None,
            is_estimated_year: false,
        };
        let html = r#"
        <div class="grave-card">
          <a href="/grave/991122"><h3>John Smith</h3></a>
          <span>1880 - 1951</span>
          <span>Greenwood Cemetery, Utah</span>
        </div>"#;
        let records = BillionGravesExtractor.extract(&Payload::Html(html.into()), &query);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.name, "John Smith");
        assert_eq!(r.birth_year, Some(1880));
        assert_eq!(r.death_year, Some(1951));
        assert_eq!(r.raw_data["cemetery"], "Greenwood Cemetery, Utah");
    }

    #[test]
    fn no_results_page_has_no_indicator() {
        let payload = Payload::Html("<p>No results found for this search</p>".into());
        assert!(!BillionGravesExtractor.has_results_indicator(&payload));
    }
}
