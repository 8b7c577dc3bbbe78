//! MyHeritage search results.
//!
//! Like Ancestry, the markup is template-driven; containers are matched
//! by class pattern and dates are parsed from the `b. YYYY` / `d. YYYY`
//! conventions in the result text.

use std::sync::LazyLock;

use lineage_common::{CandidateRecord, Payload, Query};
use regex::Regex;
use scraper::Html;
use serde_json::json;

use super::helpers::{select_by_class_pattern, sel, text_of};
use super::MAX_RECORDS;
use crate::registry::RecordExtractor;
use crate::score;

const SOURCE_KEY: &str = "myheritage";

static ITEM_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)result|item|person|record").unwrap());
static BORN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)b\.\s*(\d{4})\s*([^,\n]+)?").unwrap());
static DIED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)d\.\s*(\d{4})").unwrap());

pub struct MyHeritageExtractor;

impl RecordExtractor for MyHeritageExtractor {
    fn extract(&self, payload: &Payload, query: &Query) -> Vec<CandidateRecord> {
        let Some(html) = payload.as_html() else {
            return Vec::new();
        };
        let document = Html::parse_document(html);

        // Tiered like the markup variants: card divs, then list items,
        // then table rows. Only the first matching tier is used so nested
        // containers do not double-count.
        let mut items = select_by_class_pattern(&document, &["div"], &ITEM_CLASS_RE);
        if items.is_empty() {
            items = select_by_class_pattern(&document, &["li"], &ITEM_CLASS_RE);
        }
        if items.is_empty() {
            items = select_by_class_pattern(&document, &["tr"], &ITEM_CLASS_RE);
        }

        let mut records = Vec::new();
        for item in items {
            if records.len() >= MAX_RECORDS {
                break;
            }

            let Some(link) = item.select(&sel("a[href]")).next() else {
                continue;
            };
            let name = text_of(link);
            if name.is_empty() || name.len() > 120 {
                continue;
            }

            let text = text_of(item);
            let mut record = CandidateRecord::new(SOURCE_KEY, name);
            if let Some(caps) = BORN_RE.captures(&text) {
                record.birth_year = caps[1].parse().ok();
                record.birth_place = caps.get(2).map(|m| m.as_str().trim().to_string());
            }
            if let Some(caps) = DIED_RE.captures(&text) {
                record.death_year = caps[1].parse().ok();
            }
            record.url = link.value().attr("href").map(|href| {
                if href.starts_with("http") {
                    href.to_string()
                } else {
                    format!("https://www.myheritage.com{href}")
                }
            });
            record.raw_data.insert("item_text".into(), json!(text.chars().take(300).collect::<String>()));
            record.match_score = score::score(&record, query);
            records.push(record);
        }
        records
    }

    fn has_results_indicator(&self, payload: &Payload) -> bool {
        let Some(html) = payload.as_html() else {
            return false;
        };
        html.contains("search_results_list")
            || Regex::new(r"(?i)\d+\s+results?").unwrap().is_match(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_results_list_item() {
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
        <div class="search_results_list">
          <li class="result-item">
            <a href="/research/record-1-2/john-smith">John Smith</a>
            <span>b. 1881 Manchester</span> <span>d. 1940</span>
          </li>
        </div>"#;
        let records = MyHeritageExtractor.extract(&Payload::Html(html.into()), &query);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].birth_year, Some(1881));
        assert_eq!(records[0].death_year, Some(1940));
        assert_eq!(records[0].birth_place.as_deref(), Some("Manchester"));
    }
}
