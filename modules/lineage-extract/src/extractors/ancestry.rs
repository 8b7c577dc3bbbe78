//! Ancestry search results.
//!
//! Card markup shifts between templates; match result containers by
//! class pattern and pull `Birth: YYYY place` / `Death: YYYY` out of the
//! card text.

use std::sync::LazyLock;

use lineage_common::{CandidateRecord, Payload, Query};
use regex::Regex;
use scraper::Html;
use serde_json::json;

use super::helpers::{select_by_class_pattern, sel, text_of};
use super::MAX_RECORDS;
use crate::registry::RecordExtractor;
use crate::score;

const SOURCE_KEY: &str = "ancestry";

static CARD_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)recordCard|result|person|record").unwrap());
static BIRTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Birth:?\s*(\d{4})\s*([^,\n]+)?").unwrap());
static DEATH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Death:?\s*(\d{4})").unwrap());

pub struct AncestryExtractor;

impl RecordExtractor for AncestryExtractor {
    fn extract(&self, payload: &Payload, query: &Query) -> Vec<CandidateRecord> {
        let Some(html) = payload.as_html() else {
            return Vec::new();
        };
        let document = Html::parse_document(html);

        // First matching tier wins; nested containers must not double-count.
        let mut cards = select_by_class_pattern(&document, &["div"], &CARD_CLASS_RE);
        if cards.is_empty() {
            cards = select_by_class_pattern(&document, &["li"], &CARD_CLASS_RE);
        }
        if cards.is_empty() {
            cards = select_by_class_pattern(&document, &["tr"], &CARD_CLASS_RE);
        }

        let mut records = Vec::new();
        for card in cards {
            if records.len() >= MAX_RECORDS {
                break;
            }

            let Some(link) = card.select(&sel("a[href]")).next() else {
                continue;
            };
            let name = text_of(link);
            if name.is_empty() || name.len() > 120 {
                continue;
            }

            let text = text_of(card);
            let mut record = CandidateRecord::new(SOURCE_KEY, name);
            if let Some(caps) = BIRTH_RE.captures(&text) {
                record.birth_year = caps[1].parse().ok();
                record.birth_place = caps.get(2).map(|m| m.as_str().trim().to_string());
            }
            if let Some(caps) = DEATH_RE.captures(&text) {
                record.death_year = caps[1].parse().ok();
            }
            record.url = link.value().attr("href").map(|href| {
                if href.starts_with("http") {
                    href.to_string()
                } else {
                    format!("https://www.ancestry.com{href}")
                }
            });
            record.raw_data.insert("card_text".into(), json!(truncated(&text, 300)));
            record.match_score = score::score(&record, query);
            records.push(record);
        }
        records
    }

    fn has_results_indicator(&self, payload: &Payload) -> bool {
        let Some(html) = payload.as_html() else {
            return false;
        };
        Regex::new(r"(?i)\d+\s+results?").unwrap().is_match(html)
            || html.contains("recordCard")
            || html.to_lowercase().contains("search results")
    }
}

fn truncated(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
