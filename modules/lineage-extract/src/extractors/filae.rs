//! Filae (French records) search results.
//!
//! Filae's markup varies by collection; result containers are matched by
//! class pattern, with French field-name variants (nom, lieu, ville)
//! alongside the English ones.

use std::sync::LazyLock;

use lineage_common::{CandidateRecord, Payload, Query};
use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::json;

use super::helpers::{select_by_class_pattern, sel, text_of};
use super::MAX_RECORDS;
use crate::registry::RecordExtractor;
use crate::score;

const SOURCE_KEY: &str = "filae";

static ITEM_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)result|record|item").unwrap());
static NAME_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)name|nom|person").unwrap());
static PLACE_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)place|lieu|location|ville").unwrap());
static DOC_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)type|document|source").unwrap());
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(1[7-9]\d{2}|20[0-2]\d)\b").unwrap());

pub struct FilaeExtractor;

impl RecordExtractor for FilaeExtractor {
    fn extract(&self, payload: &Payload, query: &Query) -> Vec<CandidateRecord> {
        let Some(html) = payload.as_html() else {
            return Vec::new();
        };
        let document = Html::parse_document(html);

        let mut items = select_by_class_pattern(&document, &["div"], &ITEM_CLASS_RE);
        for tag in ["tr", "li", "article"] {
            if !items.is_empty() {
                break;
            }
            items = select_by_class_pattern(&document, &[tag], &ITEM_CLASS_RE);
        }

        let mut records = Vec::new();
        for item in items {
            if records.len() >= MAX_RECORDS {
                break;
            }
            if let Some(record) = extract_item(item, query) {
                records.push(record);
            }
        }
        records
    }

    fn has_results_indicator(&self, payload: &Payload) -> bool {
        let Some(html) = payload.as_html() else {
            return false;
        };
        let document = Html::parse_document(html);

        // A populated result counter, or any result container at all.
        let counter_re = Regex::new(r"(?i)result.*count|nombre.*result").unwrap();
        let has_counter = select_by_class_pattern(&document, &[], &counter_re)
            .iter()
            .any(|el| Regex::new(r"\d+").unwrap().is_match(&text_of(*el)));
        has_counter || !select_by_class_pattern(&document, &[], &ITEM_CLASS_RE).is_empty()
    }
}

fn extract_item(item: ElementRef, query: &Query) -> Option<CandidateRecord> {
    // Name: a labelled element if present, otherwise the first link or
    // emphasis element.
    let name = {
        let document_scoped = select_child_by_class(item, &NAME_CLASS_RE);
        let fallback = || {
            item.select(&sel("a, strong, h3, h4"))
                .next()
                .map(text_of)
                .filter(|t| !t.is_empty())
        };
        document_scoped.or_else(fallback)?
    };
    if name.is_empty() || name.len() > 120 {
        return None;
    }

    let text = text_of(item);
    let mut record = CandidateRecord::new(SOURCE_KEY, name);
    record.birth_year = YEAR_RE.find(&text).and_then(|m| m.as_str().parse().ok());
    record.birth_place = select_child_by_class(item, &PLACE_CLASS_RE);
    record.url = item
        .select(&sel("a[href]"))
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| {
            if href.starts_with("http") {
                href.to_string()
            } else {
                format!("https://www.filae.com{href}")
            }
        });
    if let Some(doc_type) = select_child_by_class(item, &DOC_CLASS_RE) {
        record.raw_data.insert("document_type".into(), json!(doc_type));
    }
    record.match_score = score::score(&record, query);
    Some(record)
}

/// Text of the first descendant whose class matches the pattern.
fn select_child_by_class(item: ElementRef, pattern: &Regex) -> Option<String> {
    item.select(&sel("*"))
        .find(|el| el.value().attr("class").map(|c| pattern.is_match(c)).unwrap_or(false))
        .map(text_of)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_french_record() {
        let query = Query {
            surname: "Dubois".into(),
            given_name: "Marie".into(),
            birth_year: Some(1875),
            birth_year_end: None,
            location: None,
            country: None,
            region: None,
            is_estimated_year: false,
        };
        let html = r#"
        <div class="search-result">
          <span class="nom-personne">DUBOIS Marie</span>
          <span class="lieu">Rouen</span>
          <span class="type-document">Acte de naissance</span>
          <a href="/record/456">voir</a>
          <p>née en 1875</p>
        </div>"#;
        let records = FilaeExtractor.extract(&Payload::Html(html.into()), &query);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.name, "DUBOIS Marie");
        assert_eq!(r.birth_year, Some(1875));
        assert_eq!(r.birth_place.as_deref(), Some("Rouen"));
        assert_eq!(r.raw_data["document_type"], "Acte de naissance");
    }
}
