//! Antenati (Italian state archives) nominative search results.
//!
//! Hits are `div.search-item` blocks: name in `h3 > a`, civil records in
//! `div.nominative-records` as labelled links (Birth/Nascita,
//! Death/Morte), archive links in `div.nominative-links`.

use std::sync::LazyLock;

use lineage_common::{CandidateRecord, Payload, Query};
use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::json;

use super::helpers::{first_year, sel, text_of};
use super::MAX_RECORDS;
use crate::registry::RecordExtractor;
use crate::score;

const SOURCE_KEY: &str = "antenati";

static RESULT_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\d+\s+(risultati|results?)").unwrap());
static BIRTH_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Birth|Nascita").unwrap());
static DEATH_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Death|Morte").unwrap());
static PLACE_AFTER_COLON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\s*([^,]+)").unwrap());

pub struct AntenatiExtractor;

impl RecordExtractor for AntenatiExtractor {
    fn extract(&self, payload: &Payload, query: &Query) -> Vec<CandidateRecord> {
        let Some(html) = payload.as_html() else {
            return Vec::new();
        };
        let document = Html::parse_document(html);

        let mut records = Vec::new();
        for item in document.select(&sel("div.search-item")).take(MAX_RECORDS) {
            if let Some(record) = extract_person(item, query) {
                records.push(record);
            }
        }
        records
    }

    fn has_results_indicator(&self, payload: &Payload) -> bool {
        let Some(html) = payload.as_html() else {
            return false;
        };
        RESULT_COUNT_RE.is_match(html)
            || html.contains("search-item")
            || html.contains("nominative-records")
    }
}

fn extract_person(item: ElementRef, query: &Query) -> Option<CandidateRecord> {
    let name_link = item.select(&sel("h3 a")).next()?;
    let name = text_of(name_link);
    if name.is_empty() {
        return None;
    }
    let url = name_link.value().attr("href").map(|href| {
        if href.starts_with("http") {
            href.to_string()
        } else {
            format!("https://antenati.cultura.gov.it{href}")
        }
    });

    let mut birth_year = None;
    let mut birth_place = None;
    let mut death_year = None;
    if let Some(records_div) = item.select(&sel("div.nominative-records")).next() {
        for link in records_div.select(&sel("a")) {
            let text = text_of(link);
            if BIRTH_LABEL_RE.is_match(&text) && birth_year.is_none() {
                birth_year = first_year(&text);
                birth_place = PLACE_AFTER_COLON_RE
                    .captures(&text)
                    .map(|c| c[1].trim().to_string());
            } else if DEATH_LABEL_RE.is_match(&text) && death_year.is_none() {
                death_year = first_year(&text);
            }
        }
    }

    // Registry/archive links kept for the reviewer.
    let archive_links: Vec<String> = item
        .select(&sel("div.nominative-links span"))
        .map(text_of)
        .filter(|t| !t.is_empty())
        .collect();

    let mut record = CandidateRecord::new(SOURCE_KEY, name);
    record.birth_year = birth_year;
    record.birth_place = birth_place;
    record.death_year = death_year;
    record.url = url;
    if !archive_links.is_empty() {
        record.raw_data.insert("archive_links".into(), json!(archive_links));
    }
    record.match_score = score::score(&record, query);
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> Query {
        Query {
            surname: "Milanese".into(),
            given_name: "Giovanni".into(),
            birth_year: Some(1885),
            birth_year_end: None,
            location: None,
            country: None,
            region: None,
            is_estimated_year: false,
        }
    }

    const SAMPLE: &str = r#"
    <html><body>
      <p>3 risultati</p>
      <div class="search-item">
        <h3><a href="/persona/123">MILANESE Giovanni</a></h3>
        <div class="nominative-records">
          <a href="/r/1">Nascita 1885: Treviso</a>
          <a href="/r/2">Morte 1950</a>
        </div>
        <div class="nominative-links"><span>Registro 1885</span></div>
      </div>
    </body></html>"#;

    #[test]
    fn extracts_nominative_record() {
        let records = AntenatiExtractor.extract(&Payload::Html(SAMPLE.into()), &query());
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.name, "MILANESE Giovanni");
        assert_eq!(r.birth_year, Some(1885));
        assert_eq!(r.birth_place.as_deref(), Some("Treviso"));
        assert_eq!(r.death_year, Some(1950));
        assert!(r.url.as_deref().unwrap().starts_with("https://antenati.cultura.gov.it/persona"));
        assert!(r.match_score >= 90);
    }
}
