//! Geneanet individual search results.
//!
//! Hits are `<a class="ligne-resultat">` rows: name in `p.text-large`
//! (with a tooltip id in `data-dropdown-id`), years in
//! `div.content-periode`, place in `div.content-lieu`, spouse in
//! `div.content-individu`. The tooltip div holds full dates and parents.

use std::sync::LazyLock;

use lineage_common::{CandidateRecord, Payload, Query};
use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::json;

use super::helpers::{collapse_ws, sel, text_of};
use super::MAX_RECORDS;
use crate::registry::RecordExtractor;
use crate::score;

const SOURCE_KEY: &str = "geneanet";

static RESULT_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\d+\s+(résultats?|results?)").unwrap());
static MARRIAGE_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d{4})\)").unwrap());

pub struct GeneanetExtractor;

impl RecordExtractor for GeneanetExtractor {
    fn extract(&self, payload: &Payload, query: &Query) -> Vec<CandidateRecord> {
        let Some(html) = payload.as_html() else {
            return Vec::new();
        };
        let document = Html::parse_document(html);

        let mut records = Vec::new();
        for item in document.select(&sel("a.ligne-resultat")).take(MAX_RECORDS) {
            if let Some(record) = extract_individual(item, &document, query) {
                records.push(record);
            }
        }
        records
    }

    fn has_results_indicator(&self, payload: &Payload) -> bool {
        let Some(html) = payload.as_html() else {
            return false;
        };
        RESULT_COUNT_RE.is_match(html) || html.contains("/individu/") || html.contains("ligne-resultat")
    }
}

fn extract_individual(
    item: ElementRef,
    document: &Html,
    query: &Query,
) -> Option<CandidateRecord> {
    let url = item.value().attr("href")?.to_string();

    let name_elem = item.select(&sel("p.text-large")).next()?;
    let name = collapse_ws(&text_of(name_elem));
    if name.is_empty() {
        return None;
    }
    let tooltip_id = name_elem.value().attr("data-dropdown-id").map(String::from);

    let image_url = item
        .select(&sel("img[src]"))
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(String::from);

    let mut birth_year = None;
    let mut death_year = None;
    if let Some(periode) = item.select(&sel("div.content-periode")).next() {
        birth_year = labelled_year(periode, "Birth");
        death_year = labelled_year(periode, "Death");
    }

    let birth_place = item
        .select(&sel("div.content-lieu span.title-lieu"))
        .next()
        .map(text_of)
        .filter(|p| !p.is_empty());

    // Spouse line: "Spouse NAME (1907)".
    let mut spouse = None;
    let mut marriage_year: Option<i32> = None;
    if let Some(individu) = item.select(&sel("div.content-individu")).next() {
        let text = text_of(individu);
        if let Some(idx) = text.find("Spouse") {
            let spouse_text = text[idx + "Spouse".len()..].trim();
            if !spouse_text.is_empty() {
                if let Some(caps) = MARRIAGE_YEAR_RE.captures(spouse_text) {
                    marriage_year = caps[1].parse().ok();
                    spouse = Some(collapse_ws(&MARRIAGE_YEAR_RE.replace(spouse_text, "")));
                } else {
                    spouse = Some(spouse_text.to_string());
                }
            }
        }
    }

    // Tooltip: full dates table and parents.
    let mut birth_date = None;
    let mut death_date = None;
    let mut marriage_date = None;
    let mut father = None;
    let mut mother = None;
    if let Some(id) = tooltip_id {
        if let Some(tooltip) = document
            .select(&sel("div[id]"))
            .find(|div| div.value().attr("id") == Some(id.as_str()))
        {
            for row in tooltip.select(&sel("tr.top-infos")) {
                let cells: Vec<ElementRef> = row.select(&sel("td")).collect();
                if cells.len() >= 3 {
                    let label = text_of(cells[0]).to_lowercase();
                    let value = text_of(cells[2]);
                    match label.as_str() {
                        "birth" => birth_date = Some(value),
                        "death" => death_date = Some(value),
                        "marriage" => marriage_date = Some(value),
                        _ => {}
                    }
                }
            }
            father = tooltip
                .select(&sel(r#"p[class*="icon-search-homme"]"#))
                .next()
                .map(text_of);
            mother = tooltip
                .select(&sel(r#"p[class*="icon-search-femme"]"#))
                .next()
                .map(text_of);
        }
    }

    let mut record = CandidateRecord::new(SOURCE_KEY, name);
    record.birth_year = birth_year;
    record.death_year = death_year;
    record.birth_date = birth_date;
    record.death_date = death_date;
    record.birth_place = birth_place;
    record.url = Some(url);
    record.raw_data.insert("spouse".into(), json!(spouse));
    record.raw_data.insert("marriage_year".into(), json!(marriage_year));
    record.raw_data.insert("marriage_date".into(), json!(marriage_date));
    record.raw_data.insert("father".into(), json!(father));
    record.raw_data.insert("mother".into(), json!(mother));
    record.raw_data.insert("image_url".into(), json!(image_url));
    record.match_score = score::score(&record, query);
    Some(record)
}

/// Year following a "Birth"/"Death" label inside the period block.
fn labelled_year(periode: ElementRef, label: &str) -> Option<i32> {
    for p in periode.select(&sel("p")) {
        let text = text_of(p);
        if text.contains(label) {
            return super::helpers::first_year(&text);
        }
    }
    None
}
