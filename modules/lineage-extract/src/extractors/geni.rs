//! Geni people search results.
//!
//! Hits are `tr.profile-layout-grid` rows: the profile link in
//! `td.name-grid-area` (href `/people/{slug}/{id}`), details in `div.small`
//! elements, the lifespan in `div.quiet`, and immediate family in
//! `td.immediate-family-grid-area`.

use std::sync::LazyLock;

use lineage_common::{CandidateRecord, Payload, Query};
use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::json;

use super::helpers::{all_years, sel, text_of};
use super::MAX_RECORDS;
use crate::registry::RecordExtractor;
use crate::score;

const SOURCE_KEY: &str = "geni";

static PEOPLE_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/people/[^/]+/\d+$").unwrap());

pub struct GeniExtractor;

impl RecordExtractor for GeniExtractor {
    fn extract(&self, payload: &Payload, query: &Query) -> Vec<CandidateRecord> {
        let Some(html) = payload.as_html() else {
            return Vec::new();
        };
        let document = Html::parse_document(html);

        let mut records = Vec::new();
        for row in document.select(&sel("tr.profile-layout-grid")).take(MAX_RECORDS) {
            if let Some(record) = extract_profile(row, query) {
                records.push(record);
            }
        }
        records
    }

    fn has_results_indicator(&self, payload: &Payload) -> bool {
        let Some(html) = payload.as_html() else {
            return false;
        };
        html.contains("profile-layout-grid")
            || html.contains("/people/")
            || Regex::new(r"(?i)\d+\s+(profiles?|results?)").unwrap().is_match(html)
    }
}

fn extract_profile(row: ElementRef, query: &Query) -> Option<CandidateRecord> {
    let name_cell = row.select(&sel("td.name-grid-area")).next()?;
    let name_link = name_cell
        .select(&sel("a[href]"))
        .find(|a| a.value().attr("href").map(|h| PEOPLE_HREF_RE.is_match(h)).unwrap_or(false))?;

    let name = text_of(name_link);
    if name.is_empty() {
        return None;
    }
    let url = name_link
        .value()
        .attr("href")
        .map(|href| format!("https://www.geni.com{href}"));

    // Lifespan: "(1880 - 1942)" in the quiet div.
    let mut birth_year = None;
    let mut death_year = None;
    if let Some(date_div) = name_cell.select(&sel("div.quiet")).next() {
        let years = all_years(&text_of(date_div));
        birth_year = years.first().copied();
        death_year = years.get(1).copied();
    }

    // Small print under the name: location and occupation style details.
    let details: Vec<String> = name_cell
        .select(&sel("div.small"))
        .map(text_of)
        .filter(|t| !t.is_empty())
        .collect();
    let birth_place = details.first().cloned();

    let family: Vec<String> = row
        .select(&sel("td.immediate-family-grid-area a"))
        .map(text_of)
        .filter(|t| !t.is_empty())
        .take(10)
        .collect();

    let mut record = CandidateRecord::new(SOURCE_KEY, name);
    record.birth_year = birth_year;
    record.death_year = death_year;
    record.birth_place = birth_place;
    record.url = url;
    if !details.is_empty() {
        record.raw_data.insert("details".into(), json!(details));
    }
    if !family.is_empty() {
        record.raw_data.insert("immediate_family".into(), json!(family));
    }
    record.match_score = score::score(&record, query);
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_profile_row() {
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
        <table><tr class="profile-layout-grid">
          <td class="name-grid-area">
            <a href="/people/John-Smith/6000000012345">John Smith</a>
            <div class="quiet">(1880 - 1942)</div>
            <div class="small">London, England</div>
          </td>
          <td class="immediate-family-grid-area">
            <a href="/people/Mary-Smith/6000000054321">Mary Smith</a>
          </td>
        </tr></table>"#;
        let records = GeniExtractor.extract(&Payload::Html(html.into()), &query);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.name, "John Smith");
        assert_eq!(r.birth_year, Some(1880));
        assert_eq!(r.death_year, Some(1942));
        assert_eq!(r.birth_place.as_deref(), Some("London, England"));
        assert_eq!(r.raw_data["immediate_family"], json!(["Mary Smith"]));
        assert_eq!(r.url.as_deref(), Some("https://www.geni.com/people/John-Smith/6000000012345"));
    }
}
