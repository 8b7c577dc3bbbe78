//! FamilySearch record search results.
//!
//! Results render as `<tr data-testid=".../ark:/...">` rows after the
//! JavaScript app loads. Each row: a name link into `/ark:/`, then cells
//! whose `<strong>` label names the event (Birth, Death, Marriage,
//! Residence, Parents, Spouse) with the values as plain spans.

use std::sync::LazyLock;

use lineage_common::{CandidateRecord, Payload, Query};
use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::json;

use super::helpers::{first_year, sel, text_of};
use super::MAX_RECORDS;
use crate::registry::RecordExtractor;
use crate::score::{self, assign_parents, detect_gender, Gender};

const SOURCE_KEY: &str = "familysearch";

static FULL_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2}\s+\w+\s+\d{4})").unwrap());
static LABEL_STRIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(Parents|Father|Mother|Spouse|Wife|Husband)\s*:?\s*").unwrap());
static PARENT_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s*|\s+and\s+").unwrap());

pub struct FamilySearchExtractor;

impl RecordExtractor for FamilySearchExtractor {
    fn extract(&self, payload: &Payload, query: &Query) -> Vec<CandidateRecord> {
        let Some(html) = payload.as_html() else {
            return Vec::new();
        };
        let document = Html::parse_document(html);

        let mut records = Vec::new();
        for row in document.select(&sel(r#"tr[data-testid*="/ark:/"]"#)).take(MAX_RECORDS) {
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
        html.contains("/ark:/")
            || Regex::new(r"(?i)\d+\s+results?").unwrap().is_match(html)
            || html.to_lowercase().contains("search results")
    }
}

#[derive(Default)]
struct EventFields {
    birth_year: Option<i32>,
    birth_date: Option<String>,
    birth_place: Option<String>,
    death_year: Option<i32>,
    death_date: Option<String>,
    death_place: Option<String>,
    marriage_year: Option<i32>,
    marriage_place: Option<String>,
    residence: Option<String>,
    father: Option<String>,
    mother: Option<String>,
    spouse: Option<String>,
    collection: Option<String>,
}

/// Broad record category from the collection name ("England Births and
/// Christenings", "1900 United States Census", …).
fn record_type_from_collection(collection: &str) -> Option<&'static str> {
    let lower = collection.to_lowercase();
    if ["birth", "christening", "baptism"].iter().any(|t| lower.contains(t)) {
        Some("birth")
    } else if ["death", "burial"].iter().any(|t| lower.contains(t)) {
        Some("death")
    } else if lower.contains("marriage") {
        Some("marriage")
    } else if lower.contains("census") {
        Some("census")
    } else if ["military", "draft", "enlistment"].iter().any(|t| lower.contains(t)) {
        Some("military")
    } else if ["immigration", "passenger", "arrival"].iter().any(|t| lower.contains(t)) {
        Some("immigration")
    } else if ["naturalization", "citizenship"].iter().any(|t| lower.contains(t)) {
        Some("naturalization")
    } else {
        None
    }
}

fn extract_row(row: ElementRef, query: &Query) -> Option<CandidateRecord> {
    let link = row
        .select(&sel(r#"a[href*="/ark:/"]"#))
        .next()
        .or_else(|| row.select(&sel("h2 a, a")).next())?;
    let name = text_of(link);
    if name.is_empty() {
        return None;
    }
    let url = link.value().attr("href").map(|href| {
        if href.starts_with("http") {
            href.to_string()
        } else {
            format!("https://www.familysearch.org{href}")
        }
    });

    let mut fields = EventFields::default();
    for cell in row.select(&sel("td")) {
        let Some(label_elem) = cell.select(&sel("strong")).next() else {
            continue;
        };
        let label = text_of(label_elem);
        let cell_text = text_of(cell);

        if ["Birth", "Christening", "Baptiz", "Baptism"].iter().any(|e| label.contains(e)) {
            if fields.birth_year.is_none() {
                let (year, date, place) = event_data(&cell_text, &label);
                fields.birth_year = year;
                fields.birth_date = date;
                fields.birth_place = place;
            }
        } else if ["Death", "Burial", "Died"].iter().any(|e| label.contains(e)) {
            if fields.death_year.is_none() {
                let (year, date, place) = event_data(&cell_text, &label);
                fields.death_year = year;
                fields.death_date = date;
                fields.death_place = place;
            }
        } else if label.contains("Marriage") || label.contains("Married") {
            let (year, _, place) = event_data(&cell_text, &label);
            fields.marriage_year = year;
            fields.marriage_place = place;
        } else if label.contains("Residence") || label.contains("Living") {
            let (_, _, place) = event_data(&cell_text, &label);
            fields.residence = place;
        } else if label.contains("Parents") {
            parse_parents(&cell_text, &mut fields);
        } else if ["Spouse", "Wife", "Husband"].iter().any(|e| label.contains(e)) {
            let spouse = LABEL_STRIP_RE.replace_all(&cell_text, "").trim().to_string();
            if !spouse.is_empty() {
                fields.spouse = Some(spouse);
            }
        } else if label.contains("Collection") {
            let collection = cell_text.replacen(&label, "", 1).trim_matches([':', ' ']).to_string();
            if !collection.is_empty() {
                fields.collection = Some(collection);
            }
        }
    }

    // The person's role in the record sits in a div right after the name
    // link ("Principal", "Parent", "Spouse", "Child").
    let role = link
        .parent()
        .and_then(scraper::ElementRef::wrap)
        .and_then(|parent| parent.select(&sel("div")).next())
        .map(|div| text_of(div))
        .and_then(|text| {
            ["Principal", "Parent", "Spouse", "Child"]
                .iter()
                .find(|r| text.contains(*r))
                .map(|r| r.to_string())
        });

    let mut record = CandidateRecord::new(SOURCE_KEY, name);
    record.birth_year = fields.birth_year;
    record.birth_date = fields.birth_date;
    record.birth_place = fields.birth_place;
    record.death_year = fields.death_year;
    record.death_date = fields.death_date;
    record.death_place = fields.death_place;
    record.url = url;
    record.raw_data.insert("father".into(), json!(fields.father));
    record.raw_data.insert("mother".into(), json!(fields.mother));
    record.raw_data.insert("spouse".into(), json!(fields.spouse));
    record.raw_data.insert("marriage_year".into(), json!(fields.marriage_year));
    record.raw_data.insert("marriage_place".into(), json!(fields.marriage_place));
    record.raw_data.insert("residence".into(), json!(fields.residence));
    record.raw_data.insert(
        "record_type".into(),
        json!(fields.collection.as_deref().and_then(record_type_from_collection)),
    );
    record.raw_data.insert("collection".into(), json!(fields.collection));
    record.raw_data.insert("role".into(), json!(role));
    record.match_score = score::score(&record, query);
    Some(record)
}

/// Split "Birth: 12 May 1880 Boston, Massachusetts" into year, full date,
/// and place. The place is whatever trails the date or year.
fn event_data(cell_text: &str, label: &str) -> (Option<i32>, Option<String>, Option<String>) {
    let text = cell_text.replacen(label, "", 1);
    let text = text.trim_start_matches([':', ' ']).trim();

    let year = first_year(text);
    let date = FULL_DATE_RE.captures(text).map(|c| c[1].to_string());

    let place = if let Some(d) = &date {
        text.split_once(d.as_str()).map(|(_, rest)| rest)
    } else if let Some(y) = year {
        text.split_once(&y.to_string()).map(|(_, rest)| rest)
    } else if text.is_empty() {
        None
    } else {
        Some(text)
    }
    .map(|p| p.trim_matches([',', ' ']).to_string())
    .filter(|p| !p.is_empty());

    (year, date, place)
}

/// "Parents: Janet Anderson, William Anderson": assign father/mother by
/// the gender heuristic; ambiguous pairs keep listing order.
fn parse_parents(cell_text: &str, fields: &mut EventFields) {
    let text = LABEL_STRIP_RE.replace_all(cell_text, "");
    let text = text.trim();
    if text.is_empty() {
        return;
    }

    let parts: Vec<&str> = PARENT_SPLIT_RE.splitn(text, 2).map(str::trim).collect();
    match parts.as_slice() {
        [first, second] if !first.is_empty() && !second.is_empty() => {
            let (father, mother) = assign_parents(first, second);
            fields.father = Some(father);
            fields.mother = Some(mother);
        }
        [only] if !only.is_empty() => match detect_gender(only) {
            Gender::Female => fields.mother = Some(only.to_string()),
            _ => fields.father = Some(only.to_string()),
        },
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> Query {
        Query {
            surname: "Anderson".into(),
            given_name: "Margaret".into(),
            birth_year: Some(1880),
            birth_year_end: None,
            location: None,
            country: None,
            region: None,
            is_estimated_year: false,
        }
    }

    const SAMPLE: &str = r#"
    <html><body><table>
      <tr data-testid="record-/ark:/61903/1:1:XYZ">
        <td><h2><a class="linkCss" href="/ark:/61903/1:1:XYZ">Margaret Anderson</a></h2></td>
        <td><strong>Birth</strong> 12 May 1880 Edinburgh, Scotland</td>
        <td><strong>Death</strong> 1953 Glasgow</td>
        <td><strong>Parents</strong>: Janet Anderson, William Anderson</td>
        <td><strong>Spouse</strong>: Robert Brown</td>
      </tr>
    </table></body></html>"#;

    #[test]
    fn extracts_events_and_parents() {
        let records = FamilySearchExtractor.extract(&Payload::Html(SAMPLE.into()), &query());
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.name, "Margaret Anderson");
        assert_eq!(r.birth_year, Some(1880));
        assert_eq!(r.birth_date.as_deref(), Some("12 May 1880"));
        assert_eq!(r.birth_place.as_deref(), Some("Edinburgh, Scotland"));
        assert_eq!(r.death_year, Some(1953));
        assert_eq!(r.death_place.as_deref(), Some("Glasgow"));
        // Gender heuristic puts William as father despite listing order.
        assert_eq!(r.raw_data["father"], "William Anderson");
        assert_eq!(r.raw_data["mother"], "Janet Anderson");
        assert_eq!(r.raw_data["spouse"], "Robert Brown");
        assert!(r.url.as_deref().unwrap().contains("/ark:/"));
    }

    #[test]
    fn single_parent_assignment_by_gender() {
        let mut fields = EventFields::default();
        parse_parents("Parents: Mary Smith", &mut fields);
        assert_eq!(fields.mother.as_deref(), Some("Mary Smith"));
        assert!(fields.father.is_none());
    }

    #[test]
    fn indicator_sees_ark_links() {
        assert!(FamilySearchExtractor.has_results_indicator(&Payload::Html(
            "<a href=\"/ark:/61903/1:1:ABC\">r</a>".into()
        )));
        assert!(!FamilySearchExtractor
            .has_results_indicator(&Payload::Html("<p>No records found</p>".into())));
    }
}
