//! FreeBMD (England & Wales civil registration index).
//!
//! The results page embeds a JavaScript array:
//! `var searchData = new Array(" ;quarter;type;year", "43;SMITH;John;...", …)`.
//! Entry format: `type;surname;given;mother;flag;district;volume;page;ref`.
//! Surname and given name appear only on the first row of a group;
//! subsequent rows inherit them. Type codes 43/41 birth, 44/42 death,
//! 45/46 marriage; odd codes are unconfirmed transcriptions.

use std::sync::LazyLock;

use lineage_common::{CandidateRecord, Payload, Query};
use regex::Regex;
use serde_json::json;

use crate::registry::RecordExtractor;
use crate::score;

use super::helpers::percent_decode;

const SOURCE_KEY: &str = "freebmd";

static SEARCH_DATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)var\s+searchData\s*=\s*new\s+Array\s*\((.*?)\);").unwrap());
static ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""([^"]*)""#).unwrap());

/// Rows parsed per page; grouped rows expand to less than this.
const MAX_ENTRIES: usize = 50;

pub struct FreeBmdExtractor;

impl RecordExtractor for FreeBmdExtractor {
    fn extract(&self, payload: &Payload, query: &Query) -> Vec<CandidateRecord> {
        let Some(html) = payload.as_html() else {
            return Vec::new();
        };

        let Some(caps) = SEARCH_DATA_RE.captures(html) else {
            return Vec::new();
        };
        let entries: Vec<&str> =
            ENTRY_RE.captures_iter(&caps[1]).map(|c| c.get(1).map_or("", |m| m.as_str())).collect();
        if entries.is_empty() {
            return Vec::new();
        }

        // Header row: " ;quarter;type;year".
        let year: Option<i32> = entries[0].split(';').nth(3).and_then(|y| y.trim().parse().ok());

        let mut records = Vec::new();
        let mut current_surname = String::new();
        let mut current_given = String::new();

        for entry in entries.iter().skip(1).take(MAX_ENTRIES) {
            let Some(record) =
                parse_entry(entry, &mut current_surname, &mut current_given, year, query)
            else {
                continue;
            };
            records.push(record);
            if records.len() >= super::MAX_RECORDS {
                break;
            }
        }
        records
    }

    fn has_results_indicator(&self, payload: &Payload) -> bool {
        payload.as_html().map(|html| html.contains("var searchData")).unwrap_or(false)
    }
}

fn parse_entry(
    entry: &str,
    current_surname: &mut String,
    current_given: &mut String,
    year: Option<i32>,
    query: &Query,
) -> Option<CandidateRecord> {
    let parts: Vec<&str> = entry.split(';').collect();
    if parts.len() < 8 {
        return None;
    }

    let type_code = parts[0].trim();
    let surname = if parts[1].trim().is_empty() { current_surname.clone() } else { parts[1].trim().to_string() };
    let given = if parts[2].trim().is_empty() { current_given.clone() } else { parts[2].trim().to_string() };
    let mother = parts[3].trim();
    let district = percent_decode(parts.get(5).copied().unwrap_or(""));
    let volume = parts.get(6).copied().unwrap_or("");
    let page = parts.get(7).copied().unwrap_or("");
    let reference = parts.get(8).copied().unwrap_or("");

    if surname.is_empty() && given.is_empty() {
        return None;
    }
    *current_surname = surname.clone();
    *current_given = given.clone();

    let record_type = match type_code {
        "43" | "41" => "birth",
        "44" | "42" => "death",
        "45" | "46" => "marriage",
        _ => "birth",
    };
    let confirmed = matches!(type_code, "43" | "44" | "45");

    let mut record = CandidateRecord::new(SOURCE_KEY, format!("{given} {surname}").trim().to_string());
    record.birth_year = year;
    record.birth_place = if district.is_empty() { None } else { Some(district.clone()) };
    record.url = Some(format!("https://www.freebmd.org.uk/cgi/information.pl?r={reference}"));
    record.raw_data.insert("district".into(), json!(district));
    record.raw_data.insert("surname".into(), json!(surname));
    record.raw_data.insert("given_name".into(), json!(given));
    record.raw_data.insert(
        "mother".into(),
        if mother.is_empty() { serde_json::Value::Null } else { json!(mother) },
    );
    record.raw_data.insert("volume".into(), json!(volume));
    record.raw_data.insert("page".into(), json!(page));
    record.raw_data.insert("reference".into(), json!(reference));
    record.raw_data.insert("type".into(), json!(record_type));
    record.raw_data.insert("confirmed".into(), json!(confirmed));
    record.match_score = score::score(&record, query);
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> Query {
        Query {
            surname: "Smith".into(),
            given_name: "John".into(),
            birth_year: Some(1880),
            birth_year_end: None,
            location: None,
            country: None,
            region: None,
            is_estimated_year: false,
        }
    }

    const SAMPLE: &str = r#"
    <html><script>
    var searchData = new Array(
        " ;Mar;B;1880",
        "43;SMITH;John;JONES;0;St.%20Pancras;1b;125;r1",
        "41;;John William;;0;Islington;1b;300;r2",
        "43;SMYTHE;Jack;;0;Kent;2a;17;r3");
    </script></html>"#;

    #[test]
    fn parses_search_data_with_inherited_names() {
        let records = FreeBmdExtractor.extract(&Payload::Html(SAMPLE.into()), &query());
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].name, "John SMITH");
        assert_eq!(records[0].birth_year, Some(1880));
        assert_eq!(records[0].birth_place.as_deref(), Some("St. Pancras"));
        assert_eq!(records[0].raw_data["mother"], "JONES");
        assert_eq!(records[0].raw_data["confirmed"], true);

        // Second row inherits the surname from the first.
        assert_eq!(records[1].name, "John William SMITH");
        assert_eq!(records[1].raw_data["confirmed"], false);

        assert_eq!(records[2].name, "Jack SMYTHE");
    }

    #[test]
    fn page_without_search_data_is_empty() {
        let payload = Payload::Html("<html><p>enter a search</p></html>".into());
        assert!(FreeBmdExtractor.extract(&payload, &query()).is_empty());
        assert!(!FreeBmdExtractor.has_results_indicator(&payload));
    }
}
