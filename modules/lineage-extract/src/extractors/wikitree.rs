//! WikiTree searchPerson API responses.
//!
//! The API answers with a JSON array whose first element carries the
//! matches: `[{"matches": [{"Id": ..., "Name": "Smith-269952",
//! "FirstName": ..., "LastNameAtBirth": ..., "BirthDate": ...}]}]`.

use lineage_common::{CandidateRecord, Payload, Query};
use serde_json::{json, Value};

use super::helpers::first_year;
use super::MAX_RECORDS;
use crate::registry::RecordExtractor;
use crate::score;

const SOURCE_KEY: &str = "wikitree";

pub struct WikiTreeExtractor;

impl RecordExtractor for WikiTreeExtractor {
    fn extract(&self, payload: &Payload, query: &Query) -> Vec<CandidateRecord> {
        let Some(data) = payload_json(payload) else {
            return Vec::new();
        };

        let Some(matches) = data
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|first| first.get("matches"))
            .and_then(|m| m.as_array())
        else {
            return Vec::new();
        };

        matches
            .iter()
            .take(MAX_RECORDS)
            .filter_map(|person| extract_person(person, query))
            .collect()
    }

    fn has_results_indicator(&self, payload: &Payload) -> bool {
        payload_json(payload)
            .as_ref()
            .and_then(|data| data.as_array())
            .and_then(|arr| arr.first())
            .and_then(|first| first.get("total"))
            .and_then(|t| t.as_i64())
            .map(|total| total > 0)
            .unwrap_or(false)
    }
}

/// The API payload arrives parsed; a fixture may hand us raw text.
fn payload_json(payload: &Payload) -> Option<Value> {
    if let Some(value) = payload.as_json() {
        return Some(value.clone());
    }
    payload.as_html().and_then(|s| serde_json::from_str(s).ok())
}

fn extract_person(person: &Value, query: &Query) -> Option<CandidateRecord> {
    let str_field = |key: &str| person.get(key).and_then(|v| v.as_str()).unwrap_or("");

    let first_name = str_field("FirstName");
    let mut last_name = str_field("LastNameAtBirth").to_string();
    if last_name.is_empty() {
        last_name = str_field("LastName").to_string();
    }
    // The wiki Name field carries "Surname-269952".
    let wiki_name = str_field("Name");
    if last_name.is_empty() {
        if let Some((surname, _)) = wiki_name.split_once('-') {
            last_name = surname.to_string();
        }
    }

    let name = format!("{first_name} {last_name}").trim().to_string();
    if name.is_empty() {
        return None;
    }

    let mut record = CandidateRecord::new(SOURCE_KEY, name);
    record.birth_year = first_year(str_field("BirthDate"));
    record.birth_place = person
        .get("BirthLocation")
        .and_then(|v| v.as_str())
        .map(String::from);
    if !wiki_name.is_empty() {
        record.url = Some(format!("https://www.wikitree.com/wiki/{wiki_name}"));
    }
    record.raw_data.insert("wiki_id".into(), person.get("Id").cloned().unwrap_or(Value::Null));
    record
        .raw_data
        .insert("death_date".into(), person.get("DeathDate").cloned().unwrap_or(Value::Null));
    record.death_year = person.get("DeathDate").and_then(|v| v.as_str()).and_then(first_year);
    record.raw_data.insert("wiki_name".into(), json!(wiki_name));
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

    fn sample() -> Value {
        json!([{
            "total": 2,
            "matches": [
                {
                    "Id": 269952,
                    "Name": "Smith-269952",
                    "FirstName": "John",
                    "LastNameAtBirth": "Smith",
                    "BirthDate": "1880-03-12",
                    "BirthLocation": "Kent, England",
                    "DeathDate": "1950-01-01"
                },
                {
                    "Id": 300000,
                    "Name": "Smith-300000",
                    "FirstName": "Johanna",
                    "LastNameAtBirth": "",
                    "BirthDate": "1882"
                }
            ]
        }])
    }

    #[test]
    fn extracts_api_matches() {
        let records = WikiTreeExtractor.extract(&Payload::Json(sample()), &query());
        assert_eq!(records.len(), 2);

        let r = &records[0];
        assert_eq!(r.name, "John Smith");
        assert_eq!(r.birth_year, Some(1880));
        assert_eq!(r.birth_place.as_deref(), Some("Kent, England"));
        assert_eq!(r.death_year, Some(1950));
        assert_eq!(r.url.as_deref(), Some("https://www.wikitree.com/wiki/Smith-269952"));
        assert!(r.match_score >= 90);

        // Surname recovered from the wiki Name field.
        assert_eq!(records[1].name, "Johanna Smith");
    }

    #[test]
    fn indicator_uses_total() {
        assert!(WikiTreeExtractor.has_results_indicator(&Payload::Json(sample())));
        assert!(!WikiTreeExtractor
            .has_results_indicator(&Payload::Json(json!([{"total": 0, "matches": []}]))));
        assert!(!WikiTreeExtractor.has_results_indicator(&Payload::Html("not json".into())));
    }

    #[test]
    fn malformed_json_yields_nothing() {
        assert!(WikiTreeExtractor
            .extract(&Payload::Html("{broken".into()), &query())
            .is_empty());
    }
}
