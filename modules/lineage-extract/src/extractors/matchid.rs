//! MatchID, the French INSEE death-records API (1970 onward).
//!
//! Responses carry `response.persons[]`, each with structured name,
//! birth, and death blocks. Dates are `YYYYMMDD`; city can be a string
//! or a list of historical variants.

use lineage_common::{CandidateRecord, Payload, Query};
use serde_json::{json, Value};

use super::MAX_RECORDS;
use crate::registry::RecordExtractor;
use crate::score;

const SOURCE_KEY: &str = "matchid";

pub struct MatchIdExtractor;

impl RecordExtractor for MatchIdExtractor {
    fn extract(&self, payload: &Payload, query: &Query) -> Vec<CandidateRecord> {
        let Some(data) = payload_json(payload) else {
            return Vec::new();
        };

        let Some(persons) = data.pointer("/response/persons").and_then(|p| p.as_array()) else {
            return Vec::new();
        };

        persons
            .iter()
            .take(MAX_RECORDS)
            .filter_map(|person| extract_person(person, query))
            .collect()
    }

    fn has_results_indicator(&self, payload: &Payload) -> bool {
        payload_json(payload)
            .and_then(|data| {
                data.pointer("/response/persons")
                    .and_then(|p| p.as_array())
                    .map(|persons| !persons.is_empty())
            })
            .unwrap_or(false)
    }
}

fn payload_json(payload: &Payload) -> Option<Value> {
    if let Some(value) = payload.as_json() {
        return Some(value.clone());
    }
    payload.as_html().and_then(|s| serde_json::from_str(s).ok())
}

fn extract_person(person: &Value, query: &Query) -> Option<CandidateRecord> {
    let first_names: Vec<String> = person
        .pointer("/name/first")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|n| n.as_str()).map(String::from).collect())
        .unwrap_or_default();
    let last_name = person.pointer("/name/last").and_then(|v| v.as_str()).unwrap_or("");

    let name = if first_names.is_empty() {
        last_name.to_string()
    } else {
        format!("{last_name}, {}", first_names.join(" "))
    };
    if name.trim().is_empty() || name == "," {
        return None;
    }

    let birth = person.get("birth").cloned().unwrap_or(Value::Null);
    let death = person.get("death").cloned().unwrap_or(Value::Null);

    let mut record = CandidateRecord::new(SOURCE_KEY, name);
    record.birth_date = format_date(birth.get("date"));
    record.birth_year = year_of(birth.get("date"));
    record.birth_place = city_of(birth.pointer("/location"));
    record.death_date = format_date(death.get("date"));
    record.death_year = year_of(death.get("date"));
    record.death_place = city_of(death.pointer("/location"));
    if let Some(id) = person.get("id").and_then(|v| v.as_str()) {
        record.url = Some(format!("https://deces.matchid.io/id/{id}"));
    }

    let raw = &mut record.raw_data;
    raw.insert("sex".into(), person.get("sex").cloned().unwrap_or(Value::Null));
    raw.insert(
        "birth_department".into(),
        birth.pointer("/location/departmentCode").cloned().unwrap_or(Value::Null),
    );
    raw.insert(
        "birth_country".into(),
        birth.pointer("/location/country").cloned().unwrap_or(Value::Null),
    );
    raw.insert(
        "birth_city_variants".into(),
        json!(city_variants(birth.pointer("/location"))),
    );
    raw.insert(
        "death_department".into(),
        death.pointer("/location/departmentCode").cloned().unwrap_or(Value::Null),
    );
    raw.insert("death_age".into(), death.get("age").cloned().unwrap_or(Value::Null));
    raw.insert(
        "death_certificate_id".into(),
        death.get("certificateId").cloned().unwrap_or(Value::Null),
    );
    // The API's own relevance score, kept for reference; the staged score
    // comes from the shared scorer like every other source.
    raw.insert("api_score".into(), person.get("score").cloned().unwrap_or(Value::Null));
    raw.insert("source_file".into(), person.get("source").cloned().unwrap_or(Value::Null));

    record.match_score = score::score(&record, query);
    Some(record)
}

/// `YYYYMMDD` → `DD/MM/YYYY`; anything shorter passes through untouched.
fn format_date(date: Option<&Value>) -> Option<String> {
    let date = date?.as_str()?;
    if date.len() < 8 {
        return Some(date.to_string());
    }
    Some(format!("{}/{}/{}", &date[6..8], &date[4..6], &date[0..4]))
}

fn year_of(date: Option<&Value>) -> Option<i32> {
    let date = date?.as_str()?;
    if date.len() < 4 {
        return None;
    }
    date[0..4].parse().ok()
}

/// City may be a plain string or a list of name variants.
fn city_of(location: Option<&Value>) -> Option<String> {
    match location?.get("city")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(arr) => arr.first().and_then(|v| v.as_str()).map(String::from),
        _ => None,
    }
}

fn city_variants(location: Option<&Value>) -> Vec<String> {
    match location.and_then(|l| l.get("city")) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(arr)) => {
            arr.iter().filter_map(|v| v.as_str()).map(String::from).collect()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> Query {
        Query {
            surname: "Dupont".into(),
            given_name: "Marie".into(),
            birth_year: Some(1920),
            birth_year_end: None,
            location: None,
            country: None,
            region: None,
            is_estimated_year: false,
        }
    }

    fn sample() -> Value {
        json!({
            "response": {
                "total": 1,
                "persons": [{
                    "id": "abc123",
                    "score": 152.2,
                    "sex": "F",
                    "name": {"first": ["Marie", "Louise"], "last": "DUPONT"},
                    "birth": {
                        "date": "19200315",
                        "location": {
                            "city": ["Lyon", "Lyon 3e"],
                            "departmentCode": "69",
                            "country": "France"
                        }
                    },
                    "death": {
                        "date": "19981201",
                        "age": 78,
                        "certificateId": "xyz",
                        "location": {"city": "Villeurbanne", "departmentCode": "69"}
                    }
                }]
            }
        })
    }

    #[test]
    fn extracts_insee_person() {
        let records = MatchIdExtractor.extract(&Payload::Json(sample()), &query());
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.name, "DUPONT, Marie Louise");
        assert_eq!(r.birth_year, Some(1920));
        assert_eq!(r.birth_date.as_deref(), Some("15/03/1920"));
        assert_eq!(r.birth_place.as_deref(), Some("Lyon"));
        assert_eq!(r.death_year, Some(1998));
        assert_eq!(r.death_place.as_deref(), Some("Villeurbanne"));
        assert_eq!(r.raw_data["birth_city_variants"], json!(["Lyon", "Lyon 3e"]));
        assert_eq!(r.url.as_deref(), Some("https://deces.matchid.io/id/abc123"));
        // Scored by the shared scorer, not the API's own relevance number.
        assert!(r.match_score <= 100);
        assert!(r.match_score >= 90);
    }

    #[test]
    fn empty_response_is_no_match() {
        let payload = Payload::Json(json!({"response": {"persons": []}}));
        assert!(MatchIdExtractor.extract(&payload, &query()).is_empty());
        assert!(!MatchIdExtractor.has_results_indicator(&payload));
    }
}
