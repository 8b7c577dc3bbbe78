//! Shared match scorer.
//!
//! Scoring philosophy: start at 50 (a record was found), add points for
//! matches, subtract for contradictions, never penalize data that is simply
//! missing on either side, and reward rich records that give a reviewer
//! more to verify against.

use lineage_common::{CandidateRecord, Query};

/// Score a candidate against the query. Always within [0, 100].
pub fn score(record: &CandidateRecord, query: &Query) -> i64 {
    let mut score: i64 = 50;

    let name = record.name.to_lowercase();

    // Surname is the strongest signal.
    let surname = query.surname.to_lowercase();
    if !surname.is_empty() && !name.is_empty() {
        if name.contains(&surname) {
            score += 25;
        } else if levenshtein_ratio(&surname, &extract_surname(&name)) > 0.8 {
            score += 15;
        } else if levenshtein_ratio(&surname, &name) > 0.5 {
            score += 5;
        }
    }

    let given = query.given_name.to_lowercase();
    if !given.is_empty() && !name.is_empty() {
        if name.contains(&given) {
            score += 15;
        } else {
            // Records often abbreviate the given name to an initial.
            let initial_match = name
                .split_whitespace()
                .next()
                .and_then(|first| first.chars().next())
                .zip(given.chars().next())
                .map(|(a, b)| a == b)
                .unwrap_or(false);
            if initial_match {
                score += 10;
            } else if levenshtein_ratio(&given, &name) > 0.7 {
                score += 10;
            }
        }
    }

    if let (Some(query_year), Some(record_year)) = (query.birth_year, record.birth_year) {
        let diff = (query_year - record_year).abs();
        score += match diff {
            0 => 20,
            1..=2 => 15,
            3..=5 => 10,
            6..=10 => 5,
            11..=20 => 0,
            _ => -10,
        };
    }

    if let (Some(query_loc), Some(record_loc)) = (query.location.as_deref(), record.birth_place.as_deref()) {
        let query_loc = query_loc.to_lowercase();
        let record_loc = record_loc.to_lowercase();
        if !query_loc.is_empty() && !record_loc.is_empty() {
            if query_loc.contains(&record_loc) || record_loc.contains(&query_loc) {
                score += 10;
            } else if levenshtein_ratio(&query_loc, &record_loc) > 0.6 {
                score += 5;
            }
        }
    }

    // Richness bonus, ceiling +10.
    let mut bonus = 0i64;
    if record.death_year.is_some() {
        bonus += 2;
    }
    if record.death_place.is_some() {
        bonus += 2;
    }
    let has_parents = ["father", "mother", "parents"]
        .iter()
        .any(|key| record.raw_data.get(*key).map(|v| !v.is_null()).unwrap_or(false));
    if has_parents {
        bonus += 4;
    }
    if record.url.is_some() {
        bonus += 2;
    }
    score += bonus.min(10);

    score.clamp(0, 100)
}

/// Likely surname inside a full name: any uppercase token of length ≥2
/// (common in European records), otherwise the last token.
pub fn extract_surname(name: &str) -> String {
    let parts: Vec<&str> = name.split_whitespace().collect();
    for part in &parts {
        if part.len() > 1 && part.chars().all(|c| !c.is_lowercase()) && part.chars().any(|c| c.is_alphabetic()) {
            return part.to_lowercase();
        }
    }
    parts.last().map(|p| p.to_lowercase()).unwrap_or_default()
}

/// Normalized Levenshtein similarity in [0, 1].
pub fn levenshtein_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

/// Curated historical given-name sets. Spelling-era appropriate; anything
/// else is Unknown.
const FEMALE_NAMES: &[&str] = &[
    "mary", "anna", "anne", "ann", "elizabeth", "margaret", "sarah", "jane", "catherine",
    "katherine", "kate", "maria", "marie", "martha", "ellen", "helen", "emma", "alice", "agnes",
    "janet", "jean", "joan", "julia", "harriet", "hannah", "grace", "frances", "florence",
    "dorothy", "edith", "eliza", "emily", "eva", "evelyn", "fanny", "gertrude", "ida", "irene",
    "isabelle", "isabel", "josephine", "laura", "lillian", "louise", "lucy", "mabel", "mildred",
    "minnie", "nancy", "nellie", "olive", "pearl", "rachel", "rebecca", "rosa", "rose", "ruth",
    "sophia", "susan", "susanna", "virginia", "winifred", "annie", "bessie", "clara", "cora",
    "dora", "effie", "ella", "elsie", "esther", "ethel", "fannie", "flora", "hattie",
    "henrietta", "hilda", "jennie", "jessie", "katie", "lena", "lottie", "louisa", "lydia",
    "maggie", "mamie", "mattie", "maude", "may", "nora", "sadie", "sallie", "stella", "theresa",
    "viola", "euphemia", "clementine", "marion", "jeanne",
];

const MALE_NAMES: &[&str] = &[
    "john", "william", "james", "george", "charles", "thomas", "henry", "robert", "joseph",
    "edward", "frank", "samuel", "david", "richard", "michael", "daniel", "peter", "paul",
    "andrew", "benjamin", "jacob", "isaac", "abraham", "albert", "alfred", "arthur", "carl",
    "clarence", "earl", "ernest", "eugene", "frederick", "harold", "harry", "herbert", "howard",
    "hugh", "jesse", "lewis", "louis", "martin", "matthew", "nathan", "oscar", "patrick",
    "philip", "ralph", "raymond", "roy", "stephen", "walter", "warren", "alex", "alexander",
    // Record-book abbreviations.
    "wm", "chas", "thos", "jas", "jno", "wm.", "chas.", "thos.", "jas.", "jno.",
];

pub fn detect_gender(name: &str) -> Gender {
    let first = name
        .split_whitespace()
        .next()
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    if FEMALE_NAMES.contains(&first.as_str()) {
        Gender::Female
    } else if MALE_NAMES.contains(&first.as_str()) {
        Gender::Male
    } else {
        Gender::Unknown
    }
}

/// Assign two listed parents to father/mother slots. When genders differ,
/// the male goes to father; otherwise listing order decides.
pub fn assign_parents(first: &str, second: &str) -> (String, String) {
    match (detect_gender(first), detect_gender(second)) {
        (Gender::Female, Gender::Male) => (second.to_string(), first.to_string()),
        _ => (first.to_string(), second.to_string()),
    }
}
