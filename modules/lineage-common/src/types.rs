use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Birth years earlier than this are outside the era any registered source
/// covers; such people are skipped entirely.
pub const ANCIENT_CUTOFF_YEAR: i32 = 1200;

/// Assumed birth year when a person record carries neither a recorded nor an
/// estimated year. Wide enough to hit most civil-registration eras.
pub const DEFAULT_BIRTH_YEAR: i32 = 1850;

/// A person from the authoritative roster. Read-only input to research.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub name_full: String,
    #[serde(default)]
    pub name_given: String,
    #[serde(default)]
    pub name_surname: String,
    pub birth_year: Option<i32>,
    pub estimated_birth_year: Option<i32>,
    pub birth_place: Option<String>,
    pub death_year: Option<i32>,
    pub death_place: Option<String>,
    pub sex: Option<String>,
}

impl Person {
    /// Recorded birth year, falling back to the estimate.
    pub fn effective_birth_year(&self) -> Option<i32> {
        self.birth_year.or(self.estimated_birth_year)
    }
}

/// Canonical search tuple handed to fetchers and extractors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub surname: String,
    pub given_name: String,
    pub birth_year: Option<i32>,
    pub birth_year_end: Option<i32>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    /// True when `birth_year` came from an estimate or the era default.
    #[serde(default)]
    pub is_estimated_year: bool,
}

impl Query {
    /// Build a query from a roster person. Birth year resolution (estimate
    /// fallback, era default, ancient cutoff) is the orchestrator's job;
    /// this only copies the name and place fields.
    pub fn from_person(person: &Person) -> Self {
        Self {
            surname: person.name_surname.clone(),
            given_name: person.name_given.clone(),
            birth_year: None,
            birth_year_end: None,
            location: person.birth_place.clone(),
            country: None,
            region: None,
            is_estimated_year: false,
        }
    }

    /// End of the birth-year window; defaults to ten years past the start.
    pub fn birth_year_end(&self) -> Option<i32> {
        self.birth_year_end.or_else(|| self.birth_year.map(|y| y + 10))
    }
}

/// One candidate hypothesis produced by an extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub name: String,
    pub birth_year: Option<i32>,
    pub birth_date: Option<String>,
    pub birth_place: Option<String>,
    pub death_year: Option<i32>,
    pub death_date: Option<String>,
    pub death_place: Option<String>,
    pub url: Option<String>,
    /// Source key this record came from.
    pub source: String,
    /// Set by the shared scorer. Always within [0, 100].
    pub match_score: i64,
    /// Free-form extra fields carried opaquely into staging.
    #[serde(default)]
    pub raw_data: HashMap<String, Value>,
}

impl CandidateRecord {
    pub fn new(source: &str, name: String) -> Self {
        Self {
            name,
            birth_year: None,
            birth_date: None,
            birth_place: None,
            death_year: None,
            death_date: None,
            death_place: None,
            url: None,
            source: source.to_string(),
            match_score: 0,
            raw_data: HashMap::new(),
        }
    }

    /// True for the parser-regression sentinels staged for visibility.
    pub fn is_sentinel(&self) -> bool {
        self.name == "PARSE_FAILED" || self.name == "PARSE_ERROR"
    }
}

/// Raw content handed to an extractor. Sources answer with rendered HTML or
/// an API's JSON body; the extractor contract covers both.
#[derive(Debug, Clone)]
pub enum Payload {
    Html(String),
    Json(Value),
}

impl Payload {
    pub fn as_html(&self) -> Option<&str> {
        match self {
            Payload::Html(s) => Some(s),
            Payload::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(v) => Some(v),
            Payload::Html(_) => None,
        }
    }
}

/// Structurally distinct results of one `(person, source)` worker.
/// The orchestrator pattern-matches on this instead of threading
/// exceptions through control flow.
#[derive(Debug)]
pub enum Outcome {
    Records(Vec<CandidateRecord>),
    /// Blocking human-verification challenge; the tab was left open.
    BotCheck(String),
    /// Source refuses further queries until reset.
    DailyLimit(String),
    Error { kind: ErrorKind, message: String },
}

/// Error taxonomy for the journal and the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    RateLimit,
    Timeout,
    Navigation,
    NotFound,
    BotCheck,
    DailyLimit,
    ParseFailed,
    ParseError,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Navigation => "NAVIGATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::BotCheck => "BOT_CHECK",
            ErrorKind::DailyLimit => "DAILY_LIMIT",
            ErrorKind::ParseFailed => "PARSE_FAILED",
            ErrorKind::ParseError => "PARSE_ERROR",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }

    /// Classify a transport/extraction error by its message.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many") {
            ErrorKind::RateLimit
        } else if lower.contains("timeout") {
            ErrorKind::Timeout
        } else if lower.contains("navigation") {
            ErrorKind::Navigation
        } else if lower.contains("404") {
            ErrorKind::NotFound
        } else {
            ErrorKind::Unknown
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
