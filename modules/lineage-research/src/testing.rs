//! Deterministic test doubles behind the `test-support` feature:
//! a canned-response fetcher and an in-memory roster. No network, no
//! browser, no database server.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use lineage_common::{Payload, Person, Query};
use lineage_extract::Source;

use crate::fetch::FetchError;
use crate::traits::{ContentFetcher, Fetched, PersonSource};

/// Fetcher returning a sticky canned response per source key. Every call
/// is recorded so tests can assert which sources were (not) touched.
#[derive(Default)]
pub struct MockFetcher {
    responses: Mutex<HashMap<String, Result<Fetched, FetchError>>>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_html(&self, key: &str, html: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(key.to_string(), Ok(Fetched::new(Payload::Html(html.to_string()), None)));
    }

    pub fn respond_json(&self, key: &str, value: serde_json::Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(key.to_string(), Ok(Fetched::new(Payload::Json(value), None)));
    }

    pub fn fail(&self, key: &str, error: FetchError) {
        self.responses.lock().unwrap().insert(key.to_string(), Err(error));
    }

    pub fn calls_for(&self, key: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|k| k.as_str() == key).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ContentFetcher for MockFetcher {
    async fn fetch(&self, source: &Source, _query: &Query) -> Result<Fetched, FetchError> {
        self.calls.lock().unwrap().push(source.key.to_string());
        match self.responses.lock().unwrap().get(source.key) {
            Some(Ok(fetched)) => Ok(fetched.clone()),
            Some(Err(error)) => Err(error.clone()),
            // Unconfigured sources answer with an empty page: no results,
            // no indicator, no sentinel.
            None => Ok(Fetched::new(Payload::Html(String::new()), None)),
        }
    }
}

/// Roster over a fixed list of people.
pub struct MockRoster {
    people: VecDeque<Person>,
}

impl MockRoster {
    pub fn new(people: Vec<Person>) -> Self {
        Self { people: people.into() }
    }
}

#[async_trait]
impl PersonSource for MockRoster {
    async fn next_person(&mut self) -> anyhow::Result<Option<Person>> {
        Ok(self.people.pop_front())
    }
}

pub fn sample_person(id: &str, given: &str, surname: &str, birth_year: Option<i32>) -> Person {
    Person {
        id: id.to_string(),
        name_full: format!("{given} {surname}"),
        name_given: given.to_string(),
        name_surname: surname.to_string(),
        birth_year,
        estimated_birth_year: None,
        birth_place: None,
        death_year: None,
        death_place: None,
        sex: None,
    }
}
