//! Trait seams for the orchestrator's external dependencies.
//!
//! ContentFetcher hides the browser pool and HTTP clients behind one
//! access-model-aware call; PersonSource hides the roster iterator.
//! Both have deterministic mock implementations behind the `test-support`
//! feature: no network, no browser, no roster.

use async_trait::async_trait;
use lineage_common::{Payload, Person, Query};
use lineage_extract::Source;

use crate::fetch::FetchError;

/// A fetched payload plus the URL it ultimately came from (when the
/// access model has one; form submissions and mocks may not).
#[derive(Debug, Clone)]
pub struct Fetched {
    pub payload: Payload,
    pub url: Option<String>,
}

impl Fetched {
    pub fn new(payload: Payload, url: Option<String>) -> Self {
        Self { payload, url }
    }
}

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch raw content for one source, routed by its access model.
    async fn fetch(&self, source: &Source, query: &Query) -> Result<Fetched, FetchError>;
}

#[async_trait]
pub trait PersonSource: Send {
    /// Next person in roster order; `None` when exhausted.
    async fn next_person(&mut self) -> anyhow::Result<Option<Person>>;
}

#[async_trait]
impl PersonSource for kindred_client::PeopleIter {
    async fn next_person(&mut self) -> anyhow::Result<Option<Person>> {
        Ok(self.next().await?)
    }
}
