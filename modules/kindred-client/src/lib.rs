//! JSON-over-HTTP client for the Kindred roster API.
//!
//! Read side: a paginated, deterministic iterator over all people, plus
//! single-person lookup. Write side: research submission, used only by the
//! explicit approved-findings action, never by the research orchestrator.

mod error;
mod types;

pub use error::{KindredError, Result};
pub use types::{ResearchSubmission, SourceCitation, SubmitOutcome};

use std::collections::VecDeque;
use std::time::Duration;

use lineage_common::{ApiConfig, Person};
use serde_json::{json, Value};
use tracing::debug;

use types::PageInfo;

const PAGE_SIZE: usize = 100;
pub const AGENT_ID: &str = "lineage-research";

const PEOPLE_QUERY: &str = r#"
query GetAllPeople($first: Int, $after: String) {
  people(first: $first, after: $after) {
    edges {
      node {
        id
        name_full
        name_given
        name_surname
        birth_year
        estimated_birth_year
        birth_place
        death_year
        death_place
        sex
      }
    }
    pageInfo {
      hasNextPage
      endCursor
    }
  }
}
"#;

const PERSON_QUERY: &str = r#"
query GetPerson($id: ID!) {
  person(id: $id) {
    id
    name_full
    name_given
    name_surname
    birth_year
    estimated_birth_year
    birth_place
    death_year
    death_place
    sex
  }
}
"#;

const SUBMIT_MUTATION: &str = r#"
mutation SubmitResearch($input: ResearchFindingsInput!) {
  submitResearch(input: $input) {
    success
    changes_made
    gaps_resolved
    source_id
  }
}
"#;

#[derive(Clone)]
pub struct KindredClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl KindredClient {
    /// Build a client from config. Fails when the API section is empty so
    /// that roster actions surface a clear message instead of a bad request.
    pub fn from_config(api: &ApiConfig) -> Result<Self> {
        if !api.is_configured() {
            return Err(KindredError::NotConfigured);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| KindredError::Network(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: api.endpoint.trim_end_matches('/').to_string(),
            api_key: api.key.clone(),
        })
    }

    async fn execute(&self, query: &str, variables: Value) -> Result<Value> {
        let payload = json!({ "query": query, "variables": variables });

        let resp = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("X-API-Key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(KindredError::Api { status: status.as_u16(), message });
        }

        let body: Value = resp.json().await?;
        if let Some(errors) = body.get("errors") {
            return Err(KindredError::GraphQl(errors.to_string()));
        }
        Ok(body)
    }

    /// One page of people, in the roster's deterministic cursor order.
    async fn people_page(&self, after: Option<&str>) -> Result<(Vec<Person>, PageInfo)> {
        let mut variables = json!({ "first": PAGE_SIZE });
        if let Some(cursor) = after {
            variables["after"] = json!(cursor);
        }

        let body = self.execute(PEOPLE_QUERY, variables).await?;
        let connection = body
            .pointer("/data/people")
            .ok_or_else(|| KindredError::Malformed("missing data.people".to_string()))?;

        let mut people = Vec::new();
        if let Some(edges) = connection.get("edges").and_then(|e| e.as_array()) {
            for edge in edges {
                if let Some(node) = edge.get("node") {
                    match serde_json::from_value::<Person>(node.clone()) {
                        Ok(person) => people.push(person),
                        Err(e) => debug!(error = %e, "Skipping unparseable person node"),
                    }
                }
            }
        }

        let page_info: PageInfo = connection
            .get("pageInfo")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| KindredError::Malformed(e.to_string()))?
            .unwrap_or_default();

        Ok((people, page_info))
    }

    /// Iterator over every person in the roster, paging transparently.
    pub fn people(&self) -> PeopleIter {
        PeopleIter {
            client: self.clone(),
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
        }
    }

    pub async fn person(&self, id: &str) -> Result<Option<Person>> {
        let body = self.execute(PERSON_QUERY, json!({ "id": id })).await?;
        match body.pointer("/data/person") {
            None | Some(Value::Null) => Ok(None),
            Some(node) => serde_json::from_value(node.clone())
                .map(Some)
                .map_err(|e| KindredError::Malformed(e.to_string())),
        }
    }

    /// Submit approved research findings. Consumes staging output read-only;
    /// the caller is responsible for the confirmation gate.
    pub async fn submit_research(&self, submission: &ResearchSubmission) -> Result<SubmitOutcome> {
        let input = serde_json::to_value(submission)
            .map_err(|e| KindredError::Malformed(e.to_string()))?;
        let body = self.execute(SUBMIT_MUTATION, json!({ "input": input })).await?;

        let outcome = body
            .pointer("/data/submitResearch")
            .cloned()
            .ok_or_else(|| KindredError::Malformed("missing data.submitResearch".to_string()))?;
        serde_json::from_value(outcome).map_err(|e| KindredError::Malformed(e.to_string()))
    }
}

/// Single-consumer iterator over roster people.
pub struct PeopleIter {
    client: KindredClient,
    buffer: VecDeque<Person>,
    cursor: Option<String>,
    exhausted: bool,
}

impl PeopleIter {
    pub async fn next(&mut self) -> Result<Option<Person>> {
        if let Some(person) = self.buffer.pop_front() {
            return Ok(Some(person));
        }
        if self.exhausted {
            return Ok(None);
        }

        let (people, page_info) = self.client.people_page(self.cursor.as_deref()).await?;
        self.buffer.extend(people);
        self.cursor = page_info.end_cursor;
        if !page_info.has_next_page {
            self.exhausted = true;
        }

        Ok(self.buffer.pop_front())
    }
}
