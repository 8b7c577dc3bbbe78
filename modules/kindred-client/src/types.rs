use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Source citation attached to a research submission.
#[derive(Debug, Clone, Serialize)]
pub struct SourceCitation {
    pub source_type: String,
    pub source_name: String,
    pub source_url: String,
    pub action: String,
}

impl SourceCitation {
    /// Citation for a finding scraped from a website.
    pub fn website(source_name: &str, source_url: &str) -> Self {
        Self {
            source_type: "website".to_string(),
            source_name: source_name.to_string(),
            source_url: source_url.to_string(),
            action: "create".to_string(),
        }
    }
}

/// Full research submission payload. `findings` is the field-update map;
/// `new_father`/`new_mother` create and link new people.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchSubmission {
    pub person_id: String,
    pub source: SourceCitation,
    pub confidence: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub findings: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_father: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_mother: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub agent_id: String,
}

/// What the roster reports back after a submission.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitOutcome {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub changes_made: Vec<String>,
    #[serde(default)]
    pub gaps_resolved: Vec<String>,
    #[serde(default)]
    pub source_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}
