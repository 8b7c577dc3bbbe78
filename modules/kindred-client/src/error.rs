use thiserror::Error;

pub type Result<T> = std::result::Result<T, KindredError>;

#[derive(Debug, Error)]
pub enum KindredError {
    #[error("Roster API not configured. Add api.endpoint and api.key to the config file.")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("GraphQL errors: {0}")]
    GraphQl(String),

    #[error("Unexpected response shape: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for KindredError {
    fn from(err: reqwest::Error) -> Self {
        KindredError::Network(err.to_string())
    }
}
