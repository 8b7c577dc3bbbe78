use thiserror::Error;

pub type Result<T> = std::result::Result<T, CdpError>;

#[derive(Debug, Error)]
pub enum CdpError {
    /// A blocking human-verification challenge is present and could not be
    /// auto-dismissed. The tab is intentionally left open for the operator.
    #[error("Bot verification detected on {source_name} requires human intervention. Complete the verification in the browser, then retry.")]
    BotCheck { source_name: String },

    /// The source refuses further searches until its quota resets.
    #[error("{source_name} daily search limit reached. Try again tomorrow.")]
    DailyLimit { source_name: String },

    #[error("Failed to connect to browser at {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Browser timeout during {what}")]
    Timeout { what: String },

    #[error("Browser protocol error: {0}")]
    Protocol(String),
}

impl From<chromiumoxide::error::CdpError> for CdpError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        CdpError::Protocol(err.to_string())
    }
}
