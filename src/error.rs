use thiserror::Error;

/// Failures surfaced by the harvest pipeline and the store.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Transport failure talking to the collection API. Retried.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success status or an unparseable body. Retried like `Network`.
    #[error("API error (status {status}): {message}")]
    ApiResponse { status: u16, message: String },

    /// A single record could not be normalized and was skipped.
    #[error("skipped record: {0}")]
    ValidationSkip(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("query error: {0}")]
    Query(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("render error: {0}")]
    Render(#[from] std::fmt::Error),
}

impl HarvestError {
    /// Whether the fetcher should try the request again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HarvestError::Network(_) | HarvestError::ApiResponse { .. })
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
