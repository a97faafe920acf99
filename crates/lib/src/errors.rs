use thiserror::Error;

/// Errors that abort a whole document retrieval.
///
/// Degraded paths (a failed asset download, a failed recognition) never surface here;
/// they end up as placeholder descriptions on the affected asset instead.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Invalid document reference: {0}")]
    InvalidReference(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Transient failure talking to the document platform: {0}")]
    Transient(String),
    #[error("Failed to list document blocks: {0}")]
    BlockListing(String),
    #[error("Document platform returned an error: {message} (code: {code})")]
    Api { code: i64, message: String },
    #[error("Unsupported document object type: {0}")]
    UnsupportedObjectType(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("An internal error occurred: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Errors raised by OCR and vision recognition backends.
///
/// These never escape the enrichment pipeline: every variant is turned into a
/// placeholder description for the asset that produced it.
#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("Failed to build Reqwest client: {0}")]
    ClientBuild(reqwest::Error),
    #[error("Recognition backend is rate limiting requests: {0}")]
    RateLimited(String),
    #[error("Failed to send recognition request: {0}")]
    Request(reqwest::Error),
    #[error("Failed to deserialize recognition response: {0}")]
    Deserialization(reqwest::Error),
    #[error("Recognition backend returned an error: {0}")]
    Api(String),
    #[error("API key is missing")]
    MissingApiKey,
}

impl RecognitionError {
    /// Whether retrying the same call later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            RecognitionError::RateLimited(_) => true,
            RecognitionError::Request(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
