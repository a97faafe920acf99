use anyhow::anyhow;
use docscribe::{RecognitionError, RetrievalError};
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeishuError {
    #[error("Invalid Feishu document reference: {0}")]
    InvalidReference(String),
    #[error("Feishu app is not configured; set an app id and app secret")]
    NotConfigured,
    #[error("Failed to obtain an access token: {0}")]
    Auth(String),
    #[error("Feishu API returned an error: {message} (code: {code})")]
    Api { code: i64, message: String },
    #[error("Feishu API responded with HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("Feishu API is rate limiting requests: {0}")]
    RateLimited(String),
    #[error("Failed to send request to Feishu: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Failed to decode Feishu response: {0}")]
    Decode(String),
    #[error("Unsupported document object type: {0}")]
    UnsupportedObjectType(String),
    #[error("Block listing failed ({listing}) and raw content fallback failed ({raw})")]
    BlockListing { listing: String, raw: String },
    #[error("Asset download failed: {0}")]
    Download(String),
}

/// Maps plugin errors onto the caller-facing retrieval error.
impl From<FeishuError> for RetrievalError {
    fn from(err: FeishuError) -> Self {
        match err {
            FeishuError::InvalidReference(msg) => RetrievalError::InvalidReference(msg),
            FeishuError::NotConfigured => RetrievalError::Auth(err.to_string()),
            FeishuError::Auth(msg) => RetrievalError::Auth(msg),
            FeishuError::Api { code, message } => RetrievalError::Api { code, message },
            FeishuError::RateLimited(msg) => RetrievalError::Transient(msg),
            FeishuError::Request(e) => RetrievalError::Http(e),
            FeishuError::UnsupportedObjectType(t) => RetrievalError::UnsupportedObjectType(t),
            e @ FeishuError::BlockListing { .. } => RetrievalError::BlockListing(e.to_string()),
            other => RetrievalError::Internal(anyhow!(other.to_string())),
        }
    }
}

/// OCR failures surface through the recognizer trait.
impl From<FeishuError> for RecognitionError {
    fn from(err: FeishuError) -> Self {
        match err {
            FeishuError::RateLimited(msg) => RecognitionError::RateLimited(msg),
            FeishuError::Request(e) => RecognitionError::Request(e),
            other => RecognitionError::Api(other.to_string()),
        }
    }
}
