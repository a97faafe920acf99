use crate::{
    errors::RecognitionError,
    providers::ai::{compress_image, sniff_image_mime, VisionProvider, MAX_IMAGE_WIDTH},
    retry::{Attempt, RetryPolicy},
};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;

// --- Gemini-specific request and response structures ---

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Deserialize, Debug)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: ContentResponse,
}

#[derive(Deserialize, Debug)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize, Debug)]
struct PartResponse {
    #[serde(default)]
    text: String,
}

// --- Gemini Provider implementation ---

/// A vision provider backed by the Google Gemini `generateContent` API.
#[derive(Clone, Debug)]
pub struct GeminiProvider {
    client: ReqwestClient,
    api_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl GeminiProvider {
    /// Creates a new `GeminiProvider`.
    pub fn new(api_url: String, api_key: String) -> Result<Self, RecognitionError> {
        let client = ReqwestClient::builder()
            .connect_timeout(Duration::from_secs(60))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(RecognitionError::ClientBuild)?;
        Ok(Self {
            client,
            api_url,
            api_key,
            retry: RetryPolicy::new(3, Duration::from_secs(2)),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn call_once(&self, body: &GeminiRequest<'_>) -> Attempt<String, RecognitionError> {
        let response = match self
            .client
            .post(&self.api_url)
            .query(&[("key", &self.api_key)])
            .json(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let err = RecognitionError::Request(e);
                return if err.is_retryable() {
                    Attempt::Retryable(err)
                } else {
                    Attempt::Terminal(err)
                };
            }
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Attempt::Retryable(RecognitionError::RateLimited(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Attempt::Terminal(RecognitionError::Api(error_text));
        }

        let gemini_response: GeminiResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => return Attempt::Terminal(RecognitionError::Deserialization(e)),
        };

        let raw_response = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.trim().to_string())
            .unwrap_or_default();

        Attempt::Done(raw_response)
    }
}

#[async_trait]
impl VisionProvider for GeminiProvider {
    async fn describe_image(
        &self,
        image: &[u8],
        instruction: &str,
    ) -> Result<String, RecognitionError> {
        if self.api_key.is_empty() {
            return Err(RecognitionError::MissingApiKey);
        }
        let image = compress_image(image, MAX_IMAGE_WIDTH);
        let request_body = GeminiRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: instruction },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: sniff_image_mime(&image),
                            data: general_purpose::STANDARD.encode(&image),
                        },
                    },
                ],
            }],
        };

        self.retry
            .run("gemini vision request", |_| self.call_once(&request_body))
            .await
            .map_err(|failure| failure.into_inner())
    }
}
