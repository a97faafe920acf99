use crate::{
    errors::RecognitionError,
    providers::ai::{compress_image, image_data_url, VisionProvider, MAX_IMAGE_WIDTH},
    retry::{Attempt, RetryPolicy},
};
use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;
use tracing::{debug, info};

// --- OpenAI-compatible multimodal request and response structures ---

#[derive(Serialize)]
struct VisionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<VisionMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct VisionMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize, Debug)]
struct VisionResponse {
    choices: Vec<VisionChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize, Debug)]
struct VisionChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Usage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

// --- Local Provider implementation ---

/// Upper bound on generated description length.
const MAX_DESCRIPTION_TOKENS: u32 = 1000;

/// A vision provider for any OpenAI-compatible chat completions API
/// (local servers, Volcano Ark, OpenAI itself).
#[derive(Clone, Debug)]
pub struct LocalAiProvider {
    client: ReqwestClient,
    api_url: String,
    api_key: Option<String>,
    model: Option<String>,
    retry: RetryPolicy,
}

impl LocalAiProvider {
    /// Creates a new `LocalAiProvider`.
    pub fn new(
        api_url: String,
        api_key: Option<String>,
        model: Option<String>,
    ) -> Result<Self, RecognitionError> {
        let client = ReqwestClient::builder()
            .connect_timeout(Duration::from_secs(60))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(RecognitionError::ClientBuild)?;
        Ok(Self {
            client,
            api_url,
            api_key,
            model,
            retry: RetryPolicy::new(3, Duration::from_secs(2)),
        })
    }

    /// Overrides the retry policy used for rate-limited calls.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn call_once(&self, body: &VisionRequest<'_>) -> Attempt<String, RecognitionError> {
        let mut request_builder = self.client.post(&self.api_url);
        if let Some(key) = &self.api_key {
            request_builder = request_builder.bearer_auth(key);
        }

        let response = match request_builder.json(body).send().await {
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
            let snippet: String = error_text.chars().take(200).collect();
            return Attempt::Terminal(RecognitionError::Api(format!("HTTP {status}: {snippet}")));
        }

        let parsed: VisionResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => return Attempt::Terminal(RecognitionError::Deserialization(e)),
        };

        if let Some(usage) = &parsed.usage {
            info!(
                prompt_tokens = ?usage.prompt_tokens,
                completion_tokens = ?usage.completion_tokens,
                total_tokens = ?usage.total_tokens,
                "Vision API token usage"
            );
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        Attempt::Done(content)
    }
}

#[async_trait]
impl VisionProvider for LocalAiProvider {
    /// Describes an image through the chat completions endpoint.
    async fn describe_image(
        &self,
        image: &[u8],
        instruction: &str,
    ) -> Result<String, RecognitionError> {
        let image = compress_image(image, MAX_IMAGE_WIDTH);
        let request_body = VisionRequest {
            model: self.model.as_deref(),
            messages: vec![VisionMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: instruction },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image_data_url(&image),
                        },
                    },
                ],
            }],
            max_tokens: MAX_DESCRIPTION_TOKENS,
        };

        debug!(
            "--> Sending {} byte image to vision API at {}",
            image.len(),
            self.api_url
        );
        self.retry
            .run("vision request", |_| self.call_once(&request_body))
            .await
            .map_err(|failure| failure.into_inner())
    }
}
