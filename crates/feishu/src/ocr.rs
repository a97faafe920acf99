use crate::{
    api::{read_envelope, FeishuApi},
    credentials::CredentialStore,
    errors::FeishuError,
};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use docscribe::{
    providers::ai::TextRecognizer,
    retry::{Attempt, RetryPolicy},
    RecognitionError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const OCR_PATH: &str = "optical_char_recognition/v1/image/basic_recognize";

#[derive(Serialize)]
struct OcrRequest {
    image: String,
}

#[derive(Deserialize, Debug, Default)]
struct OcrData {
    #[serde(default)]
    text_list: Vec<String>,
}

/// Text recognition through the platform's basic OCR endpoint.
#[derive(Debug, Clone)]
pub struct FeishuOcr {
    api: FeishuApi,
    credentials: Arc<CredentialStore>,
    retry: RetryPolicy,
}

impl FeishuOcr {
    pub fn new(api: FeishuApi, credentials: Arc<CredentialStore>) -> Self {
        Self {
            api,
            credentials,
            retry: RetryPolicy::new(3, Duration::from_secs(2)),
        }
    }

    /// Overrides the retry policy used for rate-limited calls.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn request(
        &self,
        access_token: &str,
        body: &OcrRequest,
    ) -> Result<Option<OcrData>, FeishuError> {
        let response = self
            .api
            .post(OCR_PATH)
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await?;
        read_envelope(response).await
    }

    async fn call_once(
        &self,
        access_token: &str,
        body: &OcrRequest,
    ) -> Attempt<Vec<String>, RecognitionError> {
        match self.request(access_token, body).await {
            Ok(data) => Attempt::Done(data.unwrap_or_default().text_list),
            Err(e) => {
                let err = RecognitionError::from(e);
                if err.is_retryable() {
                    Attempt::Retryable(err)
                } else {
                    Attempt::Terminal(err)
                }
            }
        }
    }
}

#[async_trait]
impl TextRecognizer for FeishuOcr {
    async fn recognize_text(&self, image: &[u8]) -> Result<Vec<String>, RecognitionError> {
        let access_token = self.credentials.get_token().await?;
        let body = OcrRequest {
            image: general_purpose::STANDARD.encode(image),
        };
        debug!("--> Sending {} byte image to OCR", image.len());
        self.retry
            .run("ocr request", |_| self.call_once(&access_token, &body))
            .await
            .map_err(|failure| failure.into_inner())
    }
}
