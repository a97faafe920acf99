//! Thin HTTP layer over the Feishu open platform.
//!
//! Every JSON endpoint answers with the same envelope, `{code, msg, data}`, where a
//! non-zero `code` is an application-level failure even on HTTP 200.

use crate::{config::FeishuConfig, errors::FeishuError};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};

#[derive(Deserialize, Debug)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub code: i64,
    #[serde(default, alias = "message")]
    pub msg: String,
    pub data: Option<T>,
}

/// Shared client plus base URL. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FeishuApi {
    client: Client,
    base_url: String,
}

impl FeishuApi {
    pub fn new(config: &FeishuConfig) -> Result<Self, FeishuError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn get(&self, access_token: &str, path: &str) -> RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(access_token)
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path))
    }

    /// Sends `request` and unwraps the `data` member of the envelope.
    pub(crate) async fn send_for_data<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, FeishuError> {
        let response = request.send().await?;
        read_envelope(response)
            .await?
            .ok_or_else(|| FeishuError::Decode("response carried no data".to_string()))
    }
}

/// Reads a JSON envelope, turning HTTP and application failures into errors.
pub(crate) async fn read_envelope<T: DeserializeOwned>(
    response: Response,
) -> Result<Option<T>, FeishuError> {
    let status = response.status();
    let body = response.text().await?;
    if is_rate_limited(status, &body) {
        return Err(FeishuError::RateLimited(format!("HTTP {status}")));
    }

    let envelope: Envelope<T> = match serde_json::from_str(&body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(FeishuError::Http {
                status,
                body: snippet(&body),
            })
        }
        Err(e) => return Err(FeishuError::Decode(e.to_string())),
    };

    if envelope.code != 0 {
        return Err(FeishuError::Api {
            code: envelope.code,
            message: envelope.msg,
        });
    }
    if !status.is_success() {
        return Err(FeishuError::Http {
            status,
            body: snippet(&body),
        });
    }
    Ok(envelope.data)
}

/// HTTP 429, or the HTTP 400 the platform uses for its frequency limit.
pub(crate) fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    status == StatusCode::BAD_REQUEST && body.to_ascii_lowercase().contains("frequency limit")
}

pub(crate) fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}
