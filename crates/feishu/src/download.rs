//! # Asset Download Pool
//!
//! Fetches image bytes for every asset on a bounded worker pool. Each asset is
//! owned by exactly one task while it downloads.
//!
//! Rate limits and transient I/O errors are retried with exponential backoff. A
//! terminal rejection of the plain request is retried once per download hint,
//! which tells the platform which document the media belongs to. A failed asset
//! keeps `raw_bytes = None` and never affects its siblings.

use crate::{
    api::{is_rate_limited, snippet, FeishuApi},
    errors::FeishuError,
};
use docscribe::{pool::WorkerPool, AssetInfo, Attempt, RetryFailure, RetryPolicy};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// Extra context accepted by the media download endpoint.
#[derive(Serialize, Debug, Clone, Copy)]
#[serde(untagged)]
enum DownloadHint<'a> {
    Object {
        obj_type: &'a str,
        obj_token: &'a str,
    },
    Document {
        doc_token: &'a str,
    },
}

#[derive(Debug, Clone)]
pub struct AssetDownloader {
    api: FeishuApi,
    pool: WorkerPool,
    retry: RetryPolicy,
}

impl AssetDownloader {
    pub fn new(api: FeishuApi, workers: usize, retry: RetryPolicy) -> Self {
        Self {
            api,
            pool: WorkerPool::new(workers),
            retry,
        }
    }

    /// Downloads every asset and returns them sorted by position.
    #[instrument(skip_all, fields(document = document_id, assets = assets.len()))]
    pub async fn download_all(
        &self,
        access_token: &str,
        document_id: &str,
        assets: Vec<AssetInfo>,
    ) -> Vec<AssetInfo> {
        let total = assets.len();
        if total == 0 {
            return assets;
        }
        info!(
            "Downloading {} images with {} workers",
            total,
            self.pool.size_for(total)
        );

        let mut downloaded = self
            .pool
            .run_all(assets, |asset| {
                self.download_asset(access_token, document_id, asset)
            })
            .await;
        downloaded.sort_by_key(|asset| asset.position);

        let failed = downloaded.iter().filter(|a| a.raw_bytes.is_none()).count();
        info!("Downloaded {} of {} images", total - failed, total);
        downloaded
    }

    async fn download_asset(
        &self,
        access_token: &str,
        document_id: &str,
        mut asset: AssetInfo,
    ) -> AssetInfo {
        match self.fetch(access_token, document_id, &asset.token).await {
            Ok(bytes) => {
                debug!("Image {} downloaded ({} bytes)", asset.position + 1, bytes.len());
                asset.raw_bytes = Some(bytes);
            }
            Err(e) => {
                warn!("Image {} ({}) could not be downloaded: {e}", asset.position + 1, asset.token);
                asset.download_error = Some(e.to_string());
            }
        }
        asset
    }

    /// Fetches the bytes of one media token.
    pub async fn fetch(
        &self,
        access_token: &str,
        document_id: &str,
        media_token: &str,
    ) -> Result<Vec<u8>, FeishuError> {
        let hints = [
            None,
            Some(DownloadHint::Object {
                obj_type: "docx",
                obj_token: document_id,
            }),
            Some(DownloadHint::Document {
                doc_token: document_id,
            }),
        ];

        let mut last_error = None;
        for hint in hints {
            let extra = match hint.map(|h| serde_json::to_string(&h)).transpose() {
                Ok(extra) => extra,
                Err(e) => return Err(FeishuError::Decode(e.to_string())),
            };
            let outcome = self
                .retry
                .run("media download", |_| {
                    self.attempt(access_token, media_token, extra.as_deref())
                })
                .await;
            match outcome {
                Ok(bytes) => return Ok(bytes),
                Err(RetryFailure::Exhausted { attempts, last }) => {
                    return Err(FeishuError::Download(format!(
                        "gave up after {attempts} attempts: {last}"
                    )));
                }
                Err(RetryFailure::Terminal(e)) => {
                    debug!("Media {media_token} rejected with hint {extra:?}: {e}");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| FeishuError::Download("no attempt was made".into())))
    }

    async fn attempt(
        &self,
        access_token: &str,
        media_token: &str,
        extra: Option<&str>,
    ) -> Attempt<Vec<u8>, FeishuError> {
        let mut request = self
            .api
            .get(access_token, &format!("drive/v1/medias/{media_token}/download"));
        if let Some(extra) = extra {
            request = request.query(&[("extra", extra)]);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return send_failure(e),
        };
        let status = response.status();
        if status.is_success() {
            return match response.bytes().await {
                Ok(bytes) if bytes.is_empty() => {
                    Attempt::Terminal(FeishuError::Download("empty response body".into()))
                }
                Ok(bytes) => Attempt::Done(bytes.to_vec()),
                Err(e) => Attempt::Retryable(FeishuError::Request(e)),
            };
        }

        let body = response.text().await.unwrap_or_default();
        if is_rate_limited(status, &body) {
            return Attempt::Retryable(FeishuError::RateLimited(format!("HTTP {status}")));
        }
        Attempt::Terminal(FeishuError::Http {
            status,
            body: snippet(&body),
        })
    }
}

/// Only timeouts and failed connections are worth another attempt.
fn send_failure(e: reqwest::Error) -> Attempt<Vec<u8>, FeishuError> {
    if e.is_timeout() || e.is_connect() {
        Attempt::Retryable(FeishuError::Request(e))
    } else {
        Attempt::Terminal(FeishuError::Request(e))
    }
}
