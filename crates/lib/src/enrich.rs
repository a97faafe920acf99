//! # Asset Enrichment Pipeline
//!
//! Turns every downloaded asset into a textual description. One task is scheduled
//! per asset on a bounded [`WorkerPool`]; calls to recognition backends are further
//! gated by a [`RateLimiter`], so "tasks scheduled" and "calls in flight" are
//! independent numbers.
//!
//! Each asset walks an ordered fallback chain, and the first step that produces an
//! outcome ends it:
//!
//! 1. bytes present and a vision provider configured: accept a non-empty reply that
//!    is not a refusal;
//! 2. bytes present: OCR; any recognized text becomes the description, otherwise a
//!    "no text" placeholder;
//! 3. no bytes: a placeholder pointing the reader at the source document.
//!
//! Failures of one asset never touch its siblings: every error (and even a panic
//! inside a backend) is turned into a placeholder for that asset alone.

use crate::{
    errors::RecognitionError,
    pool::{WorkerPool, DEFAULT_POOL_CAP},
    prompts::vision::{is_unsupported_reply, IMAGE_DESCRIPTION_INSTRUCTION},
    providers::ai::{TextRecognizer, VisionProvider},
    rate_limit::{RateLimiter, DEFAULT_COOLDOWN, DEFAULT_RECOGNITION_PERMITS},
    types::{AssetInfo, DescriptionSource},
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Tuning for the enrichment phase.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub workers: usize,
    pub recognition_permits: usize,
    pub cooldown: Duration,
    pub instruction: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_POOL_CAP,
            recognition_permits: DEFAULT_RECOGNITION_PERMITS,
            cooldown: DEFAULT_COOLDOWN,
            instruction: IMAGE_DESCRIPTION_INSTRUCTION.to_string(),
        }
    }
}

// --- Placeholder descriptions ---

pub fn missing_bytes_placeholder(number: usize) -> String {
    format!(
        "[Document image {number}] The image could not be retrieved; please view it in the source document."
    )
}

pub fn no_text_placeholder(number: usize) -> String {
    format!("[Document image {number}] (no text recognized)")
}

pub fn failure_placeholder(number: usize, reason: &str) -> String {
    format!("[Document image {number}] Recognition failed: {reason}")
}

pub fn ocr_description(lines: &[String]) -> String {
    format!("Image contains text:\n{}", lines.join("\n"))
}

/// Describes assets with a vision provider, an OCR fallback, or a placeholder.
#[derive(Debug, Clone)]
pub struct Enricher {
    vision: Option<Box<dyn VisionProvider>>,
    ocr: Option<Arc<dyn TextRecognizer>>,
    pool: WorkerPool,
    limiter: RateLimiter,
    instruction: String,
}

impl Default for Enricher {
    fn default() -> Self {
        Self::new(EnrichmentConfig::default())
    }
}

impl Enricher {
    pub fn new(config: EnrichmentConfig) -> Self {
        Self {
            vision: None,
            ocr: None,
            pool: WorkerPool::new(config.workers),
            limiter: RateLimiter::new(config.recognition_permits, config.cooldown),
            instruction: config.instruction,
        }
    }

    pub fn with_vision(mut self, vision: Box<dyn VisionProvider>) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn TextRecognizer>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn has_vision(&self) -> bool {
        self.vision.is_some()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Describes every asset and returns them sorted by position.
    ///
    /// Returns only after all tasks have finished; every returned asset carries a
    /// description.
    #[instrument(skip_all, fields(assets = assets.len()))]
    pub async fn enrich(&self, assets: Vec<AssetInfo>) -> Vec<AssetInfo> {
        let total = assets.len();
        if total == 0 {
            return assets;
        }
        info!(
            "Describing {} images with {} workers and {} recognition permits",
            total,
            self.pool.size_for(total),
            self.limiter.permits()
        );

        let mut described = self
            .pool
            .run_all(assets, |asset| self.describe_asset(asset, total))
            .await;
        described.sort_by_key(|asset| asset.position);
        info!("All {} images described", total);
        described
    }

    async fn describe_asset(&self, mut asset: AssetInfo, total: usize) -> AssetInfo {
        let number = asset.position + 1;
        let (description, source) = match asset.raw_bytes.as_deref() {
            None => {
                debug!("Image {number}/{total} has no bytes; using a placeholder");
                (missing_bytes_placeholder(number), DescriptionSource::Placeholder)
            }
            Some(bytes) => {
                let recognition = AssertUnwindSafe(self.limiter.throttle(self.recognize(
                    bytes,
                    number,
                    total,
                )))
                .catch_unwind()
                .await;
                match recognition {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!("Recognition of image {number}/{total} panicked");
                        (
                            failure_placeholder(number, "internal error"),
                            DescriptionSource::Placeholder,
                        )
                    }
                }
            }
        };
        asset.assign_description(description, source);
        asset
    }

    /// Runs the vision-then-OCR chain for one image. Called while holding a permit.
    async fn recognize(
        &self,
        bytes: &[u8],
        number: usize,
        total: usize,
    ) -> (String, DescriptionSource) {
        if let Some(vision) = &self.vision {
            info!("Describing image {number}/{total} with the vision provider");
            match vision.describe_image(bytes, &self.instruction).await {
                Ok(reply) if !reply.trim().is_empty() && !is_unsupported_reply(&reply) => {
                    return (reply.trim().to_string(), DescriptionSource::Vision);
                }
                Ok(reply) => {
                    debug!("Vision reply for image {number} rejected: {reply:?}");
                }
                Err(e) => {
                    warn!("Vision provider failed for image {number}: {e}");
                }
            }
        }

        let Some(ocr) = &self.ocr else {
            return (
                failure_placeholder(number, "no recognition backend could describe this image"),
                DescriptionSource::Placeholder,
            );
        };

        info!("Running OCR on image {number}/{total}");
        match ocr.recognize_text(bytes).await {
            Ok(lines) => {
                let lines: Vec<String> = lines
                    .into_iter()
                    .map(|line| line.trim().to_string())
                    .filter(|line| !line.is_empty())
                    .collect();
                if lines.is_empty() {
                    (no_text_placeholder(number), DescriptionSource::Placeholder)
                } else {
                    (ocr_description(&lines), DescriptionSource::Ocr)
                }
            }
            Err(e) => {
                warn!("OCR failed for image {number}: {e}");
                (
                    failure_placeholder(number, &describe_error(&e)),
                    DescriptionSource::Placeholder,
                )
            }
        }
    }
}

fn describe_error(error: &RecognitionError) -> String {
    match error {
        RecognitionError::RateLimited(_) => "rate limited, please retry later".to_string(),
        other => other.to_string(),
    }
}
