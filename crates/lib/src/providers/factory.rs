//! # Vision Provider Factory
//!
//! Builds a boxed [`VisionProvider`] from configuration so every consumer (the
//! CLI, tests, other front ends) creates providers the same way.

use crate::{
    errors::RecognitionError,
    providers::ai::{gemini::GeminiProvider, local::LocalAiProvider, VisionProvider},
};
use serde::Deserialize;
use std::env;
use tracing::info;

/// Default endpoint for Volcano Ark's OpenAI-compatible chat completions API.
pub const DEFAULT_LOCAL_API_URL: &str = "https://ark.cn-beijing.volces.com/api/v3/chat/completions";

/// Which vision backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisionProviderKind {
    /// OpenAI-compatible chat completions with `image_url` content parts.
    #[default]
    Local,
    Gemini,
}

impl std::str::FromStr for VisionProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "openai" | "ark" => Ok(Self::Local),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!("unknown vision provider '{other}'")),
        }
    }
}

/// Settings for the vision backend. Nothing here has a hardcoded credential.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisionConfig {
    #[serde(default)]
    pub provider: VisionProviderKind,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

impl VisionConfig {
    /// Reads `VISION_PROVIDER`, `VISION_API_URL`, `VISION_API_KEY` and `VISION_MODEL`.
    ///
    /// Returns `None` when neither a key nor a URL is configured, meaning vision is off.
    pub fn from_env() -> Option<Self> {
        let api_url = env::var("VISION_API_URL").ok().filter(|v| !v.is_empty());
        let api_key = env::var("VISION_API_KEY").ok().filter(|v| !v.is_empty());
        if api_url.is_none() && api_key.is_none() {
            return None;
        }
        let provider = env::var("VISION_PROVIDER")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        Some(Self {
            provider,
            api_url,
            api_key,
            model: env::var("VISION_MODEL").ok().filter(|v| !v.is_empty()),
        })
    }
}

/// Creates a vision provider instance from `config`.
pub fn create_vision_provider(
    config: &VisionConfig,
) -> Result<Box<dyn VisionProvider>, RecognitionError> {
    let provider: Box<dyn VisionProvider> = match config.provider {
        VisionProviderKind::Gemini => {
            let api_key = config
                .api_key
                .clone()
                .ok_or(RecognitionError::MissingApiKey)?;
            let model = config.model.as_deref().unwrap_or("gemini-2.0-flash");
            let api_url = config.api_url.clone().unwrap_or_else(|| {
                format!(
                    "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent"
                )
            });
            info!("Configuring Gemini vision provider with URL: {}", api_url);
            Box::new(GeminiProvider::new(api_url, api_key)?)
        }
        VisionProviderKind::Local => {
            let api_url = config
                .api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_LOCAL_API_URL.to_string());
            info!(
                "Configuring OpenAI-compatible vision provider with URL: {}",
                api_url
            );
            Box::new(LocalAiProvider::new(
                api_url,
                config.api_key.clone(),
                config.model.clone(),
            )?)
        }
    };
    Ok(provider)
}
