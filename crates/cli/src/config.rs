//! # CLI Configuration
//!
//! Loads settings from an optional YAML file and the environment. Later layers win:
//!
//! 1. built-in defaults;
//! 2. the YAML file (`--config`, or `docscribe.yml` in the working directory), with
//!    `${VAR}` references substituted from the environment;
//! 3. `DOCSCRIBE_...` variables for nested keys (e.g. `DOCSCRIBE_FEISHU__APP_ID`).
//!
//! The plain `FEISHU_*` and `VISION_*` variables fill in whatever is still unset.

use docscribe::providers::factory::VisionConfig;
use docscribe::EnrichmentConfig;
use docscribe_feishu::FeishuConfig;
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use regex::{Captures, Regex};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const DEFAULT_CONFIG_FILE: &str = "docscribe.yml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    General(String),
    #[error("Config file not found at '{0}'")]
    NotFound(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::General(err.to_string())
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FeishuSection {
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    pub api_base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentSection {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_recognition_permits")]
    pub recognition_permits: usize,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl Default for EnrichmentSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            recognition_permits: default_recognition_permits(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

fn default_workers() -> usize {
    docscribe::pool::DEFAULT_POOL_CAP
}

fn default_recognition_permits() -> usize {
    docscribe::rate_limit::DEFAULT_RECOGNITION_PERMITS
}

fn default_cooldown_ms() -> u64 {
    docscribe::rate_limit::DEFAULT_COOLDOWN.as_millis() as u64
}

/// The root configuration structure, mapping directly to `docscribe.yml`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub feishu: FeishuSection,
    #[serde(default)]
    pub vision: Option<VisionConfig>,
    #[serde(default)]
    pub enrichment: EnrichmentSection,
}

impl AppConfig {
    /// Feishu settings: file values over `FEISHU_*` variables over defaults.
    pub fn feishu_config(&self) -> FeishuConfig {
        let mut config = FeishuConfig::from_env();
        if let Some(base) = &self.feishu.api_base_url {
            config.api_base_url = base.clone();
        }
        if let Some(app_id) = self.feishu.app_id.clone().filter(|v| !v.is_empty()) {
            config.app_id = Some(app_id);
        }
        if let Some(secret) = self.feishu.app_secret.clone().filter(|v| !v.is_empty()) {
            config.app_secret = Some(secret);
        }
        config
    }

    pub fn enrichment_config(&self, workers_override: Option<usize>) -> EnrichmentConfig {
        EnrichmentConfig {
            workers: workers_override.unwrap_or(self.enrichment.workers),
            recognition_permits: self.enrichment.recognition_permits,
            cooldown: Duration::from_millis(self.enrichment.cooldown_ms),
            ..Default::default()
        }
    }

    /// The configured vision backend, if any.
    pub fn vision_config(&self) -> Option<VisionConfig> {
        self.vision.clone().or_else(VisionConfig::from_env)
    }
}

// Reads a file and substitutes `${VAR}` references. Returns Ok(None) if the file
// does not exist.
fn read_and_substitute(path: &str) -> Result<Option<String>, ConfigError> {
    if !Path::new(path).exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::General(format!("Failed to read config file '{path}': {e}")))?;

    let re = Regex::new(r"\$\{(?P<var>[A-Z0-9_]+)\}")
        .map_err(|e| ConfigError::General(e.to_string()))?;
    let expanded = re.replace_all(&content, |caps: &Captures| {
        env::var(&caps["var"]).unwrap_or_default()
    });
    Ok(Some(expanded.into_owned()))
}

/// Loads the configuration. An explicit path must exist; the default file is optional.
pub fn get_config(path_override: Option<&str>) -> Result<AppConfig, ConfigError> {
    let mut builder = ConfigBuilder::builder();

    let path = path_override.unwrap_or(DEFAULT_CONFIG_FILE);
    match read_and_substitute(path)? {
        Some(content) => {
            info!("Loading configuration from '{path}'");
            builder = builder.add_source(File::from_str(&content, FileFormat::Yaml));
        }
        None if path_override.is_some() => return Err(ConfigError::NotFound(path.to_string())),
        None => {}
    }

    let settings = builder
        .add_source(
            Environment::with_prefix("DOCSCRIBE")
                .prefix_separator("_")
                .try_parsing(true)
                .separator("__"),
        )
        .build()?;
    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docscribe::providers::factory::VisionProviderKind;
    use serial_test::serial;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn test_loads_yaml_with_env_substitution() {
        env::set_var("DOCSCRIBE_TEST_SECRET", "from-env");
        let file = write_config(
            "feishu:\n  app_id: cli_yaml\n  app_secret: ${DOCSCRIBE_TEST_SECRET}\n\
             vision:\n  provider: gemini\n  api_key: gem-key\n\
             enrichment:\n  workers: 3\n  cooldown_ms: 50\n",
        );

        let config = get_config(file.path().to_str()).unwrap();

        assert_eq!(config.feishu.app_id.as_deref(), Some("cli_yaml"));
        assert_eq!(config.feishu.app_secret.as_deref(), Some("from-env"));
        let vision = config.vision.clone().unwrap();
        assert_eq!(vision.provider, VisionProviderKind::Gemini);
        assert_eq!(vision.api_key.as_deref(), Some("gem-key"));

        let enrichment = config.enrichment_config(None);
        assert_eq!(enrichment.workers, 3);
        assert_eq!(enrichment.recognition_permits, 2);
        assert_eq!(enrichment.cooldown, Duration::from_millis(50));
        assert_eq!(config.enrichment_config(Some(8)).workers, 8);

        env::remove_var("DOCSCRIBE_TEST_SECRET");
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_is_an_error() {
        let result = get_config(Some("/definitely/not/here.yml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    #[serial]
    fn test_prefixed_env_overrides_nested_keys() {
        env::set_var("DOCSCRIBE_FEISHU__APP_ID", "cli_from_env");
        let file = write_config("feishu:\n  app_id: cli_yaml\n");

        let config = get_config(file.path().to_str()).unwrap();
        assert_eq!(config.feishu.app_id.as_deref(), Some("cli_from_env"));
        assert_eq!(config.feishu_config().app_id.as_deref(), Some("cli_from_env"));

        env::remove_var("DOCSCRIBE_FEISHU__APP_ID");
    }
}
