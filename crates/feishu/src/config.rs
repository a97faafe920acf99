use docscribe::{pool::DEFAULT_POOL_CAP, RetryPolicy};
use std::env;
use std::time::Duration;

/// Production Feishu open platform endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://open.feishu.cn/open-apis";

/// Settings for talking to the Feishu open platform.
#[derive(Debug, Clone)]
pub struct FeishuConfig {
    pub api_base_url: String,
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    /// Subtracted from the token lifetime the platform reports.
    pub token_safety_margin: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub download_workers: usize,
    pub download_retry: RetryPolicy,
    pub ocr_retry: RetryPolicy,
    /// Rows requested per block listing page.
    pub page_size: u32,
}

impl Default for FeishuConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            app_id: None,
            app_secret: None,
            token_safety_margin: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            download_workers: DEFAULT_POOL_CAP,
            download_retry: RetryPolicy::new(3, Duration::from_secs(1)),
            ocr_retry: RetryPolicy::new(3, Duration::from_secs(2)),
            page_size: 500,
        }
    }
}

impl FeishuConfig {
    /// Reads `FEISHU_APP_ID`, `FEISHU_APP_SECRET` and `FEISHU_API_BASE_URL`.
    ///
    /// Missing variables leave the defaults in place; credentials can still be set
    /// later through the credential store.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(base) = non_empty_var("FEISHU_API_BASE_URL") {
            config.api_base_url = base;
        }
        config.app_id = non_empty_var("FEISHU_APP_ID");
        config.app_secret = non_empty_var("FEISHU_APP_SECRET");
        config
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.api_base_url = base.into();
        self
    }

    pub fn with_credentials(
        mut self,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Self {
        self.app_id = Some(app_id.into());
        self.app_secret = Some(app_secret.into());
        self
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
