//! # Tenant Access Token Cache
//!
//! Holds the app credential and a cached tenant access token. The token is reused
//! until its expiry (platform lifetime minus a safety margin) and refreshed on the
//! first call after it.
//!
//! Replacing the credential bumps a generation counter. A refresh that started
//! under an older generation still answers its own caller but never writes its
//! token into the cache.

use crate::{api::FeishuApi, errors::FeishuError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const TOKEN_PATH: &str = "auth/v3/tenant_access_token/internal";

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub app_id: String,
    pub app_secret: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    app_id: &'a str,
    app_secret: &'a str,
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    tenant_access_token: Option<String>,
    /// Lifetime in seconds.
    expire: Option<u64>,
}

#[derive(Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
struct StoreState {
    credential: Option<Credential>,
    token: Option<AccessToken>,
    generation: u64,
}

pub struct CredentialStore {
    api: FeishuApi,
    safety_margin: Duration,
    state: RwLock<StoreState>,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("safety_margin", &self.safety_margin)
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    pub fn new(api: FeishuApi, safety_margin: Duration) -> Self {
        Self {
            api,
            safety_margin,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Seeds the store with a credential at construction time.
    pub fn with_credential(
        mut self,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Self {
        let state = self.state.get_mut();
        state.credential = Some(Credential {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
        });
        state.generation += 1;
        self
    }

    /// Replaces the app credential and drops any cached token.
    pub async fn set_credential(&self, app_id: impl Into<String>, app_secret: impl Into<String>) {
        let credential = Credential {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
        };
        let mut state = self.state.write().await;
        info!("Feishu app credential set for {}", credential.app_id);
        state.credential = Some(credential);
        state.token = None;
        state.generation += 1;
    }

    pub async fn is_configured(&self) -> bool {
        self.state.read().await.credential.is_some()
    }

    /// Forgets the cached token so the next call refreshes it.
    pub async fn invalidate(&self) {
        self.state.write().await.token = None;
    }

    /// Returns a valid tenant access token, refreshing it when stale.
    pub async fn get_token(&self) -> Result<String, FeishuError> {
        let (credential, generation) = {
            let state = self.state.read().await;
            if let Some(token) = &state.token {
                if Instant::now() < token.expires_at {
                    return Ok(token.value.clone());
                }
            }
            let credential = state
                .credential
                .clone()
                .filter(|c| !c.app_id.is_empty() && !c.app_secret.is_empty())
                .ok_or(FeishuError::NotConfigured)?;
            (credential, state.generation)
        };

        let fresh = self.request_token(&credential).await?;

        let mut state = self.state.write().await;
        if state.generation == generation {
            state.token = Some(fresh.clone());
        } else {
            warn!("Credential changed while refreshing the access token; not caching it");
        }
        Ok(fresh.value)
    }

    async fn request_token(&self, credential: &Credential) -> Result<AccessToken, FeishuError> {
        debug!("Requesting tenant access token for {}", credential.app_id);
        let response = self
            .api
            .post(TOKEN_PATH)
            .json(&TokenRequest {
                app_id: &credential.app_id,
                app_secret: &credential.app_secret,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            FeishuError::Auth(format!("unreadable token response (HTTP {status}): {e}"))
        })?;
        if parsed.code != 0 {
            return Err(FeishuError::Auth(format!(
                "{} (code: {})",
                parsed.msg, parsed.code
            )));
        }
        let value = parsed
            .tenant_access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FeishuError::Auth("token response carried no token".to_string()))?;

        let lifetime = Duration::from_secs(parsed.expire.unwrap_or(0));
        let usable = lifetime.saturating_sub(self.safety_margin);
        info!(
            "Obtained tenant access token, valid for {}s (cached for {}s)",
            lifetime.as_secs(),
            usable.as_secs()
        );
        Ok(AccessToken {
            value,
            expires_at: Instant::now() + usable,
        })
    }
}
