//! Client-credentials token cache for the catalog API.

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::CatalogError;
use crate::config::MIN_TOKEN_SAFETY_MARGIN_MS;
use crate::utils::HttpClient;

/// A bearer token and the instant (epoch millis) after which it must not be used.
pub struct CachedToken {
    value: String,
    expires_at_ms: i64,
}

impl std::fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("expires_at_ms", &self.expires_at_ms)
            .finish()
    }
}

impl CachedToken {
    /// Build a token issued at `now_ms` that the upstream says lives for
    /// `expires_in_secs`. The safety margin is taken off the lifetime here.
    pub fn new(value: String, expires_in_secs: u64, now_ms: i64, safety_margin_ms: i64) -> Self {
        let lifetime_ms = i64::try_from(expires_in_secs)
            .unwrap_or(i64::MAX / 1000)
            .saturating_mul(1000);
        Self {
            value,
            expires_at_ms: now_ms
                .saturating_add(lifetime_ms)
                .saturating_sub(safety_margin_ms),
        }
    }

    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at_ms
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at_ms(&self) -> i64 {
        self.expires_at_ms
    }
}

/// Holds the current catalog token and refreshes it on demand.
///
/// Refreshes happen behind an async mutex, so concurrent callers in one
/// process wait for a single exchange instead of racing.
pub struct CredentialCache {
    http: HttpClient,
    token_url: String,
    client_id: String,
    client_secret: String,
    safety_margin_ms: i64,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("safety_margin_ms", &self.safety_margin_ms)
            .finish_non_exhaustive()
    }
}

impl CredentialCache {
    pub fn new(
        http: HttpClient,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            safety_margin_ms: MIN_TOKEN_SAFETY_MARGIN_MS,
            cached: Mutex::new(None),
        }
    }

    /// Set the safety margin; values below the minimum are raised to it
    pub fn with_safety_margin(mut self, margin_ms: i64) -> Self {
        self.safety_margin_ms = margin_ms.max(MIN_TOKEN_SAFETY_MARGIN_MS);
        self
    }

    /// Return a valid bearer token, exchanging credentials if needed
    pub async fn get_token(&self) -> Result<String, CatalogError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_valid_at(Utc::now().timestamp_millis()) {
                return Ok(token.value().to_string());
            }
        }

        let token = self.exchange().await?;
        let value = token.value().to_string();
        tracing::debug!(expires_at_ms = token.expires_at_ms(), "Refreshed catalog token");
        *cached = Some(token);
        Ok(value)
    }

    async fn exchange(&self) -> Result<CachedToken, CatalogError> {
        let response = self
            .http
            .client()
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| CatalogError::Auth(format!("token request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<TokenErrorResponse>(&body)
                .ok()
                .map(|e| e.error_description.unwrap_or(e.error))
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
            return Err(CatalogError::Auth(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                detail
            )));
        }

        let data: TokenResponse = response
            .json()
            .await
            .map_err(|e| {
                CatalogError::Auth(format!("invalid token response: {}", e.without_url()))
            })?;

        Ok(CachedToken::new(
            data.access_token,
            data.expires_in,
            Utc::now().timestamp_millis(),
            self.safety_margin_ms,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}
