//! Token refresh against the backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::dispatch::normalize_response;
use crate::error::ApiError;

/// New tokens returned by a successful refresh call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access: String,
    pub refresh: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Remote call that exchanges a refresh token for a new grant.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ApiError>;
}

/// Refresher backed by the backend's `POST /api/token/refresh/` endpoint.
pub struct HttpRefresher {
    http: reqwest::Client,
    endpoint: Url,
}

impl HttpRefresher {
    pub fn new(base_url: &Url) -> Result<Self, ApiError> {
        let endpoint = base_url
            .join("api/token/refresh/")
            .map_err(|e| ApiError::Network(format!("bad base URL: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
        })
    }
}

#[async_trait]
impl TokenRefresher for HttpRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ApiError> {
        tracing::info!("refreshing access token");

        let resp = self
            .http
            .post(self.endpoint.clone())
            .json(&json!({ "refresh": refresh_token }))
            .send()
            .await?;

        let resp = normalize_response(resp).await?;
        let grant: TokenGrant = resp
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        tracing::debug!("token refresh call succeeded");
        Ok(grant)
    }
}
