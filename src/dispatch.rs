//! Dispatch seam and the bundled REST adapter.
//!
//! The middleware only ever sees the [`Dispatcher`] trait: action in, JSON
//! value or normalized [`ApiError`] out. [`RestDispatcher`] maps actions
//! onto the backend REST API with bearer-token injection, and is where raw
//! reqwest failures get normalized.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::action::Action;
use crate::auth::SessionHandle;
use crate::error::ApiError;

/// Generic "dispatch async action" interface.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, action: &Action) -> Result<Value, ApiError>;
}

/// Dispatcher backed by the backend REST API.
pub struct RestDispatcher {
    http: reqwest::Client,
    base_url: Url,
    session: SessionHandle,
}

impl RestDispatcher {
    pub fn new(base_url: Url, session: SessionHandle) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            session,
        }
    }
}

#[async_trait]
impl Dispatcher for RestDispatcher {
    async fn dispatch(&self, action: &Action) -> Result<Value, ApiError> {
        let url = self
            .base_url
            .join(action.path.trim_start_matches('/'))
            .map_err(|e| ApiError::Network(format!("bad action path {}: {e}", action.path)))?;
        tracing::debug!(action = %action.name, "{:?} {}", action.method, url);

        let mut req = self.http.request(action.method.into(), url);
        if let Some(token) = self.session.access_token() {
            req = req.bearer_auth(token);
        }
        if let Some(body) = &action.payload {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let resp = normalize_response(resp).await?;

        let text = resp.text().await.map_err(ApiError::from)?;
        if text.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Map a non-success response into [`ApiError::Http`], extracting the
/// Retry-After hint (seconds form only) before the body is consumed.
pub(crate) async fn normalize_response(
    resp: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let retry_after = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let message = resp.text().await.unwrap_or_default();

    Err(ApiError::Http {
        status: status.as_u16(),
        message,
        retry_after,
    })
}
