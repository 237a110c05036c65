//! HTTP client for the fleet backend's notification and push-token endpoints.
//!
//! Uses reqwest-middleware for transient retries. The bearer token is read
//! from durable storage on every request so a login or logout elsewhere in
//! the process takes effect immediately.

use reqwest::header::ACCEPT;
use reqwest::{Method, Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::errors::{AppError, Result};
use crate::models::notification::NotificationRecord;
use crate::models::push::PushTokenRequest;
use crate::store::{KeyValueStore, AUTH_TOKEN_KEY, USER_KEY};

/// List endpoints answer either with a bare array or a `{ "data": [...] }`
/// resource envelope depending on the backend version.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListEnvelope<T> {
    Wrapped { data: Vec<T> },
    Bare(Vec<T>),
}

impl<T> ListEnvelope<T> {
    fn into_inner(self) -> Vec<T> {
        match self {
            ListEnvelope::Wrapped { data } | ListEnvelope::Bare(data) => data,
        }
    }
}

#[derive(Deserialize)]
struct UnreadCount {
    count: u64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CountEnvelope {
    Bare(UnreadCount),
    Wrapped { data: UnreadCount },
}

#[derive(Clone)]
pub struct BackendClient {
    http: ClientWithMiddleware,
    base_url: Url,
    storage: Arc<dyn KeyValueStore>,
}

impl BackendClient {
    pub fn new(
        base_url: &str,
        storage: Arc<dyn KeyValueStore>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        // Url::join drops the last segment unless the base ends with '/'
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)?;

        let reqwest_client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("fleet-notify/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);

        let http = ClientBuilder::new(reqwest_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            http,
            base_url,
            storage,
        })
    }

    /// Whether a login has stored an auth token. Read-only calls are skipped
    /// without one.
    pub async fn has_auth_token(&self) -> bool {
        matches!(self.storage.get_string(AUTH_TOKEN_KEY).await, Ok(Some(t)) if !t.is_empty())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Response> {
        let url = self.endpoint(path)?;

        let mut req = self
            .http
            .request(method.clone(), url)
            .header(ACCEPT, "application/json");

        if let Some(token) = self.storage.get_string(AUTH_TOKEN_KEY).await? {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send().await.map_err(|e| {
            tracing::warn!(%method, path, error = %e, "backend request failed");
            AppError::from(e)
        })?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(%method, path, "backend rejected credentials, clearing session");
            self.clear_auth().await;
            return Err(AppError::Unauthorized);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(%method, path, status = %status, "backend returned error");
            return Err(AppError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp)
    }

    async fn clear_auth(&self) {
        for key in [AUTH_TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.storage.remove(key).await {
                tracing::error!(key, error = %e, "failed to clear auth storage");
            }
        }
    }

    /// `GET /notifications`, newest first, as ordered by the server.
    ///
    /// Rows that fail to parse are skipped so one malformed record does not
    /// hide the rest of the list.
    pub async fn list_notifications(&self) -> Result<Vec<NotificationRecord>> {
        let resp = self.send(Method::GET, "notifications", None).await?;
        let envelope: ListEnvelope<Value> = resp.json().await?;

        let rows = envelope.into_inner();
        let total = rows.len();
        let records: Vec<NotificationRecord> = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.get("id").cloned();
                serde_json::from_value(row)
                    .map_err(|e| tracing::warn!(?id, error = %e, "skipping malformed notification"))
                    .ok()
            })
            .collect();
        if records.len() < total {
            tracing::warn!(skipped = total - records.len(), total, "notification list had malformed rows");
        }
        Ok(records)
    }

    /// `GET /notifications/unread-count`
    pub async fn unread_count(&self) -> Result<u64> {
        let resp = self
            .send(Method::GET, "notifications/unread-count", None)
            .await?;
        let count = match resp.json::<CountEnvelope>().await? {
            CountEnvelope::Bare(c) | CountEnvelope::Wrapped { data: c } => c.count,
        };
        Ok(count)
    }

    pub async fn mark_read(&self, id: i64) -> Result<()> {
        self.send(Method::POST, &format!("notifications/{}/read", id), None)
            .await?;
        Ok(())
    }

    pub async fn mark_all_read(&self) -> Result<()> {
        self.send(Method::POST, "notifications/mark-all-read", None)
            .await?;
        Ok(())
    }

    pub async fn delete_notification(&self, id: i64) -> Result<()> {
        self.send(Method::DELETE, &format!("notifications/{}", id), None)
            .await?;
        Ok(())
    }

    pub async fn register_push_token(&self, request: &PushTokenRequest<'_>) -> Result<()> {
        let body = serde_json::to_value(request)?;
        self.send(Method::POST, "push-tokens", Some(body)).await?;
        Ok(())
    }

    pub async fn unregister_push_token(&self, token: &str) -> Result<()> {
        let path = format!("push-tokens/{}", urlencoding::encode(token));
        self.send(Method::DELETE, &path, None).await?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────
