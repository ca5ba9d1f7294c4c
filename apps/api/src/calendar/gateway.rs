//! Remote calendar gateway — the single point of entry for all calls to the
//! calendar of record.
//!
//! The gateway never retries on its own: it has no idempotency context, and
//! a blindly retried create would double-book. Retry policy belongs to
//! callers that know whether an operation is a read.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::calendar::auth::TokenSource;
use crate::models::event::{CalendarEvent, EventSpec};

/// Failures crossing the gateway boundary.
///
/// `AuthRequired` means the credential is missing or expired and could not
/// be silently refreshed; the conversational surface must prompt for
/// re-authentication. `RemoteUnavailable` is a transient transport or
/// service failure; callers with read semantics may deliberately retry.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("calendar authorization required")]
    AuthRequired,

    #[error("calendar service unavailable: {0}")]
    RemoteUnavailable(String),
}

/// Operations the scheduler needs from the calendar of record.
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    async fn list_events(
        &self,
        user_id: Uuid,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, GatewayError>;

    /// `None` when the event does not (or no longer does) exist.
    async fn get_event(
        &self,
        user_id: Uuid,
        event_id: &str,
    ) -> Result<Option<CalendarEvent>, GatewayError>;

    async fn create_event(
        &self,
        user_id: Uuid,
        spec: &EventSpec,
    ) -> Result<CalendarEvent, GatewayError>;

    async fn update_event(
        &self,
        user_id: Uuid,
        event_id: &str,
        spec: &EventSpec,
    ) -> Result<CalendarEvent, GatewayError>;

    async fn delete_event(&self, user_id: Uuid, event_id: &str) -> Result<(), GatewayError>;

    /// True iff the range is free of busy blocks.
    async fn query_free_busy(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    busy: Vec<BusyBlock>,
}

#[derive(Debug, Deserialize)]
struct BusyBlock {
    #[allow(dead_code)]
    start: DateTime<Utc>,
    #[allow(dead_code)]
    end: DateTime<Utc>,
}

/// HTTP implementation against the remote calendar REST API.
pub struct HttpCalendarGateway {
    client: Client,
    base_url: String,
    credentials: Arc<dyn TokenSource>,
}

impl HttpCalendarGateway {
    pub fn new(base_url: String, credentials: Arc<dyn TokenSource>) -> Self {
        HttpCalendarGateway {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            base_url,
            credentials,
        }
    }

    /// Sends one authenticated request. A 401/403 triggers exactly one
    /// forced token refresh and resend before surfacing `AuthRequired`.
    /// With `missing_ok` a 404 is returned to the caller instead of becoming
    /// an error.
    async fn send(
        &self,
        user_id: Uuid,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
        missing_ok: bool,
    ) -> Result<reqwest::Response, GatewayError> {
        let url = format!("{}{path}", self.base_url);

        for attempt in 0..2 {
            let token = self.credentials.access_token(user_id).await?;
            let mut request = self
                .client
                .request(method.clone(), &url)
                .bearer_auth(&token)
                .query(query);
            if let Some(body) = &body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .map_err(|e| GatewayError::RemoteUnavailable(e.to_string()))?;

            let status = response.status();
            if (status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN)
                && attempt == 0
            {
                // The cache and the stored expiry both still vouch for the
                // rejected token, so the refresh must be unconditional.
                debug!(%user_id, %status, "Calendar rejected token, refreshing once");
                self.credentials.force_refresh(user_id).await?;
                continue;
            }
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(GatewayError::AuthRequired);
            }
            if missing_ok && status == StatusCode::NOT_FOUND {
                return Ok(response);
            }
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(GatewayError::RemoteUnavailable(format!(
                    "calendar returned {status}: {text}"
                )));
            }
            return Ok(response);
        }
        unreachable!("send loop returns within two attempts")
    }
}

#[async_trait]
impl CalendarGateway for HttpCalendarGateway {
    async fn list_events(
        &self,
        user_id: Uuid,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, GatewayError> {
        let response = self
            .send(
                user_id,
                Method::GET,
                "/events",
                &[
                    ("start", range_start.to_rfc3339()),
                    ("end", range_end.to_rfc3339()),
                ],
                None,
                false,
            )
            .await?;
        response
            .json()
            .await
            .map_err(|e| GatewayError::RemoteUnavailable(format!("bad events response: {e}")))
    }

    async fn get_event(
        &self,
        user_id: Uuid,
        event_id: &str,
    ) -> Result<Option<CalendarEvent>, GatewayError> {
        let response = self
            .send(
                user_id,
                Method::GET,
                &format!("/events/{event_id}"),
                &[],
                None,
                true,
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        response
            .json()
            .await
            .map(Some)
            .map_err(|e| GatewayError::RemoteUnavailable(format!("bad event response: {e}")))
    }

    async fn create_event(
        &self,
        user_id: Uuid,
        spec: &EventSpec,
    ) -> Result<CalendarEvent, GatewayError> {
        let body = serde_json::to_value(spec)
            .map_err(|e| GatewayError::RemoteUnavailable(format!("bad event spec: {e}")))?;
        let response = self
            .send(user_id, Method::POST, "/events", &[], Some(body), false)
            .await?;
        response
            .json()
            .await
            .map_err(|e| GatewayError::RemoteUnavailable(format!("bad create response: {e}")))
    }

    async fn update_event(
        &self,
        user_id: Uuid,
        event_id: &str,
        spec: &EventSpec,
    ) -> Result<CalendarEvent, GatewayError> {
        let body = serde_json::to_value(spec)
            .map_err(|e| GatewayError::RemoteUnavailable(format!("bad event spec: {e}")))?;
        let response = self
            .send(
                user_id,
                Method::PATCH,
                &format!("/events/{event_id}"),
                &[],
                Some(body),
                false,
            )
            .await?;
        response
            .json()
            .await
            .map_err(|e| GatewayError::RemoteUnavailable(format!("bad update response: {e}")))
    }

    async fn delete_event(&self, user_id: Uuid, event_id: &str) -> Result<(), GatewayError> {
        self.send(
            user_id,
            Method::DELETE,
            &format!("/events/{event_id}"),
            &[],
            None,
            false,
        )
        .await?;
        Ok(())
    }

    async fn query_free_busy(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool, GatewayError> {
        let response = self
            .send(
                user_id,
                Method::GET,
                "/freebusy",
                &[("start", start.to_rfc3339()), ("end", end.to_rfc3339())],
                None,
                false,
            )
            .await?;
        let parsed: FreeBusyResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::RemoteUnavailable(format!("bad freebusy response: {e}")))?;
        Ok(parsed.busy.is_empty())
    }
}
