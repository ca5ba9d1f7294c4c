//! Credential cache for the remote calendar service.
//!
//! Explicit process-wide state object: per-user access tokens cached with a
//! TTL, backed by the `calendar_credentials` table and a token-refresh
//! endpoint. Expired cache entries are evicted on read.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use sqlx::{FromRow, PgPool};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::calendar::gateway::GatewayError;

/// Token provisioning as the gateway consumes it. Object-safe so gateway
/// tests can script a rejected-then-refreshed token sequence.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// A token believed valid: cached, stored-and-unexpired, or refreshed.
    async fn access_token(&self, user_id: Uuid) -> Result<String, GatewayError>;

    /// Refreshes unconditionally, bypassing cache and stored expiry. Used
    /// after the remote service rejects a token: revocation is not visible
    /// in the stored credential, so local expiry must not short-circuit.
    async fn force_refresh(&self, user_id: Uuid) -> Result<String, GatewayError>;
}

#[derive(Debug, Clone, FromRow)]
struct CredentialRow {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    /// Lifetime of the refreshed token in seconds.
    expires_in: i64,
}

struct CachedToken {
    token: String,
    fetched_at: Instant,
}

/// Per-user access-token cache with silent refresh.
pub struct CredentialStore {
    db: PgPool,
    http: Client,
    token_url: String,
    ttl: Duration,
    cache: Mutex<HashMap<Uuid, CachedToken>>,
}

impl CredentialStore {
    pub fn new(db: PgPool, token_url: String, ttl: Duration) -> Self {
        CredentialStore {
            db,
            http: Client::new(),
            token_url,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn stored_credential(&self, user_id: Uuid) -> Result<CredentialRow, GatewayError> {
        let row: Option<CredentialRow> = sqlx::query_as(
            "SELECT access_token, refresh_token, expires_at
             FROM calendar_credentials WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| GatewayError::RemoteUnavailable(format!("credential lookup failed: {e}")))?;
        row.ok_or(GatewayError::AuthRequired)
    }

    fn cached(&self, user_id: Uuid) -> Option<String> {
        let mut cache = self.cache.lock().unwrap();
        match cache.get(&user_id) {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => Some(entry.token.clone()),
            Some(_) => {
                cache.remove(&user_id);
                None
            }
            None => None,
        }
    }

    fn store_cached(&self, user_id: Uuid, token: String) {
        self.cache.lock().unwrap().insert(
            user_id,
            CachedToken {
                token,
                fetched_at: Instant::now(),
            },
        );
    }

    async fn refresh(&self, user_id: Uuid, refresh_token: &str) -> Result<String, GatewayError> {
        debug!(%user_id, "Refreshing calendar access token");

        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::RemoteUnavailable(format!("token refresh failed: {e}")))?;

        let status = response.status();
        if status.is_client_error() {
            // Refresh token revoked or expired: only re-authentication helps.
            warn!(%user_id, %status, "Token refresh rejected");
            return Err(GatewayError::AuthRequired);
        }
        if !status.is_success() {
            return Err(GatewayError::RemoteUnavailable(format!(
                "token endpoint returned {status}"
            )));
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::RemoteUnavailable(format!("bad token response: {e}")))?;

        let expires_at = Utc::now() + chrono::Duration::seconds(refreshed.expires_in);
        sqlx::query(
            "UPDATE calendar_credentials SET access_token = $1, expires_at = $2 WHERE user_id = $3",
        )
        .bind(&refreshed.access_token)
        .bind(expires_at)
        .bind(user_id)
        .execute(&self.db)
        .await
        .map_err(|e| GatewayError::RemoteUnavailable(format!("credential update failed: {e}")))?;

        Ok(refreshed.access_token)
    }
}

#[async_trait]
impl TokenSource for CredentialStore {
    /// Order: unexpired cache entry, then an unexpired stored credential,
    /// then one silent refresh. Anything else is `AuthRequired` — the caller
    /// must surface a re-authentication prompt, never retry.
    async fn access_token(&self, user_id: Uuid) -> Result<String, GatewayError> {
        if let Some(token) = self.cached(user_id) {
            return Ok(token);
        }

        let row = self.stored_credential(user_id).await?;

        if row.expires_at > Utc::now() {
            self.store_cached(user_id, row.access_token.clone());
            return Ok(row.access_token);
        }

        let refresh_token = row.refresh_token.ok_or(GatewayError::AuthRequired)?;
        let token = self.refresh(user_id, &refresh_token).await?;
        self.store_cached(user_id, token.clone());
        Ok(token)
    }

    /// A rejected token can still look unexpired locally, so this skips both
    /// the cache and the stored expiry and goes straight to the token
    /// endpoint. Without a refresh token only re-authentication helps.
    async fn force_refresh(&self, user_id: Uuid) -> Result<String, GatewayError> {
        self.cache.lock().unwrap().remove(&user_id);

        let row = self.stored_credential(user_id).await?;
        let refresh_token = row.refresh_token.ok_or(GatewayError::AuthRequired)?;
        let token = self.refresh(user_id, &refresh_token).await?;
        self.store_cached(user_id, token.clone());
        Ok(token)
    }
}
