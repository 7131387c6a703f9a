use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{OAuthCredentials, TOKEN_EXPIRY_MARGIN_SECS};
use crate::error::{AppError, Result};

/// How client credentials travel with a refresh-token grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuth {
    /// `client_id` / `client_secret` as form fields (Strava).
    Form,
    /// `Authorization: Basic base64(id:secret)` (Spotify).
    Basic,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
}

#[derive(Debug)]
struct TokenState {
    refresh_token: String,
    access_token: Option<String>,
    expires_at: DateTime<Utc>,
}

/// Refresh-token grant with a cached access token.
///
/// The token is renewed lazily: `access_token()` only goes to the network
/// when nothing is cached or the cached token is within
/// `TOKEN_EXPIRY_MARGIN_SECS` of expiring. Providers that rotate the refresh
/// token get the new one stored for the next grant.
pub struct TokenManager {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    auth: ClientAuth,
    /// Tag used in log lines, e.g. "STRAVA".
    provider: &'static str,
    state: Mutex<TokenState>,
}

impl TokenManager {
    pub fn new(
        http: reqwest::Client,
        token_url: impl Into<String>,
        creds: &OAuthCredentials,
        auth: ClientAuth,
        provider: &'static str,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: creds.client_id.clone(),
            client_secret: creds.client_secret.clone(),
            auth,
            provider,
            state: Mutex::new(TokenState {
                refresh_token: creds.refresh_token.clone(),
                access_token: None,
                expires_at: DateTime::<Utc>::MIN_UTC,
            }),
        }
    }

    /// A valid bearer token, refreshing first if needed.
    pub async fn access_token(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        if let Some(token) = &state.access_token {
            if now + Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) < state.expires_at {
                return Ok(token.clone());
            }
            debug!(provider = self.provider, "[{}] access token expired, refreshing", self.provider);
        }
        self.refresh(&mut state, now).await
    }

    /// Current refresh token (after any rotation).
    pub async fn refresh_token(&self) -> String {
        self.state.lock().await.refresh_token.clone()
    }

    async fn refresh(&self, state: &mut TokenState, now: DateTime<Utc>) -> Result<String> {
        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", state.refresh_token.clone()),
        ];
        let mut req = self.http.post(&self.token_url);
        match self.auth {
            ClientAuth::Form => {
                form.push(("client_id", self.client_id.clone()));
                form.push(("client_secret", self.client_secret.clone()));
            }
            ClientAuth::Basic => {
                let encoded = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
                req = req.header(reqwest::header::AUTHORIZATION, format!("Basic {encoded}"));
            }
        }

        let resp = req.form(&form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Authentication(format!(
                "{} token endpoint returned {}",
                self.provider,
                status.as_u16()
            )));
        }
        let body: TokenResponse = resp.json().await?;

        let expires_at = match (body.expires_in, body.expires_at) {
            (Some(secs), _) => now + Duration::seconds(secs),
            (None, Some(epoch)) => DateTime::from_timestamp(epoch, 0).unwrap_or(now),
            (None, None) => now,
        };
        if let Some(rotated) = body.refresh_token.filter(|t| !t.is_empty()) {
            if rotated != state.refresh_token {
                debug!(provider = self.provider, "[{}] refresh token rotated", self.provider);
                state.refresh_token = rotated;
            }
        }
        state.access_token = Some(body.access_token.clone());
        state.expires_at = expires_at;

        info!(
            provider = self.provider,
            expires_at = %expires_at,
            "[{}] access token refreshed, valid until {}",
            self.provider,
            expires_at,
        );
        Ok(body.access_token)
    }
}
