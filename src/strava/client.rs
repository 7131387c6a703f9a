use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{Config, OAuthCredentials, ACTIVITY_PAGE_SIZE, HTTP_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::oauth::{ClientAuth, TokenManager};
use crate::strava::streams::{parse_streams, STREAM_KEYS};
use crate::types::{ActivitySummary, RawSample};

pub struct StravaClient {
    http: reqwest::Client,
    api_url: String,
    tokens: TokenManager,
}

impl StravaClient {
    /// Build the client from config and perform the initial token refresh.
    /// Missing or rejected credentials are fatal.
    pub async fn connect(cfg: &Config) -> Result<Self> {
        let creds = cfg.strava_credentials()?;
        Self::new(&cfg.strava_api_url, &cfg.strava_token_url, creds).await
    }

    pub async fn new(api_url: &str, token_url: &str, creds: &OAuthCredentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        let tokens = TokenManager::new(http.clone(), token_url, creds, ClientAuth::Form, "STRAVA");
        tokens.access_token().await?;
        info!("[STRAVA] authenticated against {api_url}");
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let token = self.tokens.access_token().await?;
        Ok(self.http.get(url).bearer_auth(token).send().await?)
    }

    /// Every activity of type "Run", newest first as the API returns them.
    /// Pages until a short or empty page. A non-2xx page ends the listing
    /// with whatever was collected so far.
    pub async fn list_runs(&self) -> Result<Vec<ActivitySummary>> {
        let mut runs = Vec::new();
        let mut seen = 0usize;
        let mut page = 1usize;

        loop {
            let url = format!(
                "{}/athlete/activities?per_page={}&page={}",
                self.api_url, ACTIVITY_PAGE_SIZE, page
            );
            let resp = self.get(&url).await?;
            let status = resp.status();
            if !status.is_success() {
                warn!(status = status.as_u16(), page, "[STRAVA] activity list returned {status}, stopping");
                break;
            }

            let items: Vec<serde_json::Value> = resp.json().await?;
            if items.is_empty() {
                break;
            }
            seen += items.len();

            for item in &items {
                match serde_json::from_value::<ActivitySummary>(item.clone()) {
                    Ok(activity) if activity.is_run() => runs.push(activity),
                    Ok(_) => {}
                    Err(e) => debug!("[STRAVA] skipping unparseable activity: {e}"),
                }
            }

            if items.len() < ACTIVITY_PAGE_SIZE {
                break;
            }
            page += 1;
        }

        info!(
            activities = seen,
            runs = runs.len(),
            "[STRAVA] {} activities listed, {} runs",
            seen,
            runs.len(),
        );
        Ok(runs)
    }

    pub async fn get_activity(&self, activity_id: u64) -> Result<ActivitySummary> {
        let url = format!("{}/activities/{}", self.api_url, activity_id);
        let resp = self.get(&url).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Upstream { status: status.as_u16(), url });
        }
        Ok(resp.json().await?)
    }

    /// Raw telemetry for one activity.
    pub async fn get_streams(&self, activity_id: u64) -> Result<Vec<RawSample>> {
        let url = format!(
            "{}/activities/{}/streams?keys={}&key_by_type=true",
            self.api_url, activity_id, STREAM_KEYS
        );
        let resp = self.get(&url).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Upstream { status: status.as_u16(), url });
        }
        let payload: serde_json::Value = resp.json().await?;
        let samples = parse_streams(&payload)?;
        debug!(activity_id, samples = samples.len(), "[STRAVA] streams for {activity_id}: {} samples", samples.len());
        Ok(samples)
    }
}
