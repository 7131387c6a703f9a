use crate::error::{AppError, Result};

pub const STRAVA_API_URL: &str = "https://www.strava.com/api/v3";
pub const STRAVA_TOKEN_URL: &str = "https://www.strava.com/api/v3/oauth/token";
pub const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";
pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Playlist used when SPOTIFY_PLAYLIST_ID is not set and the search finds nothing.
pub const DEFAULT_PLAYLIST_ID: &str = "3YgpDQqiu3hSEyRczMvJ9F";

/// Playlist search run when SPOTIFY_PLAYLIST_ID is not set.
pub const DEFAULT_PLAYLIST_QUERY: &str = "EDM 150 bpm";

/// Width of one resampled tick (seconds).
pub const INTERVAL_SECS: u32 = 5;

/// Forecast horizon in ticks (6 × 5s = 30s).
/// Shared by the altitude_forecast summation and the walk-forward driver;
/// the regressor is only meaningful while both use the same value.
pub const FORECAST_PERIOD: usize = 6;

/// Initial training window in ticks (36 × 5s = 3 minutes).
pub const TRAIN_PERIOD: usize = 36;

/// Two-sided z value for the 95% prediction interval.
pub const INTERVAL_Z: f64 = 1.959_964;

/// Minimum spacing between bulk stream fetches (seconds).
pub const BULK_FETCH_DELAY_SECS: u64 = 10;

/// Page size for the athlete activity list.
pub const ACTIVITY_PAGE_SIZE: usize = 200;

/// HTTP request timeout for both vendor clients.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Token considered expired this many seconds before the provider says so.
pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Raw samples whose cadence |z| reaches this value are discarded.
pub const CADENCE_OUTLIER_Z: f64 = 10.0;

/// Train/test split used when picking a run at random.
pub const TRAIN_FRACTION: f64 = 0.8;
pub const RUN_SELECTION_SEED: u64 = 444;

/// Artifact label used when no run id was supplied.
pub const DEFAULT_RUN_LABEL: &str = "train0";

/// Predicted cadence must differ from actual by more than this fraction
/// before the music tempo is changed.
pub const TEMPO_CHANGE_BAND: f64 = 0.02;

#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub strava_api_url: String,
    pub strava_token_url: String,
    pub spotify_api_url: String,
    pub spotify_token_url: String,
    /// STRAVA_CLIENT_ID / STRAVA_CLIENT_SECRET / STRAVA_REFRESH_TOKEN
    pub strava: Option<OAuthCredentials>,
    /// SPOTIFY_CLIENT_ID / SPOTIFY_CLIENT_SECRET / SPOTIFY_REFRESH_TOKEN
    pub spotify: Option<OAuthCredentials>,
    /// SPOTIFY_PLAYLIST_ID; when unset the playlist is found by search
    pub playlist_id: Option<String>,
    /// Device type playback is started on (SPOTIFY_DEVICE_TYPE)
    pub device_type: String,
    pub log_level: String,
    pub db_path: String,
    /// Initial walk-forward window in ticks (TRAIN_PERIOD)
    pub train_period: usize,
    /// Keep averaged lat/lng on the 5s grid so stored feature rows carry the route (KEEP_POSITION)
    pub keep_position: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            strava_api_url: std::env::var("STRAVA_API_URL")
                .unwrap_or_else(|_| STRAVA_API_URL.to_string()),
            strava_token_url: std::env::var("STRAVA_TOKEN_URL")
                .unwrap_or_else(|_| STRAVA_TOKEN_URL.to_string()),
            spotify_api_url: std::env::var("SPOTIFY_API_URL")
                .unwrap_or_else(|_| SPOTIFY_API_URL.to_string()),
            spotify_token_url: std::env::var("SPOTIFY_TOKEN_URL")
                .unwrap_or_else(|_| SPOTIFY_TOKEN_URL.to_string()),
            strava: credentials_from_env("STRAVA"),
            spotify: credentials_from_env("SPOTIFY"),
            playlist_id: std::env::var("SPOTIFY_PLAYLIST_ID")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            device_type: std::env::var("SPOTIFY_DEVICE_TYPE")
                .unwrap_or_else(|_| "Computer".to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "cadence.db".to_string()),
            train_period: std::env::var("TRAIN_PERIOD")
                .unwrap_or_else(|_| TRAIN_PERIOD.to_string())
                .parse::<usize>()
                .ok()
                .filter(|&p| p > 0)
                .ok_or_else(|| {
                    AppError::Config("TRAIN_PERIOD must be a positive integer".to_string())
                })?,
            keep_position: std::env::var("KEEP_POSITION")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        })
    }

    pub fn strava_credentials(&self) -> Result<&OAuthCredentials> {
        self.strava.as_ref().ok_or_else(|| {
            AppError::Authentication(
                "STRAVA_CLIENT_ID, STRAVA_CLIENT_SECRET and STRAVA_REFRESH_TOKEN must be set"
                    .to_string(),
            )
        })
    }

    pub fn spotify_credentials(&self) -> Result<&OAuthCredentials> {
        self.spotify.as_ref().ok_or_else(|| {
            AppError::Authentication(
                "SPOTIFY_CLIENT_ID, SPOTIFY_CLIENT_SECRET and SPOTIFY_REFRESH_TOKEN must be set"
                    .to_string(),
            )
        })
    }
}

/// All three variables must be present and non-empty, otherwise the
/// provider is treated as unconfigured.
fn credentials_from_env(prefix: &str) -> Option<OAuthCredentials> {
    let var = |name: &str| {
        std::env::var(format!("{prefix}_{name}"))
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    Some(OAuthCredentials {
        client_id: var("CLIENT_ID")?,
        client_secret: var("CLIENT_SECRET")?,
        refresh_token: var("REFRESH_TOKEN")?,
    })
}

/// "1", "true", "yes" and "on" (any case) enable a flag; anything else disables it.
fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_common_truthy_spellings() {
        for on in ["1", "true", "TRUE", " yes ", "On"] {
            assert!(parse_flag(on), "{on:?}");
        }
        for off in ["", "0", "false", "no", "position"] {
            assert!(!parse_flag(off), "{off:?}");
        }
    }
}
