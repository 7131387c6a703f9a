use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{Config, OAuthCredentials, DEFAULT_PLAYLIST_ID, DEFAULT_PLAYLIST_QUERY, HTTP_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::oauth::{ClientAuth, TokenManager};
use crate::types::TrackFeatures;

/// audio-features accepts at most this many ids per call.
const AUDIO_FEATURES_BATCH: usize = 100;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    playlists: Option<Page<Option<PlaylistSummary>>>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    items: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<TrackRef>,
}

#[derive(Debug, Deserialize)]
struct TrackRef {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct AudioFeaturesResponse {
    audio_features: Vec<Option<AudioFeatures>>,
}

#[derive(Debug, Deserialize)]
struct AudioFeatures {
    id: String,
    uri: String,
    tempo: f64,
    duration_ms: u64,
}

#[derive(Debug, Deserialize)]
struct DevicesResponse {
    devices: Vec<Device>,
}

#[derive(Debug, Deserialize)]
struct Device {
    id: Option<String>,
    #[serde(rename = "type")]
    device_type: String,
}

/// Bare track id from a `spotify:track:<id>` uri (or the input when it has no prefix).
pub fn track_id(uri: &str) -> &str {
    uri.rsplit(':').next().unwrap_or(uri)
}

pub struct SpotifyClient {
    http: reqwest::Client,
    api_url: String,
    tokens: TokenManager,
}

impl SpotifyClient {
    pub async fn connect(cfg: &Config) -> Result<Self> {
        let creds = cfg.spotify_credentials()?;
        Self::new(&cfg.spotify_api_url, &cfg.spotify_token_url, creds).await
    }

    pub async fn new(api_url: &str, token_url: &str, creds: &OAuthCredentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        let tokens = TokenManager::new(http.clone(), token_url, creds, ClientAuth::Basic, "SPOTIFY");
        tokens.access_token().await?;
        info!("[SPOTIFY] authenticated against {api_url}");
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// GET returning `None` (with a warning) on non-2xx.
    async fn read<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        let token = self.tokens.access_token().await?;
        let resp = self.http.get(url).bearer_auth(token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "[SPOTIFY] GET {url} returned {status}");
            return Ok(None);
        }
        Ok(Some(resp.json().await?))
    }

    /// Player commands; any non-2xx is an error.
    async fn control(&self, req: reqwest::RequestBuilder, url: String) -> Result<()> {
        let token = self.tokens.access_token().await?;
        let resp = req.bearer_auth(token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Upstream { status: status.as_u16(), url });
        }
        Ok(())
    }

    pub async fn search_playlists(&self, query: &str) -> Result<Vec<PlaylistSummary>> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/search", self.api_url),
            &[("q", query), ("type", "playlist")],
        )
        .map_err(|e| AppError::Config(format!("invalid search url: {e}")))?;
        let resp: Option<SearchResponse> = self.read(url.as_str()).await?;
        Ok(resp
            .and_then(|r| r.playlists)
            .map(|p| p.items.into_iter().flatten().collect())
            .unwrap_or_default())
    }

    /// The configured playlist, else the first search hit for the default
    /// query, else the built-in playlist.
    pub async fn resolve_playlist(&self, configured: Option<&str>) -> Result<String> {
        if let Some(id) = configured {
            return Ok(id.to_string());
        }
        let found = self.search_playlists(DEFAULT_PLAYLIST_QUERY).await?;
        match found.into_iter().next() {
            Some(p) => {
                info!(playlist_id = %p.id, "[SPOTIFY] using playlist '{}' from search '{}'", p.name, DEFAULT_PLAYLIST_QUERY);
                Ok(p.id)
            }
            None => {
                warn!("[SPOTIFY] search '{}' found no playlist, using {}", DEFAULT_PLAYLIST_QUERY, DEFAULT_PLAYLIST_ID);
                Ok(DEFAULT_PLAYLIST_ID.to_string())
            }
        }
    }

    /// Track uris of a playlist, following pagination.
    pub async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<String>> {
        let mut uris = Vec::new();
        let mut next = Some(format!("{}/playlists/{}/tracks?limit=100", self.api_url, playlist_id));
        while let Some(url) = next.take() {
            let Some(page) = self.read::<Page<PlaylistItem>>(&url).await? else {
                break;
            };
            uris.extend(page.items.into_iter().filter_map(|i| i.track).map(|t| t.uri));
            next = page.next;
        }
        debug!(playlist_id, tracks = uris.len(), "[SPOTIFY] playlist {playlist_id}: {} tracks", uris.len());
        Ok(uris)
    }

    pub async fn audio_features(&self, track_ids: &[String]) -> Result<Vec<TrackFeatures>> {
        let mut features = Vec::with_capacity(track_ids.len());
        for batch in track_ids.chunks(AUDIO_FEATURES_BATCH) {
            let url = format!("{}/audio-features?ids={}", self.api_url, batch.join(","));
            let Some(resp) = self.read::<AudioFeaturesResponse>(&url).await? else {
                continue;
            };
            features.extend(resp.audio_features.into_iter().flatten().map(|f| TrackFeatures {
                id: f.id,
                uri: f.uri,
                tempo: f.tempo,
                duration_secs: f.duration_ms as f64 / 1000.0,
            }));
        }
        Ok(features)
    }

    /// First available device of the given type.
    pub async fn device_id(&self, device_type: &str) -> Result<Option<String>> {
        let url = format!("{}/me/player/devices", self.api_url);
        let devices: Option<DevicesResponse> = self.read(&url).await?;
        Ok(devices
            .into_iter()
            .flat_map(|d| d.devices)
            .find(|d| d.device_type == device_type)
            .and_then(|d| d.id))
    }

    pub async fn play_track(&self, uri: &str, device_id: Option<&str>) -> Result<()> {
        let mut url = format!("{}/me/player/play", self.api_url);
        if let Some(id) = device_id {
            url.push_str(&format!("?device_id={id}"));
        }
        let req = self
            .http
            .put(&url)
            .json(&serde_json::json!({ "uris": [uri] }));
        self.control(req, url).await
    }

    pub async fn queue(&self, uri: &str) -> Result<()> {
        let url = format!("{}/me/player/queue", self.api_url);
        let req = self.http.post(&url).query(&[("uri", uri)]).header(reqwest::header::CONTENT_LENGTH, 0);
        self.control(req, url).await
    }

    pub async fn next_track(&self) -> Result<()> {
        let url = format!("{}/me/player/next", self.api_url);
        let req = self.http.post(&url).header(reqwest::header::CONTENT_LENGTH, 0);
        self.control(req, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> SpotifyClient {
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "sp",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .mount(server)
            .await;
        let creds = OAuthCredentials {
            client_id: "cid".to_string(),
            client_secret: "csecret".to_string(),
            refresh_token: "rt".to_string(),
        };
        SpotifyClient::new(&server.uri(), &format!("{}/api/token", server.uri()), &creds)
            .await
            .unwrap()
    }

    #[test]
    fn track_id_strips_uri_prefix() {
        assert_eq!(track_id("spotify:track:6rqhFgbbKwnb9MLmUQDhG6"), "6rqhFgbbKwnb9MLmUQDhG6");
        assert_eq!(track_id("6rqhFgbbKwnb9MLmUQDhG6"), "6rqhFgbbKwnb9MLmUQDhG6");
    }

    #[tokio::test]
    async fn playlist_resolution_prefers_config_then_search_then_default() {
        let server = MockServer::start().await;
        let spotify = client(&server).await;

        assert_eq!(spotify.resolve_playlist(Some("configured")).await.unwrap(), "configured");

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", DEFAULT_PLAYLIST_QUERY))
            .and(query_param("type", "playlist"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "playlists": {
                    "items": [null, { "id": "edm150", "name": "EDM 150 BPM" }],
                    "next": null
                }
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        assert_eq!(spotify.resolve_playlist(None).await.unwrap(), "edm150");

        // The search mock is spent; unmatched requests get a 404.
        assert_eq!(spotify.resolve_playlist(None).await.unwrap(), DEFAULT_PLAYLIST_ID);
    }

    #[tokio::test]
    async fn playlist_tracks_follow_next_links() {
        let server = MockServer::start().await;
        let spotify = client(&server).await;
        let second = format!("{}/playlists/pl/tracks?offset=100&limit=100", server.uri());
        Mock::given(method("GET"))
            .and(path("/playlists/pl/tracks"))
            .and(query_param("offset", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{ "track": { "uri": "spotify:track:c" } }],
                "next": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/playlists/pl/tracks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    { "track": { "uri": "spotify:track:a" } },
                    { "track": null },
                    { "track": { "uri": "spotify:track:b" } }
                ],
                "next": second
            })))
            .mount(&server)
            .await;

        let uris = spotify.playlist_tracks("pl").await.unwrap();
        assert_eq!(uris, vec!["spotify:track:a", "spotify:track:b", "spotify:track:c"]);
    }

    #[tokio::test]
    async fn audio_features_skip_null_entries() {
        let server = MockServer::start().await;
        let spotify = client(&server).await;
        Mock::given(method("GET"))
            .and(path("/audio-features"))
            .and(query_param("ids", "a,b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "audio_features": [
                    { "id": "a", "uri": "spotify:track:a", "tempo": 150.2, "duration_ms": 201000 },
                    null
                ]
            })))
            .mount(&server)
            .await;

        let features = spotify
            .audio_features(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].duration_secs, 201.0);
    }

    #[tokio::test]
    async fn reads_are_empty_on_error_status() {
        let server = MockServer::start().await;
        let spotify = client(&server).await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(spotify.search_playlists("EDM 150 bpm").await.unwrap().is_empty());
        assert!(spotify.playlist_tracks("pl").await.unwrap().is_empty());
        assert_eq!(spotify.device_id("Computer").await.unwrap(), None);
    }

    #[tokio::test]
    async fn device_lookup_and_play() {
        let server = MockServer::start().await;
        let spotify = client(&server).await;
        Mock::given(method("GET"))
            .and(path("/me/player/devices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "devices": [
                    { "id": "phone-1", "type": "Smartphone" },
                    { "id": "laptop-1", "type": "Computer" }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/me/player/play"))
            .and(query_param("device_id", "laptop-1"))
            .and(body_json(json!({ "uris": ["spotify:track:a"] })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let device = spotify.device_id("Computer").await.unwrap();
        assert_eq!(device.as_deref(), Some("laptop-1"));
        spotify.play_track("spotify:track:a", device.as_deref()).await.unwrap();
    }

    #[tokio::test]
    async fn control_errors_surface() {
        let server = MockServer::start().await;
        let spotify = client(&server).await;
        Mock::given(method("POST"))
            .and(path("/me/player/next"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = spotify.next_track().await.unwrap_err();
        assert!(matches!(err, AppError::Upstream { status: 404, .. }));
    }
}
