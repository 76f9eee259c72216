//! Spotify Web API catalog implementation.

use async_trait::async_trait;
use serde::Deserialize;

use super::{rank_tracks, Catalog, CatalogError, CredentialCache, MAX_LIMIT, MIN_LIMIT};
use crate::config::{Config, ConfigError};
use crate::models::Track;
use crate::utils::{join_url, HttpClient};

/// Spotify track search.
///
/// Authenticates with the client-credentials flow through a [`CredentialCache`]
/// and searches tracks in a single market.
#[derive(Debug)]
pub struct SpotifyCatalog {
    http: HttpClient,
    api_base: String,
    market: String,
    credentials: CredentialCache,
}

impl SpotifyCatalog {
    pub fn new(
        http: HttpClient,
        api_base: impl Into<String>,
        market: impl Into<String>,
        credentials: CredentialCache,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            market: market.into(),
            credentials,
        }
    }

    /// Build from configuration. Fails if the client id or secret is missing.
    pub fn from_config(config: &Config, http: HttpClient) -> Result<Self, ConfigError> {
        let (client_id, client_secret) = config.credentials.spotify_client()?;
        let credentials = CredentialCache::new(
            http.clone(),
            &config.catalog.token_url,
            client_id,
            client_secret,
        )
        .with_safety_margin(config.catalog.token_safety_margin_ms);

        Ok(Self::new(
            http,
            &config.catalog.api_base,
            &config.catalog.market,
            credentials,
        ))
    }

    /// Map one upstream item to a [`Track`]
    pub fn format_track(item: &SpotifyTrack) -> Track {
        Track {
            id: item.id.clone(),
            name: item.name.clone(),
            artists: item.artists.iter().map(|a| a.name.clone()).collect(),
            album: item.album.name.clone(),
            album_art_url: item.album.images.first().map(|image| image.url.clone()),
            preview_url: item.preview_url.clone(),
            external_url: item.external_urls.spotify.clone(),
            popularity: item.popularity,
            duration_ms: item.duration_ms,
        }
    }

    /// Pull a readable message out of an error body, falling back to the reason phrase
    fn error_message(status: reqwest::StatusCode, body: &str) -> String {
        serde_json::from_str::<SpotifyErrorResponse>(body)
            .ok()
            .map(|e| e.error.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string())
    }
}

#[async_trait]
impl Catalog for SpotifyCatalog {
    fn id(&self) -> &str {
        "spotify"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, CatalogError> {
        let limit = limit.clamp(MIN_LIMIT, MAX_LIMIT);
        let token = self.credentials.get_token().await?;

        tracing::debug!(query, limit, market = %self.market, "Searching Spotify");

        let response = self
            .http
            .client()
            .get(join_url(&self.api_base, "search"))
            .bearer_auth(&token)
            .query(&[
                ("q", query),
                ("type", "track"),
                ("market", self.market.as_str()),
                ("limit", limit.to_string().as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Upstream {
                status: status.as_u16(),
                message: Self::error_message(status, &body),
            });
        }

        let body = response.text().await?;
        let data: SpotifySearchResponse = serde_json::from_str(&body)?;

        let tracks = data.tracks.items.iter().map(Self::format_track).collect();
        Ok(rank_tracks(tracks))
    }
}

// ===== Spotify API Types =====

/// A track item as returned by the search endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyTrack {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,
    pub album: SpotifyAlbum,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub external_urls: SpotifyExternalUrls,
    #[serde(default)]
    pub popularity: u32,
    #[serde(default)]
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyArtist {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyAlbum {
    pub name: String,
    #[serde(default)]
    pub images: Vec<SpotifyImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyImage {
    pub url: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpotifyExternalUrls {
    #[serde(default)]
    pub spotify: String,
}

#[derive(Debug, Deserialize)]
struct SpotifySearchResponse {
    tracks: SpotifyTrackPage,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrackPage {
    #[serde(default)]
    items: Vec<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct SpotifyErrorResponse {
    error: SpotifyErrorBody,
}

#[derive(Debug, Deserialize)]
struct SpotifyErrorBody {
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn item_json(id: &str, popularity: u32) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "name": format!("Track {id}"),
            "artists": [{"name": "Bill Evans"}, {"name": "Jim Hall"}],
            "album": {
                "name": "Undercurrent",
                "images": [
                    {"url": format!("https://i.example/{id}-640.jpg"), "height": 640, "width": 640},
                    {"url": format!("https://i.example/{id}-300.jpg"), "height": 300, "width": 300}
                ]
            },
            "preview_url": null,
            "external_urls": {"spotify": format!("https://open.spotify.com/track/{id}")},
            "popularity": popularity,
            "duration_ms": 185_000
        })
    }

    async fn mock_token(server: &mut mockito::ServerGuard) -> mockito::Mock {
        server
            .mock("POST", "/api/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"tok","token_type":"Bearer","expires_in":3600}"#)
            .create_async()
            .await
    }

    fn catalog_for(server: &mockito::ServerGuard) -> SpotifyCatalog {
        let http = HttpClient::new().unwrap();
        let credentials = CredentialCache::new(
            http.clone(),
            format!("{}/api/token", server.url()),
            "client",
            "secret",
        );
        SpotifyCatalog::new(http, format!("{}/v1", server.url()), "JP", credentials)
    }

    #[test]
    fn test_format_track() {
        let item: SpotifyTrack = serde_json::from_value(item_json("t1", 55)).unwrap();
        let track = SpotifyCatalog::format_track(&item);

        assert_eq!(track.id, "t1");
        assert_eq!(track.artists, vec!["Bill Evans", "Jim Hall"]);
        assert_eq!(track.album, "Undercurrent");
        assert_eq!(track.album_art_url.as_deref(), Some("https://i.example/t1-640.jpg"));
        assert_eq!(track.preview_url, None);
        assert_eq!(track.external_url, "https://open.spotify.com/track/t1");
        assert_eq!(track.duration_ms, 185_000);
    }

    #[test]
    fn test_format_track_without_images() {
        let mut json = item_json("t2", 1);
        json["album"]["images"] = serde_json::json!([]);
        let item: SpotifyTrack = serde_json::from_value(json).unwrap();

        assert_eq!(SpotifyCatalog::format_track(&item).album_art_url, None);
    }

    #[tokio::test]
    async fn test_search_sorts_by_popularity() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server).await;
        let body = serde_json::json!({
            "tracks": {"items": [
                item_json("low", 10),
                item_json("high", 80),
                item_json("mid-a", 50),
                item_json("mid-b", 50)
            ]}
        });
        let search = server
            .mock("GET", "/v1/search")
            .match_header("authorization", "Bearer tok")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "jazz cafe calm".into()),
                Matcher::UrlEncoded("type".into(), "track".into()),
                Matcher::UrlEncoded("market".into(), "JP".into()),
                Matcher::UrlEncoded("limit".into(), "4".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let tracks = catalog_for(&server).search("jazz cafe calm", 4).await.unwrap();
        let ids: Vec<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid-a", "mid-b", "low"]);
        search.assert_async().await;
    }

    #[tokio::test]
    async fn test_search_clamps_limit() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server).await;
        let search = server
            .mock("GET", "/v1/search")
            .match_query(Matcher::UrlEncoded("limit".into(), "50".into()))
            .with_status(200)
            .with_body(r#"{"tracks":{"items":[]}}"#)
            .create_async()
            .await;

        let tracks = catalog_for(&server).search("anything", 500).await.unwrap();
        assert!(tracks.is_empty());
        search.assert_async().await;
    }

    #[tokio::test]
    async fn test_search_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server).await;
        server
            .mock("GET", "/v1/search")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"status":500,"message":"Server error"}}"#)
            .create_async()
            .await;

        let err = catalog_for(&server).search("jazz", 5).await.unwrap_err();
        match err {
            CatalogError::Upstream { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "Server error");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_search_auth_failure_propagates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/token")
            .with_status(401)
            .with_body("")
            .create_async()
            .await;

        let err = catalog_for(&server).search("jazz", 5).await.unwrap_err();
        assert!(matches!(err, CatalogError::Auth(_)));
    }
}
