//! Music catalog search.
//!
//! This module defines the [`Catalog`] trait the search pipeline talks to, the
//! Spotify-backed implementation in [`SpotifyCatalog`], the [`CredentialCache`]
//! that keeps its bearer token fresh, and a [`MockCatalog`] for tests.
//!
//! Results returned by any catalog are ordered by descending popularity, with
//! ties kept in upstream order, and contain each track id at most once.

mod auth;
pub mod mock;
mod spotify;

pub use auth::{CachedToken, CredentialCache};
pub use mock::MockCatalog;
pub use spotify::{
    SpotifyAlbum, SpotifyArtist, SpotifyCatalog, SpotifyExternalUrls, SpotifyImage, SpotifyTrack,
};

use async_trait::async_trait;
use std::collections::HashSet;

use crate::models::Track;

/// Smallest number of tracks a search may request
pub const MIN_LIMIT: usize = 1;

/// Largest number of tracks a search may request
pub const MAX_LIMIT: usize = 50;

/// Default number of tracks per search
pub const DEFAULT_LIMIT: usize = 10;

/// Clamp a requested limit into the supported range
pub fn clamp_limit(limit: i64) -> usize {
    limit.clamp(MIN_LIMIT as i64, MAX_LIMIT as i64) as usize
}

/// A searchable music catalog.
#[async_trait]
pub trait Catalog: Send + Sync + std::fmt::Debug {
    /// Short identifier used in logs (e.g. "spotify")
    fn id(&self) -> &str;

    /// Search for tracks matching `query`, returning at most `limit` results
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, CatalogError>;
}

/// Drop repeated track ids (first occurrence wins) and order by popularity.
///
/// The sort is stable, so tracks with equal popularity keep upstream order.
pub fn rank_tracks(tracks: Vec<Track>) -> Vec<Track> {
    let mut seen = HashSet::new();
    let mut ranked: Vec<Track> = tracks
        .into_iter()
        .filter(|track| seen.insert(track.id.clone()))
        .collect();
    ranked.sort_by(|a, b| b.popularity.cmp(&a.popularity));
    ranked
}

/// Errors that can occur when talking to a catalog
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The credential exchange failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network or transport error
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success status from the catalog API
    #[error("API error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// The catalog answered with something we could not decode
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        CatalogError::Network(err.without_url().to_string())
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Parse(format!("JSON: {}", err))
    }
}
