//! Mock catalog for testing purposes.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::catalog::{rank_tracks, Catalog, CatalogError};
use crate::models::Track;

/// What the mock answers with
#[derive(Debug, Clone)]
enum MockResponse {
    Tracks(Vec<Track>),
    Upstream { status: u16, message: String },
}

/// A catalog that returns predefined responses and records the queries it saw.
#[derive(Debug, Default)]
pub struct MockCatalog {
    response: Mutex<Option<MockResponse>>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl MockCatalog {
    /// Create a mock that returns no tracks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every search with `tracks` (ranked like a real catalog).
    pub fn with_tracks(tracks: Vec<Track>) -> Self {
        let mock = Self::new();
        mock.set_tracks(tracks);
        mock
    }

    /// Answer every search with an upstream error.
    pub fn failing(status: u16, message: impl Into<String>) -> Self {
        let mock = Self::new();
        *lock(&mock.response) = Some(MockResponse::Upstream {
            status,
            message: message.into(),
        });
        mock
    }

    /// Set the tracks to return.
    pub fn set_tracks(&self, tracks: Vec<Track>) {
        *lock(&self.response) = Some(MockResponse::Tracks(tracks));
    }

    /// Queries received so far, with the limit each was called with.
    pub fn queries(&self) -> Vec<(String, usize)> {
        lock(&self.queries).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Catalog for MockCatalog {
    fn id(&self) -> &str {
        "mock"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, CatalogError> {
        lock(&self.queries).push((query.to_string(), limit));

        match lock(&self.response).clone() {
            Some(MockResponse::Tracks(tracks)) => {
                Ok(rank_tracks(tracks.into_iter().take(limit).collect()))
            }
            Some(MockResponse::Upstream { status, message }) => {
                Err(CatalogError::Upstream { status, message })
            }
            None => Ok(Vec::new()),
        }
    }
}

/// Helper function to create a mock track for testing.
pub fn make_track(id: &str, popularity: u32) -> Track {
    Track {
        id: id.to_string(),
        name: format!("Track {}", id),
        artists: vec!["Test Artist".to_string()],
        album: "Test Album".to_string(),
        album_art_url: None,
        preview_url: None,
        external_url: format!("https://open.example.com/track/{}", id),
        popularity,
        duration_ms: 180_000,
    }
}
