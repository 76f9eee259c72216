//! Track model representing a single catalog result.

use serde::{Deserialize, Serialize};

/// A track returned by a catalog search.
///
/// Tracks are built once from upstream data and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Catalog identifier, unique within one result list
    pub id: String,

    /// Track title
    pub name: String,

    /// Artist names in upstream order
    pub artists: Vec<String>,

    /// Album name
    pub album: String,

    /// URL of the first (largest) album image, if the album has any
    pub album_art_url: Option<String>,

    /// 30 second preview clip, not available for every track
    pub preview_url: Option<String>,

    /// Link to the track on the catalog's own player
    pub external_url: String,

    /// Popularity score (0-100 upstream)
    pub popularity: u32,

    /// Track length in milliseconds
    pub duration_ms: u64,
}

impl Track {
    /// Artist names joined for display
    pub fn artists_display(&self) -> String {
        self.artists.join(", ")
    }

    /// Duration formatted as `m:ss`
    pub fn duration_display(&self) -> String {
        let total_secs = self.duration_ms / 1000;
        format!("{}:{:02}", total_secs / 60, total_secs % 60)
    }
}
