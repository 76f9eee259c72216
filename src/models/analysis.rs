//! Structured search attributes extracted from a free-text prompt.

use serde::{Deserialize, Serialize};

/// Query used when a prompt has no searchable text at all
pub const FALLBACK_SEARCH_QUERY: &str = "music";

/// True when `prompt` is empty or whitespace only
pub fn is_blank_prompt(prompt: &str) -> bool {
    prompt.trim().is_empty()
}

/// Result of analysing a music request.
///
/// `search_query` is never empty: when analysis fails the trimmed prompt is
/// used, and a blank prompt becomes [`FALLBACK_SEARCH_QUERY`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Base query for the catalog search
    pub search_query: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,

    /// Energy level, 0-100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub era: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Set when the analyzer could not reach or understand the model and fell
    /// back to the raw prompt. Not part of the wire format.
    #[serde(skip)]
    pub degraded: bool,
}

impl AnalysisResult {
    /// Create a result with only a search query
    pub fn new(search_query: impl Into<String>) -> Self {
        Self {
            search_query: search_query.into(),
            ..Default::default()
        }
    }

    /// The degraded result used when analysis fails entirely
    pub fn fallback(prompt: &str) -> Self {
        Self {
            search_query: Self::query_from_prompt(prompt),
            degraded: true,
            ..Default::default()
        }
    }

    /// A non-empty search query taken from the raw prompt
    pub fn query_from_prompt(prompt: &str) -> String {
        match prompt.trim() {
            "" => FALLBACK_SEARCH_QUERY.to_string(),
            trimmed => trimmed.to_string(),
        }
    }

    pub fn mood(mut self, mood: impl Into<String>) -> Self {
        self.mood = Some(mood.into());
        self
    }

    pub fn genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn energy(mut self, energy: f64) -> Self {
        self.energy = Some(energy);
        self
    }

    pub fn tempo(mut self, tempo: impl Into<String>) -> Self {
        self.tempo = Some(tempo.into());
        self
    }

    pub fn era(mut self, era: impl Into<String>) -> Self {
        self.era = Some(era.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_fields_are_omitted() {
        let json = serde_json::to_value(AnalysisResult::new("jazz cafe").mood("calm")).unwrap();
        assert_eq!(json["searchQuery"], "jazz cafe");
        assert_eq!(json["mood"], "calm");
        assert!(json.get("genre").is_none());
        assert!(json.get("degraded").is_none());
    }

    #[test]
    fn test_fallback_is_degraded() {
        let analysis = AnalysisResult::fallback("rainy day piano");
        assert!(analysis.degraded);
        assert_eq!(analysis.search_query, "rainy day piano");
        assert!(analysis.genre.is_none());
    }

    #[test]
    fn test_fallback_never_has_blank_query() {
        assert_eq!(AnalysisResult::fallback("").search_query, FALLBACK_SEARCH_QUERY);
        assert_eq!(AnalysisResult::fallback(" \t\n").search_query, FALLBACK_SEARCH_QUERY);
        assert_eq!(AnalysisResult::fallback("  city pop ").search_query, "city pop");
    }

    #[test]
    fn test_is_blank_prompt() {
        assert!(is_blank_prompt(""));
        assert!(is_blank_prompt("   "));
        assert!(is_blank_prompt("\r\n"));
        assert!(!is_blank_prompt(" jazz "));
    }
}
