//! Terminal value of the search pipeline.

use serde::{Deserialize, Serialize};

use super::{AnalysisResult, Track};

/// Message returned when the catalog returned nothing
pub const NO_RESULTS_MESSAGE: &str = "No tracks found. Try different keywords.";

/// Message returned when the prompt had nothing to search for
pub const BLANK_PROMPT_MESSAGE: &str = "Describe the music you want to find.";

/// Outcome of one search request.
///
/// `success == false` is a normal outcome: either nothing was found or the
/// catalog call failed and the error was turned into `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub success: bool,
    pub prompt: String,
    pub analysis: AnalysisResult,
    pub tracks: Vec<Track>,
    pub message: String,
}

impl SearchOutcome {
    /// Tracks were found
    pub fn found(prompt: impl Into<String>, analysis: AnalysisResult, tracks: Vec<Track>) -> Self {
        let message = format!("{} tracks found.", tracks.len());
        Self {
            success: true,
            prompt: prompt.into(),
            analysis,
            tracks,
            message,
        }
    }

    /// The search ran but matched nothing
    pub fn empty(prompt: impl Into<String>, analysis: AnalysisResult) -> Self {
        Self {
            success: false,
            prompt: prompt.into(),
            analysis,
            tracks: Vec::new(),
            message: NO_RESULTS_MESSAGE.to_string(),
        }
    }

    /// The prompt was blank, so nothing was searched
    pub fn blank_prompt(prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        Self {
            success: false,
            analysis: AnalysisResult::fallback(&prompt),
            prompt,
            tracks: Vec::new(),
            message: BLANK_PROMPT_MESSAGE.to_string(),
        }
    }

    /// The catalog call failed; `error` is already safe to show to a caller
    pub fn failed(
        prompt: impl Into<String>,
        analysis: AnalysisResult,
        error: impl std::fmt::Display,
    ) -> Self {
        Self {
            success: false,
            prompt: prompt.into(),
            analysis,
            tracks: Vec::new(),
            message: format!("An error occurred while searching: {}", error),
        }
    }
}
