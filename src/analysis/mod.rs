//! Prompt analysis: free text in, structured search attributes out.
//!
//! [`Analyzer::analyze`] is total. Implementations swallow every failure and
//! hand back [`AnalysisResult::fallback`], so the pipeline can always build a
//! query from the result.

pub mod mock;
mod openai;
mod query;

pub use mock::StaticAnalyzer;
pub use openai::{parse_analysis, PromptAnalyzer, SYSTEM_PROMPT};
pub use query::build_enhanced_query;

use async_trait::async_trait;

use crate::models::AnalysisResult;

/// Turns a music request into an [`AnalysisResult`].
#[async_trait]
pub trait Analyzer: Send + Sync + std::fmt::Debug {
    /// Analyze `prompt`. Never fails; the result always has a usable query.
    async fn analyze(&self, prompt: &str) -> AnalysisResult;
}

/// Reasons an analysis attempt falls back to the raw prompt
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("model returned no content")]
    EmptyResponse,

    #[error("malformed model output: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        AnalysisError::Network(err.without_url().to_string())
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(err: serde_json::Error) -> Self {
        AnalysisError::Malformed(err.to_string())
    }
}
