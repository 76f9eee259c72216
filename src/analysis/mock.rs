//! Mock analyzer for testing purposes.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::analysis::Analyzer;
use crate::models::AnalysisResult;

/// An analyzer that returns a fixed result, or the raw-prompt fallback when
/// none is set.
#[derive(Debug, Default)]
pub struct StaticAnalyzer {
    result: Option<AnalysisResult>,
    prompts: Mutex<Vec<String>>,
}

impl StaticAnalyzer {
    /// Always fall back to the raw prompt, as if the model were unreachable.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Answer every prompt with `result`.
    pub fn returning(result: AnalysisResult) -> Self {
        Self {
            result: Some(result),
            ..Self::default()
        }
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Analyzer for StaticAnalyzer {
    async fn analyze(&self, prompt: &str) -> AnalysisResult {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(prompt.to_string());

        self.result
            .clone()
            .unwrap_or_else(|| AnalysisResult::fallback(prompt))
    }
}
