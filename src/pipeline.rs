//! The search pipeline: analyze, build the query, search, shape the outcome.

use std::sync::Arc;

use crate::analysis::{build_enhanced_query, Analyzer, PromptAnalyzer};
use crate::catalog::{Catalog, SpotifyCatalog, DEFAULT_LIMIT};
use crate::config::{Config, ConfigError};
use crate::models::{is_blank_prompt, SearchOutcome};
use crate::utils::HttpClient;

/// Runs one search request end to end.
///
/// The pipeline owns its collaborators, so a long-running tool server keeps
/// one token cache for its whole lifetime.
#[derive(Debug, Clone)]
pub struct SearchPipeline {
    analyzer: Arc<dyn Analyzer>,
    catalog: Arc<dyn Catalog>,
}

impl SearchPipeline {
    pub fn new(analyzer: Arc<dyn Analyzer>, catalog: Arc<dyn Catalog>) -> Self {
        Self { analyzer, catalog }
    }

    /// Build the production pipeline. Fails when a credential is missing.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let http = HttpClient::new()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {}", e)))?;

        let analyzer = PromptAnalyzer::from_config(config, http.clone())?;
        let catalog = SpotifyCatalog::from_config(config, http)?;

        Ok(Self::new(Arc::new(analyzer), Arc::new(catalog)))
    }

    /// Run with the default limit.
    pub async fn search(&self, prompt: &str) -> SearchOutcome {
        self.run(prompt, DEFAULT_LIMIT).await
    }

    /// Run the pipeline. Never fails: catalog errors become a `success: false`
    /// outcome that still carries the analysis. A blank prompt is answered
    /// without calling the analyzer or the catalog.
    pub async fn run(&self, prompt: &str, limit: usize) -> SearchOutcome {
        if is_blank_prompt(prompt) {
            tracing::warn!("Rejecting blank prompt");
            return SearchOutcome::blank_prompt(prompt);
        }

        let analysis = self.analyzer.analyze(prompt).await;
        let query = build_enhanced_query(&analysis);

        tracing::info!(
            catalog = self.catalog.id(),
            query = %query,
            limit,
            degraded = analysis.degraded,
            "Searching catalog"
        );

        match self.catalog.search(&query, limit).await {
            Ok(tracks) if tracks.is_empty() => {
                tracing::info!(query = %query, "No tracks found");
                SearchOutcome::empty(prompt, analysis)
            }
            Ok(tracks) => {
                tracing::info!(count = tracks.len(), "Search complete");
                SearchOutcome::found(prompt, analysis, tracks)
            }
            Err(e) => {
                tracing::warn!(catalog = self.catalog.id(), error = %e, "Catalog search failed");
                SearchOutcome::failed(prompt, analysis, e)
            }
        }
    }
}
