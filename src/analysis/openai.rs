//! Chat-completion backed prompt analyzer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AnalysisError, Analyzer};
use crate::config::{Config, ConfigError};
use crate::models::{is_blank_prompt, AnalysisResult};
use crate::utils::{join_url, HttpClient};

/// Instruction sent ahead of every user prompt
pub const SYSTEM_PROMPT: &str = r#"You analyze natural-language music requests for a track search engine.
Extract the best search keywords and musical attributes from the user's request.

Always answer with a single JSON object of this shape:
{
  "searchQuery": "search keywords in English",
  "mood": "calm, energetic, happy, sad, ...",
  "genre": "jazz, pop, rock, classical, ...",
  "energy": number from 0 to 100,
  "tempo": "slow, medium or fast",
  "era": "90s, 2000s, 2010s, ...",
  "language": "japanese, english, ..."
}
Use null for attributes the request does not imply.

Example
Input: "jazz like they play in a cafe"
Output: {"searchQuery": "jazz cafe ambient smooth", "mood": "calm", "genre": "jazz", "energy": 30, "tempo": "slow", "era": null, "language": null}"#;

/// Prompt analyzer backed by an OpenAI-compatible chat completion endpoint.
pub struct PromptAnalyzer {
    http: HttpClient,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl std::fmt::Debug for PromptAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptAnalyzer")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl PromptAnalyzer {
    pub fn new(http: HttpClient, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.3,
        }
    }

    /// Build from configuration. Fails if the API key is missing.
    pub fn from_config(config: &Config, http: HttpClient) -> Result<Self, ConfigError> {
        let api_key = config.credentials.openai_api_key()?;
        Ok(Self::new(http, &config.analyzer.base_url, api_key)
            .model(&config.analyzer.model)
            .temperature(config.analyzer.temperature))
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    async fn try_analyze(&self, prompt: &str) -> Result<AnalysisResult, AnalysisError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .http
            .client()
            .post(join_url(&self.base_url, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown").to_string());
            return Err(AnalysisError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let data: ChatCompletionResponse = serde_json::from_str(&response.text().await?)?;
        let content = data
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(AnalysisError::EmptyResponse)?;

        parse_analysis(&content, prompt)
    }
}

#[async_trait]
impl Analyzer for PromptAnalyzer {
    async fn analyze(&self, prompt: &str) -> AnalysisResult {
        if is_blank_prompt(prompt) {
            tracing::debug!("Blank prompt, skipping analysis");
            return AnalysisResult::fallback(prompt);
        }

        match self.try_analyze(prompt).await {
            Ok(analysis) => {
                tracing::debug!(search_query = %analysis.search_query, "Prompt analyzed");
                analysis
            }
            Err(e) => {
                tracing::warn!(error = %e, "Prompt analysis failed, searching with the raw prompt");
                AnalysisResult::fallback(prompt)
            }
        }
    }
}

/// Parse the model's JSON answer.
///
/// Each attribute is read on its own: a field of the wrong type is dropped
/// rather than failing the whole parse. A missing or blank `searchQuery` is
/// replaced by the trimmed `prompt`, or a generic query when that is blank
/// too. Output that is not a JSON object is an error.
pub fn parse_analysis(content: &str, prompt: &str) -> Result<AnalysisResult, AnalysisError> {
    let value: Value = serde_json::from_str(strip_code_fence(content))?;
    let Value::Object(fields) = value else {
        return Err(AnalysisError::Malformed(
            "expected a JSON object".to_string(),
        ));
    };

    let text = |key: &str| {
        fields
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Ok(AnalysisResult {
        search_query: text("searchQuery")
            .unwrap_or_else(|| AnalysisResult::query_from_prompt(prompt)),
        mood: text("mood"),
        genre: text("genre"),
        energy: fields
            .get("energy")
            .and_then(Value::as_f64)
            .filter(|energy| (0.0..=100.0).contains(energy)),
        tempo: text("tempo"),
        era: text("era"),
        language: text("language"),
        degraded: false,
    })
}

/// Models occasionally wrap JSON in a markdown fence
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

// ===== Chat completion API Types =====

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}
