//! Tool registry for the tool server.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use super::protocol::ErrorCode;
use crate::catalog::{clamp_limit, DEFAULT_LIMIT, MAX_LIMIT, MIN_LIMIT};
use crate::models::is_blank_prompt;
use crate::pipeline::SearchPipeline;

/// Name of the music search tool
pub const SEARCH_MUSIC: &str = "search_music";

/// Description advertised for the music search tool
pub const SEARCH_MUSIC_DESCRIPTION: &str =
    "Search for music tracks from a natural-language description of mood, genre, era or scene";

/// A tool that can be called by the client
#[derive(Clone)]
pub struct Tool {
    /// Tool name (e.g., "search_music")
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters
    pub input_schema: Value,

    /// Handler that executes the tool
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

impl Tool {
    /// Entry for a `tools/list` answer
    pub fn info(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }
}

/// Handler for executing a tool
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + std::fmt::Debug {
    /// Execute the tool with the given arguments
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// Errors a tool call can produce
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// JSON-RPC error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            ToolError::NotFound(_) => ErrorCode::MethodNotFound,
            ToolError::InvalidParams(_) => ErrorCode::InvalidParams,
            ToolError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

/// Registry of the tools a server advertises
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the music search tool bound to `pipeline`
    pub fn with_pipeline(pipeline: SearchPipeline) -> Self {
        let mut registry = Self::new();
        registry.register(search_music_tool(pipeline));
        registry
    }

    /// Register a tool
    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    /// All tools, ordered by name
    pub fn all(&self) -> Vec<&Tool> {
        let mut tools: Vec<&Tool> = self.tools.values().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        tool.handler.execute(args).await
    }
}

/// Input schema of the music search tool
pub fn search_music_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "prompt": {
                "type": "string",
                "description": "What you want to listen to, in natural language (e.g. 'calm jazz for a cafe')"
            },
            "limit": {
                "type": "integer",
                "description": "Maximum number of tracks to return",
                "minimum": MIN_LIMIT,
                "maximum": MAX_LIMIT,
                "default": DEFAULT_LIMIT
            }
        },
        "required": ["prompt"]
    })
}

fn search_music_tool(pipeline: SearchPipeline) -> Tool {
    Tool {
        name: SEARCH_MUSIC.to_string(),
        description: SEARCH_MUSIC_DESCRIPTION.to_string(),
        input_schema: search_music_schema(),
        handler: Arc::new(SearchMusicHandler { pipeline }),
    }
}

/// Runs the search pipeline for `search_music` calls
#[derive(Debug)]
pub struct SearchMusicHandler {
    pipeline: SearchPipeline,
}

/// Validated `search_music` arguments
#[derive(Debug, Clone, PartialEq)]
pub struct SearchMusicArgs {
    pub prompt: String,
    pub limit: usize,
}

impl SearchMusicArgs {
    /// Validate raw arguments. Out-of-range limits are clamped.
    pub fn from_value(args: &Value) -> Result<Self, ToolError> {
        let args = args
            .as_object()
            .ok_or_else(|| ToolError::InvalidParams("arguments must be an object".to_string()))?;

        let prompt = args
            .get("prompt")
            .and_then(Value::as_str)
            .filter(|p| !is_blank_prompt(p))
            .ok_or_else(|| ToolError::InvalidParams("prompt is required".to_string()))?;

        let limit = match args.get("limit") {
            None | Some(Value::Null) => DEFAULT_LIMIT,
            Some(value) => {
                let raw = value
                    .as_i64()
                    .or_else(|| value.as_u64().map(|_| i64::MAX))
                    .ok_or_else(|| {
                        ToolError::InvalidParams("limit must be an integer".to_string())
                    })?;
                clamp_limit(raw)
            }
        };

        Ok(Self {
            prompt: prompt.to_string(),
            limit,
        })
    }
}

#[async_trait::async_trait]
impl ToolHandler for SearchMusicHandler {
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args = SearchMusicArgs::from_value(&args)?;
        let outcome = self.pipeline.run(&args.prompt, args.limit).await;

        let text = serde_json::to_string_pretty(&outcome)
            .map_err(|e| ToolError::Internal(e.to_string()))?;

        Ok(json!({
            "content": [{ "type": "text", "text": text }]
        }))
    }
}
