//! Line-delimited JSON-RPC tool server.
//!
//! Reads one request per line, dispatches it, and writes one response per
//! line. Requests are handled strictly one at a time. Stdout carries only
//! protocol traffic; logs go to stderr.

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::line_buffer::decode_line;
use super::protocol::{
    ErrorCode, ErrorObject, JsonRpcRequest, JsonRpcResponse, RequestId, JSONRPC_VERSION,
};
use super::tools::ToolRegistry;
use crate::pipeline::SearchPipeline;

/// MCP protocol revision reported by `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Serves the registered tools over a line protocol
#[derive(Debug, Clone)]
pub struct ToolServer {
    tools: ToolRegistry,
}

impl ToolServer {
    pub fn new(tools: ToolRegistry) -> Self {
        Self { tools }
    }

    /// Server exposing `search_music` backed by `pipeline`
    pub fn with_pipeline(pipeline: SearchPipeline) -> Self {
        Self::new(ToolRegistry::with_pipeline(pipeline))
    }

    /// Run on the process's stdin and stdout until stdin closes
    pub async fn run_stdio(&self) -> std::io::Result<()> {
        tracing::info!("Starting tool server on stdio");
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve requests from `reader` until end of input
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut segments = reader.split(b'\n');
        while let Some(segment) = segments.next_segment().await? {
            let line = decode_line(&segment);
            if line.trim().is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(&line).await {
                let mut out = serde_json::to_vec(&response)?;
                out.push(b'\n');
                writer.write_all(&out).await?;
                writer.flush().await?;
            }
        }

        tracing::info!("Input closed, tool server stopping");
        Ok(())
    }

    /// Handle one input line. Returns `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Unparsable request line");
                return Some(error_response(None, ErrorCode::ParseError, e.to_string()));
            }
        };

        match serde_json::from_value::<JsonRpcRequest>(value.clone()) {
            Ok(request) if request.jsonrpc == JSONRPC_VERSION => self.handle_request(request).await,
            Ok(request) => Some(error_response(
                request.id,
                ErrorCode::InvalidRequest,
                format!("unsupported jsonrpc version {:?}", request.jsonrpc),
            )),
            Err(e) => {
                let id = value
                    .get("id")
                    .and_then(|id| serde_json::from_value(id.clone()).ok());
                Some(error_response(id, ErrorCode::InvalidRequest, e.to_string()))
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id else {
            tracing::debug!(method = %request.method, "Ignoring notification");
            return None;
        };

        tracing::debug!(method = %request.method, id = %id, "Handling request");
        let id = Some(id);

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, self.initialize_result()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, self.tools_list_result()),
            "tools/call" => self.call_tool(id, request.params).await,
            other => error_response(
                id,
                ErrorCode::MethodNotFound,
                format!("Method not found: {}", other),
            ),
        };
        Some(response)
    }

    async fn call_tool(&self, id: Option<RequestId>, params: Option<Value>) -> JsonRpcResponse {
        let params = params.unwrap_or(Value::Null);
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return error_response(id, ErrorCode::InvalidParams, "tool name is required");
        };
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        tracing::info!(tool = name, "Tool call");
        match self.tools.execute(name, arguments).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "Tool call rejected");
                error_response(id, e.code(), e.to_string())
            }
        }
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            }
        })
    }

    fn tools_list_result(&self) -> Value {
        let tools: Vec<Value> = self.tools.all().iter().map(|tool| tool.info()).collect();
        json!({ "tools": tools })
    }
}

fn error_response(
    id: Option<RequestId>,
    code: ErrorCode,
    message: impl Into<String>,
) -> JsonRpcResponse {
    JsonRpcResponse::error(id, ErrorObject::new(code, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StaticAnalyzer;
    use crate::catalog::mock::make_track;
    use crate::catalog::MockCatalog;
    use crate::models::{AnalysisResult, SearchOutcome};
    use std::sync::Arc;

    fn server(catalog: MockCatalog) -> ToolServer {
        let analyzer = StaticAnalyzer::returning(AnalysisResult::new("jazz cafe").genre("jazz"));
        ToolServer::with_pipeline(SearchPipeline::new(Arc::new(analyzer), Arc::new(catalog)))
    }

    async fn run(server: &ToolServer, input: &str) -> Vec<JsonRpcResponse> {
        let mut output = Vec::new();
        server.serve(input.as_bytes(), &mut output).await.unwrap();

        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_tools_call_round_trip() {
        let server = server(MockCatalog::with_tracks(vec![make_track("a", 1)]));
        let input = r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"search_music","arguments":{"prompt":"calm jazz for a cafe","limit":5}}}
"#;

        let responses = run(&server, input).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id, Some(RequestId::Number(7)));
        assert!(responses[0].is_well_formed());

        let text = responses[0].result.as_ref().unwrap()["content"][0]["text"]
            .as_str()
            .unwrap();
        let outcome: SearchOutcome = serde_json::from_str(text).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.prompt, "calm jazz for a cafe");
    }

    #[tokio::test]
    async fn test_keeps_serving_after_errors() {
        let server = server(MockCatalog::new());
        let input = concat!(
            "not json\n",
            "\n",
            r#"{"jsonrpc":"2.0","id":"a","method":"tools/call","params":{"name":"play","arguments":{}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"resources/list"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"search_music","arguments":{"limit":3}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"search_music","arguments":{"prompt":"x"}}}"#,
            "\n",
        );

        let responses = run(&server, input).await;
        let codes: Vec<Option<i32>> = responses
            .iter()
            .map(|r| r.error.as_ref().map(|e| e.code))
            .collect();
        assert_eq!(
            codes,
            vec![Some(-32700), Some(-32601), Some(-32601), Some(-32602), None]
        );
        assert_eq!(responses[0].id, None);
        assert_eq!(responses[1].id, Some(RequestId::from("a")));
        assert_eq!(responses[4].id, Some(RequestId::Number(4)));
    }

    #[tokio::test]
    async fn test_initialize_and_list() {
        let server = server(MockCatalog::new());
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        );

        let responses = run(&server, input).await;
        let init = responses[0].result.as_ref().unwrap();
        assert_eq!(init["serverInfo"]["name"], "music-dj");
        assert!(init["capabilities"]["tools"].is_object());

        let tools = responses[1].result.as_ref().unwrap()["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "search_music");
    }

    #[tokio::test]
    async fn test_invalid_request_shape() {
        let server = server(MockCatalog::new());
        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","id":5,"method":12}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32600);
        assert_eq!(response.id, Some(RequestId::Number(5)));
    }

    #[tokio::test]
    async fn test_crlf_input() {
        let server = server(MockCatalog::new());
        let responses = run(
            &server,
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\r\n",
        )
        .await;
        assert_eq!(responses.len(), 1);
        assert!(responses[0].error.is_none());
    }
}
