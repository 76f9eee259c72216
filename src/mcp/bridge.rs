//! Process bridge: one tool-server child per call.
//!
//! [`RpcBridge::call`] spawns the server, writes a single request line, closes
//! stdin, and scans stdout for the response carrying the same id. A deadline
//! fixed at spawn bounds the whole exchange. The child is killed on every exit
//! path, whether the call matched, timed out, or failed.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::{timeout_at, Instant};

use super::line_buffer::LineBuffer;
use super::protocol::{JsonRpcRequest, JsonRpcResponse, RequestId};
use super::tools::SEARCH_MUSIC;
use crate::config::Config;
use crate::models::SearchOutcome;

/// Errors from a bridged call
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to start tool server {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("tool server did not answer within {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("tool server exited with status {code}: {stderr}")]
    Process { code: i32, stderr: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error talking to tool server: {0}")]
    Io(#[from] std::io::Error),

    #[error("tool server returned error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("invalid tool result: {0}")]
    InvalidResult(String),
}

/// How to start the tool server
#[derive(Clone)]
pub struct ServerCommand {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    env_removals: Vec<OsString>,
}

impl std::fmt::Debug for ServerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // values may hold credentials
        let env_keys: Vec<&OsString> = self.envs.iter().map(|(key, _)| key).collect();
        f.debug_struct("ServerCommand")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env_keys", &env_keys)
            .field("env_removals", &self.env_removals)
            .finish()
    }
}

impl ServerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            env_removals: Vec::new(),
        }
    }

    /// The running executable, e.g. `music-dj serve`
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// Command described by the bridge configuration
    pub fn from_config(config: &Config) -> std::io::Result<Self> {
        let command = match &config.bridge.program {
            Some(program) => Self::new(program),
            None => Self::current_exe()?,
        };
        Ok(command.args(&config.bridge.args))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Hide an inherited environment variable from the child
    pub fn env_remove(mut self, key: impl Into<OsString>) -> Self {
        self.env_removals.push(key.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for key in &self.env_removals {
            cmd.env_remove(key);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Calls the tool server through a fresh child process per request
#[derive(Debug, Clone)]
pub struct RpcBridge {
    command: ServerCommand,
    timeout: Duration,
}

impl RpcBridge {
    pub fn new(command: ServerCommand, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    pub fn from_config(config: &Config) -> Result<Self, BridgeError> {
        let command = ServerCommand::from_config(config).map_err(|source| BridgeError::Spawn {
            program: "<current executable>".to_string(),
            source,
        })?;
        Ok(Self::new(
            command,
            Duration::from_millis(config.bridge.timeout_ms),
        ))
    }

    /// Replace the per-call deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `request` to a new server process and wait for its response.
    ///
    /// A response carrying a JSON-RPC error is still `Ok`; see [`search_music`]
    /// for the mapping to [`BridgeError::Rpc`].
    pub async fn call(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, BridgeError> {
        let id = request
            .id
            .clone()
            .ok_or_else(|| BridgeError::Protocol("request has no id".to_string()))?;
        let mut line = serde_json::to_string(request)
            .map_err(|e| BridgeError::Protocol(e.to_string()))?;
        line.push('\n');

        let program = self.command.program().display().to_string();
        let mut child = self
            .command
            .to_command()
            .spawn()
            .map_err(|source| BridgeError::Spawn {
                program: program.clone(),
                source,
            })?;
        let deadline = Instant::now() + self.timeout;

        tracing::debug!(
            program = %program,
            pid = child.id(),
            id = %id,
            method = %request.method,
            "Spawned tool server"
        );

        let result = match timeout_at(deadline, exchange(&mut child, &line, &id)).await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::Timeout(self.timeout)),
        };

        terminate(&mut child).await;

        if let Err(e) = &result {
            tracing::warn!(id = %id, error = %e, "Bridged call failed");
        }
        result
    }
}

/// Write the request, then read until a matching response or child exit.
async fn exchange(
    child: &mut Child,
    line: &str,
    id: &RequestId,
) -> Result<JsonRpcResponse, BridgeError> {
    if let Some(mut stdin) = child.stdin.take() {
        // A child that dies early closes the pipe; its exit status tells more
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            tracing::debug!(error = %e, "Failed to write request");
        } else if let Err(e) = stdin.flush().await {
            tracing::debug!(error = %e, "Failed to flush request");
        }
    }

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| BridgeError::Protocol("child stdout not captured".to_string()))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| BridgeError::Protocol("child stderr not captured".to_string()))?;

    let mut lines = LineBuffer::new();
    let mut out_chunk = [0u8; 8192];
    let mut err_chunk = [0u8; 4096];
    let mut captured_stderr = Vec::new();
    let mut stdout_open = true;
    let mut stderr_open = true;
    let mut status: Option<ExitStatus> = None;

    loop {
        if !stdout_open && !stderr_open {
            if let Some(status) = status {
                return Err(exit_error(status, &captured_stderr, id));
            }
        }

        tokio::select! {
            read = stdout.read(&mut out_chunk), if stdout_open => {
                let n = read?;
                let complete: Vec<String> = if n == 0 {
                    stdout_open = false;
                    lines.finish().into_iter().collect()
                } else {
                    lines.push(&out_chunk[..n])
                };
                for line in complete {
                    if let Some(response) = match_response(&line, id) {
                        return Ok(response);
                    }
                }
            }
            read = stderr.read(&mut err_chunk), if stderr_open => {
                match read {
                    Ok(0) | Err(_) => stderr_open = false,
                    Ok(n) => captured_stderr.extend_from_slice(&err_chunk[..n]),
                }
            }
            exited = child.wait(), if status.is_none() => {
                status = Some(exited?);
            }
        }
    }
}

/// Parse a stdout line and keep it if it answers `id`
fn match_response(line: &str, id: &RequestId) -> Option<JsonRpcResponse> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<JsonRpcResponse>(line) {
        Ok(response) if !response.is_well_formed() => {
            tracing::debug!("Skipping malformed response line");
            None
        }
        Ok(response) if response.id.as_ref() == Some(id) => Some(response),
        Ok(response) => {
            tracing::debug!(
                id = ?response.id,
                "Skipping response for another request"
            );
            None
        }
        Err(e) => {
            tracing::debug!(error = %e, "Skipping non-protocol output line");
            None
        }
    }
}

fn exit_error(status: ExitStatus, stderr: &[u8], id: &RequestId) -> BridgeError {
    match status.code() {
        Some(code) if code != 0 => BridgeError::Process {
            code,
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        },
        _ => BridgeError::Protocol(format!(
            "tool server exited ({}) without answering request {}",
            status, id
        )),
    }
}

/// Kill the child if it is still running and reap it. Safe to repeat.
async fn terminate(child: &mut Child) {
    match child.try_wait() {
        Ok(Some(_)) => {}
        _ => {
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "Failed to kill tool server");
            }
        }
    }
}

/// Call `search_music` through the bridge and decode the outcome.
///
/// The request id is the current time in epoch milliseconds.
pub async fn search_music(
    bridge: &RpcBridge,
    prompt: &str,
    limit: Option<usize>,
) -> Result<SearchOutcome, BridgeError> {
    let id = RequestId::Number(chrono::Utc::now().timestamp_millis());
    let mut arguments = json!({ "prompt": prompt });
    if let Some(limit) = limit {
        arguments["limit"] = json!(limit);
    }

    let request = JsonRpcRequest::tools_call(id, SEARCH_MUSIC, arguments);
    let response = bridge.call(&request).await?;
    outcome_from_response(response)
}

/// Turn a `search_music` response into its outcome
pub fn outcome_from_response(response: JsonRpcResponse) -> Result<SearchOutcome, BridgeError> {
    if let Some(error) = response.error {
        return Err(BridgeError::Rpc {
            code: error.code,
            message: error.message,
        });
    }

    let text = response
        .result
        .as_ref()
        .and_then(|result| result.get("content"))
        .and_then(|content| content.get(0))
        .and_then(|item| item.get("text"))
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::InvalidResult("missing content[0].text".to_string()))?;

    serde_json::from_str(text).map_err(|e| BridgeError::InvalidResult(e.to_string()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::mcp::protocol::{ErrorCode, ErrorObject};

    fn sh(script: &str) -> ServerCommand {
        ServerCommand::new("sh").arg("-c").arg(script)
    }

    fn request(id: i64) -> JsonRpcRequest {
        JsonRpcRequest::tools_call(id, SEARCH_MUSIC, json!({"prompt": "jazz"}))
    }

    fn is_alive(pid: &str) -> bool {
        std::process::Command::new("kill")
            .args(["-0", pid])
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_matching_line_resolves_and_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!(
            r#"echo $$ > '{}'
read line
echo 'starting up'
echo '{{"jsonrpc":"2.0","id":99,"result":{{}}}}'
printf '{{"jsonrpc":"2.0",'
printf '"id":7,"result":{{"ok":true}}}}\n'
exec sleep 30"#,
            pid_file.display()
        );

        let bridge = RpcBridge::new(sh(&script), Duration::from_secs(10));
        let started = std::time::Instant::now();
        let response = bridge.call(&request(7)).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(response.id, Some(RequestId::Number(7)));
        assert_eq!(response.result.unwrap()["ok"], true);

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        assert!(!is_alive(pid.trim()));
    }

    #[tokio::test]
    async fn test_silent_child_times_out_and_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > '{}'; exec sleep 30", pid_file.display());

        let bridge = RpcBridge::new(sh(&script), Duration::from_millis(300));
        let started = std::time::Instant::now();
        let err = bridge.call(&request(1)).await.unwrap_err();

        let elapsed = started.elapsed();
        assert!(matches!(err, BridgeError::Timeout(_)), "{:?}", err);
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_secs(5));

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        assert!(!is_alive(pid.trim()));
    }

    #[tokio::test]
    async fn test_failing_child_reports_stderr() {
        let bridge = RpcBridge::new(sh("echo boom >&2; exit 1"), Duration::from_secs(10));
        match bridge.call(&request(1)).await {
            Err(BridgeError::Process { code, stderr }) => {
                assert_eq!(code, 1);
                assert!(stderr.contains("boom"));
            }
            other => panic!("expected process error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clean_exit_without_answer_is_protocol_error() {
        let bridge = RpcBridge::new(
            sh(r#"read line; echo '{"jsonrpc":"2.0","id":2,"result":{}}'"#),
            Duration::from_secs(10),
        );
        let err = bridge.call(&request(1)).await.unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_unterminated_last_line_still_matches() {
        let bridge = RpcBridge::new(
            sh(r#"read line; printf '{"jsonrpc":"2.0","id":3,"result":{}}'"#),
            Duration::from_secs(10),
        );
        let response = bridge.call(&request(3)).await.unwrap();
        assert_eq!(response.id, Some(RequestId::Number(3)));
    }

    #[tokio::test]
    async fn test_request_reaches_child_stdin() {
        // echo the request id back as a response
        let script = r#"read line
id=$(printf '%s' "$line" | sed 's/.*"id":\([0-9]*\).*/\1/')
printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"Unknown tool"}}\n' "$id""#;
        let bridge = RpcBridge::new(sh(script), Duration::from_secs(10));

        let err = search_music(&bridge, "jazz", Some(5)).await.unwrap_err();
        match err {
            BridgeError::Rpc { code, message } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Unknown tool");
            }
            other => panic!("expected rpc error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let bridge = RpcBridge::new(
            ServerCommand::new("/nonexistent/music-dj-server"),
            Duration::from_secs(1),
        );
        let err = bridge.call(&request(1)).await.unwrap_err();
        assert!(matches!(err, BridgeError::Spawn { .. }), "{:?}", err);
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.bridge.program = Some(PathBuf::from("/usr/local/bin/music-dj"));
        config.bridge.timeout_ms = 250;

        let bridge = RpcBridge::from_config(&config).unwrap();
        assert_eq!(bridge.timeout(), Duration::from_millis(250));
        let bridge = bridge.with_timeout(Duration::from_secs(2));
        assert_eq!(bridge.timeout(), Duration::from_secs(2));
        assert_eq!(bridge.command.program(), Path::new("/usr/local/bin/music-dj"));
        assert_eq!(bridge.command.args, vec![OsString::from("serve")]);
    }

    #[test]
    fn test_debug_hides_env_values() {
        let command = ServerCommand::new("music-dj").env("OPENAI_API_KEY", "sk-very-secret");
        let debug = format!("{:?}", command);
        assert!(debug.contains("OPENAI_API_KEY"));
        assert!(!debug.contains("sk-very-secret"));
    }

    #[test]
    fn test_outcome_from_response() {
        let outcome = SearchOutcome::empty("jazz", crate::models::AnalysisResult::new("jazz"));
        let text = serde_json::to_string_pretty(&outcome).unwrap();
        let response = JsonRpcResponse::success(
            Some(1.into()),
            json!({"content": [{"type": "text", "text": text}]}),
        );
        assert_eq!(outcome_from_response(response).unwrap(), outcome);

        let missing = JsonRpcResponse::success(Some(1.into()), json!({"content": []}));
        assert!(matches!(
            outcome_from_response(missing),
            Err(BridgeError::InvalidResult(_))
        ));

        let not_outcome = JsonRpcResponse::success(
            Some(1.into()),
            json!({"content": [{"type": "text", "text": "hello"}]}),
        );
        assert!(matches!(
            outcome_from_response(not_outcome),
            Err(BridgeError::InvalidResult(_))
        ));

        let rpc_error = JsonRpcResponse::error(
            Some(1.into()),
            ErrorObject::new(ErrorCode::InvalidParams, "prompt is required"),
        );
        assert!(matches!(
            outcome_from_response(rpc_error),
            Err(BridgeError::Rpc { code: -32602, .. })
        ));
    }
}
