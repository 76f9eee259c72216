//! Configuration management.
//!
//! Values are layered in this order, later sources winning:
//!
//! 1. Built-in defaults (credentials come from `OPENAI_API_KEY`,
//!    `SPOTIFY_CLIENT_ID` and `SPOTIFY_CLIENT_SECRET`)
//! 2. An optional TOML file
//! 3. `MUSIC_DJ__<SECTION>__<KEY>` environment variables
//!
//! ```toml
//! [analyzer]
//! base_url = "https://api.openai.com/v1"
//! model = "gpt-3.5-turbo"
//! temperature = 0.3
//!
//! [catalog]
//! market = "JP"
//! token_safety_margin_ms = 60000
//!
//! [bridge]
//! timeout_ms = 15000
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Smallest allowed token safety margin
pub const MIN_TOKEN_SAFETY_MARGIN_MS: i64 = 60_000;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub credentials: Credentials,

    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.catalog.token_safety_margin_ms < MIN_TOKEN_SAFETY_MARGIN_MS {
            return Err(ConfigError::Invalid(format!(
                "catalog.token_safety_margin_ms must be at least {}",
                MIN_TOKEN_SAFETY_MARGIN_MS
            )));
        }
        if self.bridge.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "bridge.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.analyzer.temperature) {
            return Err(ConfigError::Invalid(
                "analyzer.temperature must be between 0 and 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// API credentials for the upstream services
#[derive(Clone, Deserialize)]
pub struct Credentials {
    #[serde(default = "env_openai_api_key")]
    pub openai_api_key: Option<String>,

    #[serde(default = "env_spotify_client_id")]
    pub spotify_client_id: Option<String>,

    #[serde(default = "env_spotify_client_secret")]
    pub spotify_client_secret: Option<String>,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            openai_api_key: env_openai_api_key(),
            spotify_client_id: env_spotify_client_id(),
            spotify_client_secret: env_spotify_client_secret(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("spotify_client_id", &self.spotify_client_id)
            .field(
                "spotify_client_secret",
                &self.spotify_client_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Credentials {
    /// Language model API key, required by the analyzer
    pub fn openai_api_key(&self) -> Result<&str, ConfigError> {
        require(&self.openai_api_key, "OPENAI_API_KEY")
    }

    /// Catalog client id and secret, required by the catalog client
    pub fn spotify_client(&self) -> Result<(&str, &str), ConfigError> {
        Ok((
            require(&self.spotify_client_id, "SPOTIFY_CLIENT_ID")?,
            require(&self.spotify_client_secret, "SPOTIFY_CLIENT_SECRET")?,
        ))
    }
}

fn require<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingCredential(name)),
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_openai_api_key() -> Option<String> {
    non_empty_env("OPENAI_API_KEY")
}

fn env_spotify_client_id() -> Option<String> {
    non_empty_env("SPOTIFY_CLIENT_ID")
}

fn env_spotify_client_secret() -> Option<String> {
    non_empty_env("SPOTIFY_CLIENT_SECRET")
}

/// Prompt analyzer (chat completion) settings
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_analyzer_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            base_url: default_analyzer_base_url(),
            model: default_model(),
            temperature: default_temperature(),
        }
    }
}

fn default_analyzer_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

/// Catalog search settings
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Market filter sent with every search
    #[serde(default = "default_market")]
    pub market: String,

    /// Subtracted from the upstream token lifetime when caching
    #[serde(default = "default_token_safety_margin")]
    pub token_safety_margin_ms: i64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            api_base: default_api_base(),
            market: default_market(),
            token_safety_margin_ms: default_token_safety_margin(),
        }
    }
}

fn default_token_url() -> String {
    "https://accounts.spotify.com/api/token".to_string()
}

fn default_api_base() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_market() -> String {
    "JP".to_string()
}

fn default_token_safety_margin() -> i64 {
    MIN_TOKEN_SAFETY_MARGIN_MS
}

/// Settings for the process bridge
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Hard deadline for one call, counted from spawn
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Tool server executable; the running binary when unset
    #[serde(default)]
    pub program: Option<PathBuf>,

    #[serde(default = "default_server_args")]
    pub args: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            program: None,
            args: default_server_args(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_server_args() -> Vec<String> {
    vec!["serve".to_string()]
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log line format on stderr
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Load configuration from an optional file plus the environment
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix("MUSIC_DJ")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: Config = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

/// Look for a config file in the working directory, then the user config dir
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("music-dj.toml");
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("music-dj").join("config.toml"))
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file() -> NamedTempFile {
        tempfile::Builder::new().suffix(".toml").tempfile().unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.catalog.market, "JP");
        assert_eq!(config.bridge.timeout_ms, 15_000);
        assert_eq!(config.bridge.args, vec!["serve".to_string()]);
        assert_eq!(config.analyzer.model, "gpt-3.5-turbo");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = toml_file();
        writeln!(
            file,
            r#"
[catalog]
market = "US"
token_safety_margin_ms = 120000

[bridge]
timeout_ms = 5000
"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.catalog.market, "US");
        assert_eq!(config.catalog.token_safety_margin_ms, 120_000);
        assert_eq!(config.bridge.timeout_ms, 5000);
        // untouched sections keep defaults
        assert_eq!(config.analyzer.temperature, 0.3);
        assert_eq!(config.catalog.api_base, "https://api.spotify.com/v1");
    }

    #[test]
    fn test_log_format_from_file() {
        assert_eq!(Config::default().logging.format, LogFormat::Text);

        let mut file = toml_file();
        writeln!(file, "[logging]\nformat = \"json\"").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_rejects_small_safety_margin() {
        let mut file = toml_file();
        writeln!(file, "[catalog]\ntoken_safety_margin_ms = 1000").unwrap();

        let err = load_config(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_credentials() {
        let credentials = Credentials {
            openai_api_key: None,
            spotify_client_id: Some("id".to_string()),
            spotify_client_secret: Some("  ".to_string()),
        };

        assert!(matches!(
            credentials.openai_api_key(),
            Err(ConfigError::MissingCredential("OPENAI_API_KEY"))
        ));
        assert!(matches!(
            credentials.spotify_client(),
            Err(ConfigError::MissingCredential("SPOTIFY_CLIENT_SECRET"))
        ));
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let credentials = Credentials {
            openai_api_key: Some("sk-very-secret".to_string()),
            spotify_client_id: Some("client".to_string()),
            spotify_client_secret: Some("shh".to_string()),
        };

        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("sk-very-secret"));
        assert!(!debug.contains("shh"));
        assert!(debug.contains("client"));
    }
}
