use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use music_dj::catalog::{clamp_limit, DEFAULT_LIMIT};
use music_dj::config::{find_config_file, load_config, Config, LogFormat};
use music_dj::mcp::{
    search_music, search_music_schema, RpcBridge, ServerCommand, ToolServer, SEARCH_MUSIC,
    SEARCH_MUSIC_DESCRIPTION,
};
use music_dj::models::{is_blank_prompt, SearchOutcome};
use music_dj::utils::{is_terminal, outcome_plain, terminal_width, tracks_table};
use music_dj::SearchPipeline;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Music DJ - find tracks from a natural-language description
#[derive(Parser, Debug)]
#[command(name = "music-dj")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Find music tracks from a natural-language description", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, short, value_enum, global = true, default_value_t = OutputFormat::Auto)]
    output: OutputFormat,

    /// Log format on stderr (overrides the config file)
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show all environment variables
    #[arg(long, global = true)]
    env: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Output format for results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Automatic based on terminal (table if TTY, JSON otherwise)
    Auto,
    /// Table format (human-readable)
    Table,
    /// JSON format (machine-readable)
    Json,
    /// Plain text format
    Plain,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the tool server on stdin/stdout
    Serve,

    /// Search in-process and print the outcome
    #[command(alias = "s")]
    Search {
        /// What you want to listen to
        prompt: String,

        /// Maximum number of tracks (clamped to 1-50)
        #[arg(long, short, default_value_t = DEFAULT_LIMIT as i64)]
        limit: i64,
    },

    /// Search through a spawned tool server, as a remote caller would
    Call {
        /// What you want to listen to
        prompt: String,

        /// Maximum number of tracks (clamped to 1-50)
        #[arg(long, short)]
        limit: Option<i64>,

        /// Deadline for the whole call in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Print the advertised tool schema
    Tools,
}

fn print_env_vars() {
    println!("Music DJ - Environment Variables");
    println!();
    println!("Credentials:");
    println!("  OPENAI_API_KEY               API key for the prompt analyzer");
    println!("  SPOTIFY_CLIENT_ID            Catalog client id");
    println!("  SPOTIFY_CLIENT_SECRET        Catalog client secret");
    println!();
    println!("Analyzer:");
    println!("  MUSIC_DJ__ANALYZER__BASE_URL      Chat completion API base (default: https://api.openai.com/v1)");
    println!("  MUSIC_DJ__ANALYZER__MODEL         Model name (default: gpt-3.5-turbo)");
    println!("  MUSIC_DJ__ANALYZER__TEMPERATURE   Sampling temperature (default: 0.3)");
    println!();
    println!("Catalog:");
    println!("  MUSIC_DJ__CATALOG__TOKEN_URL               Token endpoint");
    println!("  MUSIC_DJ__CATALOG__API_BASE                Search API base");
    println!("  MUSIC_DJ__CATALOG__MARKET                  Market code (default: JP)");
    println!("  MUSIC_DJ__CATALOG__TOKEN_SAFETY_MARGIN_MS  Refresh this long before expiry (min: 60000)");
    println!();
    println!("Bridge:");
    println!("  MUSIC_DJ__BRIDGE__TIMEOUT_MS  Deadline for one bridged call (default: 15000)");
    println!("  MUSIC_DJ__BRIDGE__PROGRAM     Tool server executable (default: this binary)");
    println!();
    println!("Other Settings:");
    println!("  MUSIC_DJ__LOGGING__LEVEL     Default log level (default: info)");
    println!("  MUSIC_DJ__LOGGING__FORMAT    Log format: text or json (default: text)");
    println!("  RUST_LOG                     Overrides all logging filters");
    println!();
    println!("Example:");
    println!("  OPENAI_API_KEY=sk-... music-dj search \"calm jazz for a cafe\" --limit 5");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.env {
        print_env_vars();
        if cli.command.is_none() {
            return Ok(());
        }
    }

    let config_path = cli.config.clone().or_else(find_config_file);
    let config = load_config(config_path.as_deref()).context("failed to load configuration")?;

    // stdout belongs to the protocol in `serve` mode, so logs go to stderr
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => config.logging.level.as_str(),
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let registry = tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("music_dj={}", log_level)),
    ));
    match cli.log_format.unwrap_or(config.logging.format) {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }

    if let Some(path) = &config_path {
        tracing::debug!("Using config file: {}", path.display());
    }

    match cli.command {
        Some(Commands::Serve) => {
            let pipeline = SearchPipeline::from_config(&config)?;
            ToolServer::with_pipeline(pipeline).run_stdio().await?;
        }

        Some(Commands::Search { prompt, limit }) => {
            require_prompt(&prompt)?;
            let pipeline = SearchPipeline::from_config(&config)?;
            let outcome = pipeline.run(&prompt, clamp_limit(limit)).await;
            output_outcome(&outcome, cli.output)?;
        }

        Some(Commands::Call {
            prompt,
            limit,
            timeout_ms,
        }) => {
            require_prompt(&prompt)?;
            let bridge = build_bridge(&config, config_path.as_deref(), timeout_ms)?;
            let outcome = search_music(&bridge, &prompt, limit.map(clamp_limit))
                .await
                .context("tool call failed")?;
            output_outcome(&outcome, cli.output)?;
        }

        Some(Commands::Tools) => {
            let tools = serde_json::json!({
                "tools": [{
                    "name": SEARCH_MUSIC,
                    "description": SEARCH_MUSIC_DESCRIPTION,
                    "inputSchema": search_music_schema(),
                }]
            });
            println!("{}", serde_json::to_string_pretty(&tools)?);
        }

        None => {
            println!("No command provided. Use --help for usage information.");
            println!("Common commands:");
            println!("  search <prompt>  - Search for tracks");
            println!("  call <prompt>    - Search through a spawned tool server");
            println!("  serve            - Run the tool server on stdio");
            println!("  tools            - Show the tool schema");
        }
    }

    Ok(())
}

/// Same rule the tool server applies to `prompt`
fn require_prompt(prompt: &str) -> Result<()> {
    if is_blank_prompt(prompt) {
        bail!("prompt must not be empty");
    }
    Ok(())
}

/// Bridge that spawns this binary's `serve` unless a program is configured.
/// The child re-reads the same config file.
fn build_bridge(
    config: &Config,
    config_path: Option<&Path>,
    timeout_ms: Option<u64>,
) -> Result<RpcBridge> {
    let bridge = match (&config.bridge.program, config_path) {
        (None, Some(path)) => RpcBridge::new(
            ServerCommand::current_exe()?
                .arg("--config")
                .arg(path)
                .args(&config.bridge.args),
            Duration::from_millis(config.bridge.timeout_ms),
        ),
        _ => RpcBridge::from_config(config)?,
    };

    Ok(match timeout_ms {
        Some(ms) => bridge.with_timeout(Duration::from_millis(ms.max(1))),
        None => bridge,
    })
}

fn output_outcome(outcome: &SearchOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(outcome)?);
        }
        OutputFormat::Plain => {
            print!("{}", outcome_plain(outcome));
        }
        OutputFormat::Table => {
            println!("{}", outcome.message);
            println!("Query: {}", outcome.analysis.search_query);
            if !outcome.tracks.is_empty() {
                println!("{}", tracks_table(&outcome.tracks, terminal_width()));
            }
        }
        OutputFormat::Auto if is_terminal() => {
            return output_outcome(outcome, OutputFormat::Table);
        }
        OutputFormat::Auto => {
            return output_outcome(outcome, OutputFormat::Json);
        }
    }
    Ok(())
}
