//! # music-dj
//!
//! Natural-language music search exposed as a tool over a line-delimited
//! JSON-RPC protocol.
//!
//! ## Architecture
//!
//! - [`analysis`]: turns a free-text request into search attributes via a chat model
//! - [`catalog`]: track search against the catalog API, with a cached bearer token
//! - [`pipeline`]: analysis, query building and search glued into one outcome
//! - [`mcp`]: the stdio tool server and the process bridge that calls it
//! - [`models`]: tracks, analyses and outcomes
//! - [`config`]: layered configuration
//! - [`utils`]: HTTP client and terminal output helpers

pub mod analysis;
pub mod catalog;
pub mod config;
pub mod mcp;
pub mod models;
pub mod pipeline;
pub mod utils;

// Re-export commonly used types
pub use models::{AnalysisResult, SearchOutcome, Track};
pub use pipeline::SearchPipeline;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
