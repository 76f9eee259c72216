//! Utility modules shared by the library and the CLI.
//!
//! - [`HttpClient`]: shared reqwest client with timeouts and a user agent
//! - [`join_url`]: join a configured base URL and an endpoint path
//! - [`tracks_table`], [`outcome_plain`]: terminal rendering of search outcomes

mod display;
mod http;

pub use display::{
    display_width, is_terminal, outcome_plain, terminal_width, tracks_table,
    truncate_with_ellipsis, DEFAULT_WIDTH,
};
pub use http::{join_url, HttpClient};
