//! Core data models for music search operations.

mod analysis;
mod outcome;
mod track;

pub use analysis::{is_blank_prompt, AnalysisResult, FALLBACK_SEARCH_QUERY};
pub use outcome::{SearchOutcome, BLANK_PROMPT_MESSAGE, NO_RESULTS_MESSAGE};
pub use track::Track;
