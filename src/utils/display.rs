//! Terminal display utilities for CLI output.
//!
//! Width-aware truncation and the track table used by the `search` and
//! `call` commands.

use comfy_table::{presets::UTF8_FULL, Attribute, Cell, ContentArrangement, Table};
use std::io::{self, IsTerminal};
use terminal_size::terminal_size;
use unicode_width::UnicodeWidthChar;

use crate::models::{SearchOutcome, Track};

/// Default width when terminal size cannot be determined.
pub const DEFAULT_WIDTH: usize = 100;

/// Current terminal width in characters.
pub fn terminal_width() -> usize {
    terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(DEFAULT_WIDTH)
}

/// Check if stdout is a terminal.
#[inline]
pub fn is_terminal() -> bool {
    io::stdout().is_terminal()
}

/// Display width of `text`, counting wide characters as two columns.
pub fn display_width(text: &str) -> usize {
    text.chars().map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate text to fit within `max_width` columns, appending an ellipsis if
/// anything was cut.
///
/// ```
/// use music_dj::utils::truncate_with_ellipsis;
///
/// assert_eq!(truncate_with_ellipsis("Hello World", 8), "Hello...");
/// assert_eq!(truncate_with_ellipsis("Hi", 8), "Hi");
/// ```
pub fn truncate_with_ellipsis(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if display_width(text) <= max_width {
        return text.to_string();
    }

    let budget = max_width.saturating_sub(3);
    let mut used = 0;
    let mut truncated = String::new();
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        truncated.push(c);
    }
    format!("{}...", truncated)
}

/// Build a table of tracks sized for a terminal `width` columns wide
pub fn tracks_table(tracks: &[Track], width: usize) -> Table {
    // name and artists share whatever the fixed columns leave
    let flexible = width.saturating_sub(40).max(30);
    let name_width = flexible * 3 / 5;
    let artists_width = flexible - name_width;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(width.min(u16::MAX as usize) as u16)
        .set_header(vec!["#", "Track", "Artists", "Time", "Pop."]);

    for (i, track) in tracks.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(truncate_with_ellipsis(&track.name, name_width))
                .add_attribute(Attribute::Bold),
            Cell::new(truncate_with_ellipsis(&track.artists_display(), artists_width)),
            Cell::new(track.duration_display()),
            Cell::new(track.popularity),
        ]);
    }
    table
}

/// One line per track, for pipes and logs
pub fn outcome_plain(outcome: &SearchOutcome) -> String {
    let mut out = format!(
        "{}\nquery: {}\n",
        outcome.message, outcome.analysis.search_query
    );
    for (i, track) in outcome.tracks.iter().enumerate() {
        out.push_str(&format!(
            "{:>2}. {} - {} [{}] {}\n",
            i + 1,
            track.name,
            track.artists_display(),
            track.duration_display(),
            track.external_url
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::mock::make_track;
    use crate::models::AnalysisResult;

    #[test]
    fn test_truncate_wide_characters() {
        // each kana is two columns wide
        assert_eq!(truncate_with_ellipsis("カフェジャズ", 12), "カフェジャズ");
        assert_eq!(truncate_with_ellipsis("カフェジャズ", 9), "カフェ...");
        assert_eq!(truncate_with_ellipsis("abc", 0), "");
    }

    #[test]
    fn test_tracks_table_has_row_per_track() {
        let tracks = vec![make_track("a", 80), make_track("b", 40)];
        let rendered = tracks_table(&tracks, 100).to_string();
        assert!(rendered.contains("Track a"));
        assert!(rendered.contains("Track b"));
        assert!(rendered.contains("3:00"));
    }

    #[test]
    fn test_outcome_plain() {
        let outcome = SearchOutcome::found(
            "jazz",
            AnalysisResult::new("jazz cafe"),
            vec![make_track("a", 80)],
        );
        let text = outcome_plain(&outcome);
        assert!(text.starts_with("1 tracks found.\nquery: jazz cafe\n"));
        assert!(text.contains(" 1. Track a - Test Artist [3:00]"));
    }
}
