//! Enhanced query construction.

use crate::models::AnalysisResult;

/// Build the catalog query from an analysis.
///
/// Appends, in this order: genre (skipped when the base query already contains
/// it, ignoring case), mood, era, tempo. The order is tuned for search
/// relevance and must not change.
pub fn build_enhanced_query(analysis: &AnalysisResult) -> String {
    let mut parts: Vec<&str> = vec![analysis.search_query.as_str()];

    if let Some(genre) = present(&analysis.genre) {
        let query = analysis.search_query.to_lowercase();
        if !query.contains(&genre.to_lowercase()) {
            parts.push(genre);
        }
    }

    parts.extend(
        [&analysis.mood, &analysis.era, &analysis.tempo]
            .into_iter()
            .filter_map(present),
    );

    parts.join(" ")
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genre_already_in_query_is_skipped() {
        let analysis = AnalysisResult::new("jazz cafe").genre("jazz").mood("calm");
        assert_eq!(build_enhanced_query(&analysis), "jazz cafe calm");
    }

    #[test]
    fn test_full_order() {
        let analysis = AnalysisResult::new("x")
            .genre("pop")
            .mood("happy")
            .era("90s")
            .tempo("fast");
        assert_eq!(build_enhanced_query(&analysis), "x pop happy 90s fast");
    }

    #[test]
    fn test_genre_match_ignores_case() {
        let analysis = AnalysisResult::new("Smooth JAZZ night").genre("Jazz");
        assert_eq!(build_enhanced_query(&analysis), "Smooth JAZZ night");
    }

    #[test]
    fn test_query_only() {
        let analysis = AnalysisResult::new("lofi beats").energy(20.0).language("english");
        assert_eq!(build_enhanced_query(&analysis), "lofi beats");
    }

    #[test]
    fn test_empty_attributes_are_skipped() {
        let analysis = AnalysisResult::new("rock").mood("").tempo("slow");
        assert_eq!(build_enhanced_query(&analysis), "rock slow");
    }
}
