use crate::models::Passage;

/// Score a passage is judged by: rerank score, else similarity, else 1.0 so
/// passages no stage scored are never dropped.
fn best_known_score(passage: &Passage) -> f32 {
    passage.relevance_score().unwrap_or(1.0)
}

/// Drop passages scoring below `threshold`.
///
/// A threshold of 0 (or below) disables the filter. If every passage would
/// be dropped the list is returned unfiltered.
pub fn apply_threshold(passages: Vec<Passage>, threshold: f32) -> Vec<Passage> {
    if threshold <= 0.0 || passages.is_empty() {
        return passages;
    }

    let kept: Vec<Passage> = passages
        .iter()
        .filter(|p| best_known_score(p) >= threshold)
        .cloned()
        .collect();

    if kept.is_empty() {
        tracing::debug!(
            "All {} passages fall below threshold {threshold}, returning unfiltered",
            passages.len()
        );
        return passages;
    }
    kept
}
