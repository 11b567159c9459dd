//! Reciprocal Rank Fusion.
//!
//! `score(d) = Σ_lists weight / (k + rank(d))` with 1-based ranks. RRF only
//! looks at positions, so lists with incomparable scores (cosine similarity,
//! BM25, hybrid blends) can be merged without normalization.

use std::collections::HashMap;

use crate::models::{Passage, PassageKey};

/// Standard RRF constant (Cormack, Clarke & Buettcher, SIGIR 2009).
pub const DEFAULT_RRF_K: u32 = 60;

/// Fuse ranked lists into one ranking.
///
/// Passages are deduplicated by [`Passage::key`]; the copy kept is the first
/// one encountered. A missing weight counts as 1.0. Equal fused scores keep
/// first-encounter order (scanning lists left to right), so identical inputs
/// always produce identical output. Every returned passage carries its fused
/// score in `metadata.fusion_score`.
pub fn reciprocal_rank_fusion(
    ranked_lists: &[Vec<Passage>],
    weights: Option<&[f32]>,
    k: u32,
) -> Vec<Passage> {
    let k = k as f32;

    // Insertion-ordered accumulator: `index` maps identity to a slot.
    let mut index: HashMap<PassageKey, usize> = HashMap::new();
    let mut fused: Vec<(Passage, f32)> = Vec::new();

    for (list_idx, list) in ranked_lists.iter().enumerate() {
        let weight = weights
            .and_then(|w| w.get(list_idx).copied())
            .unwrap_or(1.0);

        for (rank, passage) in list.iter().enumerate() {
            let contribution = weight / (k + (rank + 1) as f32);
            let key = passage.key();
            match index.get(&key) {
                Some(&slot) => fused[slot].1 += contribution,
                None => {
                    index.insert(key, fused.len());
                    fused.push((passage.clone(), contribution));
                }
            }
        }
    }

    // Stable sort: ties keep first-encounter order.
    fused.sort_by(|a, b| b.1.total_cmp(&a.1));

    tracing::debug!(
        "Fused {} lists into {} unique passages",
        ranked_lists.len(),
        fused.len()
    );

    fused
        .into_iter()
        .map(|(passage, score)| passage.with_fusion_score(score))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ids, passage};

    fn fuse(lists: &[Vec<Passage>]) -> Vec<Passage> {
        reciprocal_rank_fusion(lists, None, DEFAULT_RRF_K)
    }

    #[test]
    fn test_same_item_in_two_lists() {
        let a = passage("A", "alpha");
        let fused = fuse(&[vec![a.clone()], vec![a]]);
        assert_eq!(fused.len(), 1);
        let score = fused[0].metadata.fusion_score.unwrap();
        assert!((score - 2.0 / 61.0).abs() < 1e-6);
        assert!((score - 0.03279).abs() < 1e-4);
    }

    #[test]
    fn test_ties_keep_first_encounter_order() {
        let a = passage("A", "alpha");
        let b = passage("B", "beta");
        let fused = fuse(&[vec![a.clone(), b.clone()], vec![b, a]]);
        assert_eq!(ids(&fused), vec!["A", "B"]);
        assert_eq!(
            fused[0].metadata.fusion_score,
            fused[1].metadata.fusion_score
        );
        let expected = 1.0 / 61.0 + 1.0 / 62.0;
        assert!((fused[0].metadata.fusion_score.unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_dedup_yields_unique_passages() {
        let d1 = passage("doc1", "one");
        let d2 = passage("doc2", "two");
        let fused = fuse(&[vec![d1.clone(), d2.clone()], vec![d2, d1]]);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_content_hash_identity_without_ids() {
        let a = Passage::new("shared text").with_filename("a.pdf");
        let b = Passage::new("shared text").with_filename("b.pdf");
        let fused = fuse(&[vec![a], vec![b]]);
        assert_eq!(fused.len(), 1);
        // First occurrence is retained
        assert_eq!(fused[0].metadata.filename.as_deref(), Some("a.pdf"));
    }

    #[test]
    fn test_first_occurrence_is_kept() {
        let first = passage("X", "x").with_similarity_score(0.9);
        let later = passage("X", "x").with_keyword_score(3.0);
        let fused = fuse(&[vec![first], vec![later]]);
        assert_eq!(fused[0].metadata.similarity_score, Some(0.9));
        assert_eq!(fused[0].metadata.keyword_score, None);
    }

    #[test]
    fn test_weights_shift_ranking() {
        let a = passage("A", "alpha");
        let b = passage("B", "beta");
        let fused = reciprocal_rank_fusion(
            &[vec![a], vec![b]],
            Some(&[1.0, 2.0]),
            DEFAULT_RRF_K,
        );
        assert_eq!(ids(&fused), vec!["B", "A"]);
        assert!((fused[0].metadata.fusion_score.unwrap() - 2.0 / 61.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_weight_defaults_to_one() {
        let a = passage("A", "alpha");
        let b = passage("B", "beta");
        let fused = reciprocal_rank_fusion(&[vec![a], vec![b]], Some(&[0.5]), DEFAULT_RRF_K);
        assert_eq!(ids(&fused), vec!["B", "A"]);
    }

    #[test]
    fn test_items_in_more_lists_rank_higher() {
        let a = passage("A", "alpha");
        let b = passage("B", "beta");
        let c = passage("C", "gamma");
        let fused = fuse(&[vec![a.clone(), b.clone()], vec![c, b]]);
        assert_eq!(ids(&fused)[0], "B");
        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(fuse(&[]).is_empty());
        assert!(fuse(&[vec![], vec![]]).is_empty());
    }

    #[test]
    fn test_deterministic_for_identical_input() {
        let lists = vec![
            vec![passage("A", "a"), passage("B", "b"), passage("C", "c")],
            vec![passage("C", "c"), passage("D", "d")],
            vec![passage("B", "b"), passage("D", "d"), passage("A", "a")],
        ];
        assert_eq!(fuse(&lists), fuse(&lists));
    }
}
