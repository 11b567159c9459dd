use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RetrievalError, Stage, StageFailure, StageResult};
use crate::models::{MetadataFilter, Passage, PassageKey};
use crate::traits::{with_timeout, DocumentStore};

/// Weighted vector + keyword retrieval.
///
/// Both searches fetch `2k` candidates. Scores are min-max normalized per
/// list before weighting, since cosine similarity and BM25 live on
/// different scales.
pub struct HybridCombiner {
    store: Arc<dyn DocumentStore>,
    vector_weight: f32,
    keyword_weight: f32,
    call_timeout: Duration,
}

impl HybridCombiner {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        vector_weight: f32,
        keyword_weight: f32,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            vector_weight,
            keyword_weight,
            call_timeout,
        }
    }

    /// Run both searches and return the top `k` combined passages.
    ///
    /// Fails only when vector search fails. Keyword trouble degrades to the
    /// substring fallback or to an empty keyword list.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> StageResult<Vec<Passage>> {
        let pool = k.saturating_mul(2).max(1);

        let (vector, keyword) = tokio::join!(
            with_timeout(
                "vector search",
                self.call_timeout,
                self.store.similarity_search_with_score(query, pool, filter),
            ),
            self.keyword_hits(query, pool),
        );

        let vector_hits = vector.map_err(|e| StageFailure::new(Stage::Hybrid, e))?;
        let keyword_hits: Vec<(Passage, f32)> = keyword
            .into_iter()
            .filter(|(p, _)| filter.map_or(true, |f| f.matches(&p.metadata)))
            .collect();

        tracing::debug!(
            vector = vector_hits.len(),
            keyword = keyword_hits.len(),
            "Hybrid candidates"
        );

        Ok(combine_scored_lists(
            vector_hits,
            keyword_hits,
            k,
            self.vector_weight,
            self.keyword_weight,
        ))
    }

    /// Keyword hits, falling back to substring matching when full-text search
    /// is unsupported. Never fails: errors are logged and yield no hits.
    async fn keyword_hits(&self, query: &str, pool: usize) -> Vec<(Passage, f32)> {
        let result = with_timeout(
            "keyword search",
            self.call_timeout,
            self.store.keyword_search(query, pool),
        )
        .await;

        match result {
            Ok(hits) => hits,
            Err(e) if e.is_unsupported() => self.substring_hits(query, pool).await,
            Err(e) => {
                tracing::warn!("Keyword search failed, using vector results only: {e}");
                Vec::new()
            }
        }
    }

    async fn substring_hits(&self, query: &str, pool: usize) -> Vec<(Passage, f32)> {
        let result: Result<Vec<Passage>, RetrievalError> = with_timeout(
            "substring search",
            self.call_timeout,
            self.store.substring_search(query, pool),
        )
        .await;

        match result {
            Ok(passages) => passages
                .into_iter()
                .map(|p| {
                    let score = term_overlap_score(query, &p.content);
                    (p, score)
                })
                .collect(),
            Err(e) => {
                tracing::warn!("Substring fallback failed, using vector results only: {e}");
                Vec::new()
            }
        }
    }
}

/// Fraction of lowercased query terms that occur in the lowercased text.
pub fn term_overlap_score(query: &str, text: &str) -> f32 {
    let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
    if terms.is_empty() {
        return 0.0;
    }
    let haystack = text.to_lowercase();
    let matched = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
    matched as f32 / terms.len() as f32
}

/// Min-max normalize into `[0, 1]`. When every score is equal (including a
/// single item) all normalize to 0.
fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / range).collect()
}

/// Merge vector and keyword hits by weighted normalized score.
///
/// Output order is by combined score descending; ties keep vector-list order
/// first, then keyword-only passages in keyword order. Passages seen in only
/// one list are kept with a zero for the missing term.
pub fn combine_scored_lists(
    vector_hits: Vec<(Passage, f32)>,
    keyword_hits: Vec<(Passage, f32)>,
    k: usize,
    vector_weight: f32,
    keyword_weight: f32,
) -> Vec<Passage> {
    let vector_norm =
        min_max_normalize(&vector_hits.iter().map(|(_, s)| *s).collect::<Vec<_>>());
    let keyword_norm =
        min_max_normalize(&keyword_hits.iter().map(|(_, s)| *s).collect::<Vec<_>>());

    struct Entry {
        passage: Passage,
        vector: f32,
        keyword: f32,
        raw_keyword: Option<f32>,
    }

    let mut index: HashMap<PassageKey, usize> = HashMap::new();
    let mut entries: Vec<Entry> = Vec::new();

    for ((passage, raw), norm) in vector_hits.into_iter().zip(vector_norm) {
        let key = passage.key();
        if index.contains_key(&key) {
            continue;
        }
        index.insert(key, entries.len());
        entries.push(Entry {
            passage: passage.with_similarity_score(raw),
            vector: norm,
            keyword: 0.0,
            raw_keyword: None,
        });
    }

    for ((passage, raw), norm) in keyword_hits.into_iter().zip(keyword_norm) {
        match index.get(&passage.key()) {
            Some(&slot) => {
                let entry = &mut entries[slot];
                if entry.raw_keyword.is_none() {
                    entry.keyword = norm;
                    entry.raw_keyword = Some(raw);
                }
            }
            None => {
                index.insert(passage.key(), entries.len());
                entries.push(Entry {
                    passage,
                    vector: 0.0,
                    keyword: norm,
                    raw_keyword: Some(raw),
                });
            }
        }
    }

    let mut scored: Vec<(Passage, f32)> = entries
        .into_iter()
        .map(|e| {
            let combined = vector_weight * e.vector + keyword_weight * e.keyword;
            let mut passage = e.passage.with_hybrid_score(combined);
            if let Some(raw) = e.raw_keyword {
                passage = passage.with_keyword_score(raw);
            }
            (passage, combined)
        })
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k);
    scored.into_iter().map(|(p, _)| p).collect()
}
