use std::sync::Arc;
use std::time::Duration;

use crate::error::{RetrievalError, Stage, StageFailure, StageResult};
use crate::models::Passage;
use crate::traits::{with_timeout, RelevanceScorer};

/// Rescores candidates with a relevance model and keeps the best `top_k`.
///
/// Fail-open: without a scorer, or when scoring fails, the input order is
/// kept and simply truncated.
pub struct Reranker {
    scorer: Option<Arc<dyn RelevanceScorer>>,
    call_timeout: Duration,
}

impl Reranker {
    pub fn new(scorer: Option<Arc<dyn RelevanceScorer>>, call_timeout: Duration) -> Self {
        Self {
            scorer,
            call_timeout,
        }
    }

    pub fn scorer_name(&self) -> Option<&str> {
        self.scorer.as_deref().map(|s| s.name())
    }

    /// Rerank, falling back to the truncated input on any failure.
    pub async fn rerank(&self, query: &str, passages: Vec<Passage>, top_k: usize) -> Vec<Passage> {
        match self.try_rerank(query, &passages, top_k).await {
            Ok(reranked) => reranked,
            Err(failure) => {
                tracing::warn!("{failure}, keeping retrieval order");
                passages.into_iter().take(top_k).collect()
            }
        }
    }

    /// Score every candidate and return the top `top_k` by score. Ties keep
    /// input order. Without a scorer the input is truncated unchanged.
    pub async fn try_rerank(
        &self,
        query: &str,
        passages: &[Passage],
        top_k: usize,
    ) -> StageResult<Vec<Passage>> {
        let Some(scorer) = self.scorer.as_deref() else {
            tracing::debug!("No relevance scorer configured, skipping rerank");
            return Ok(passages.iter().take(top_k).cloned().collect());
        };
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = passages.iter().map(|p| p.content.as_str()).collect();
        let scores = with_timeout("relevance scoring", self.call_timeout, scorer.score_batch(query, &texts))
            .await
            .map_err(|e| StageFailure::new(Stage::Rerank, e))?;

        if scores.len() != passages.len() {
            return Err(StageFailure::new(
                Stage::Rerank,
                RetrievalError::Scoring(format!(
                    "{} returned {} scores for {} passages",
                    scorer.name(),
                    scores.len(),
                    passages.len()
                )),
            ));
        }

        let mut scored: Vec<(Passage, f32)> = passages
            .iter()
            .cloned()
            .zip(scores)
            .map(|(p, s)| (p.with_rerank_score(s), s))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        tracing::debug!(
            scorer = scorer.name(),
            kept = scored.len(),
            "Reranked {} candidates",
            passages.len()
        );

        Ok(scored.into_iter().map(|(p, _)| p).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ids, passage, ScriptedScorer};
    use async_trait::async_trait;

    fn candidates() -> Vec<Passage> {
        vec![
            passage("p1", "first 0.2"),
            passage("p2", "second 0.9"),
            passage("p3", "third 0.5"),
            passage("p4", "fourth 0.9"),
        ]
    }

    fn reranker(scorer: Option<Arc<dyn RelevanceScorer>>) -> Reranker {
        Reranker::new(scorer, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_no_scorer_is_fail_open() {
        let out = reranker(None).rerank("q", candidates(), 2).await;
        assert_eq!(ids(&out), vec!["p1", "p2"]);
        assert!(out.iter().all(|p| p.metadata.rerank_score.is_none()));
    }

    #[tokio::test]
    async fn test_sorts_by_score_with_stable_ties() {
        let r = reranker(Some(Arc::new(ScriptedScorer::from_content())));
        let out = r.rerank("q", candidates(), 3).await;
        assert_eq!(ids(&out), vec!["p2", "p4", "p3"]);
        assert_eq!(out[0].metadata.rerank_score, Some(0.9));
        assert_eq!(out[2].metadata.rerank_score, Some(0.5));
    }

    #[tokio::test]
    async fn test_scorer_error_keeps_input_order() {
        let scorer = ScriptedScorer::new(|_, _| Err(RetrievalError::Scoring("oom".to_string())));
        let r = reranker(Some(Arc::new(scorer)));

        let failure = r.try_rerank("q", &candidates(), 2).await.unwrap_err();
        assert_eq!(failure.stage, Stage::Rerank);

        let out = r.rerank("q", candidates(), 2).await;
        assert_eq!(ids(&out), vec!["p1", "p2"]);
    }

    struct ShortScorer;

    #[async_trait]
    impl RelevanceScorer for ShortScorer {
        fn name(&self) -> &str {
            "short"
        }

        async fn score(&self, _query: &str, _text: &str) -> Result<f32, RetrievalError> {
            Ok(1.0)
        }

        async fn score_batch(&self, _query: &str, _texts: &[&str]) -> Result<Vec<f32>, RetrievalError> {
            Ok(vec![1.0])
        }
    }

    #[tokio::test]
    async fn test_score_count_mismatch_is_failure() {
        let r = reranker(Some(Arc::new(ShortScorer)));
        assert!(r.try_rerank("q", &candidates(), 2).await.is_err());
        assert_eq!(ids(&r.rerank("q", candidates(), 2).await), vec!["p1", "p2"]);
    }

    struct SlowScorer;

    #[async_trait]
    impl RelevanceScorer for SlowScorer {
        fn name(&self) -> &str {
            "slow"
        }

        async fn score(&self, _query: &str, _text: &str) -> Result<f32, RetrievalError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1.0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_fail_open() {
        let r = reranker(Some(Arc::new(SlowScorer)));
        let failure = r.try_rerank("q", &candidates(), 2).await.unwrap_err();
        assert!(matches!(failure.error, RetrievalError::Timeout { .. }));
        assert_eq!(ids(&r.rerank("q", candidates(), 2).await), vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let r = reranker(Some(Arc::new(ScriptedScorer::from_content())));
        assert!(r.rerank("q", Vec::new(), 5).await.is_empty());
        assert_eq!(r.scorer_name(), Some("scripted"));
    }
}
