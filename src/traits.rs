//! Capabilities the pipeline consumes from its collaborators.
//!
//! Handles are built once per process and injected as `Arc<dyn Trait>`, so
//! every implementation must be `Send + Sync` and safe for concurrent queries.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::error::RetrievalError;
use crate::llm::query_expand;
use crate::models::{MetadataFilter, Passage};

/// Search capability of the passage collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Vector similarity search returning `(passage, similarity)` pairs,
    /// most similar first.
    async fn similarity_search_with_score(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(Passage, f32)>, RetrievalError>;

    /// Full-text search. May fail with [`RetrievalError::Unsupported`].
    async fn keyword_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<(Passage, f32)>, RetrievalError>;

    /// Case-insensitive substring match, used when full-text search is
    /// unavailable.
    async fn substring_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<Passage>, RetrievalError> {
        let _ = (query, k);
        Err(RetrievalError::Unsupported("substring search".to_string()))
    }

    /// Vector similarity search with the similarity attached to each
    /// passage's metadata.
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Passage>, RetrievalError> {
        let hits = self.similarity_search_with_score(query, k, filter).await?;
        Ok(hits
            .into_iter()
            .map(|(passage, score)| passage.with_similarity_score(score))
            .collect())
    }
}

/// Text completion service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Complete `prompt` at the given sampling temperature. Failures are
    /// errors; `Ok("")` means the model really produced nothing.
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, RetrievalError>;

    /// Produce up to `count` alternative phrasings of `query`.
    async fn paraphrase(&self, query: &str, count: usize) -> Result<Vec<String>, RetrievalError> {
        let prompt = query_expand::build_paraphrase_prompt(query, count);
        let response = self
            .generate(&prompt, query_expand::PARAPHRASE_TEMPERATURE)
            .await?;
        let variants = query_expand::parse_expanded_queries(&response, count);
        if variants.is_empty() {
            return Err(RetrievalError::Generation(
                "no paraphrases could be parsed from the completion".to_string(),
            ));
        }
        Ok(variants)
    }
}

/// Cross-encoder style (query, passage) relevance model.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Short name for logs and stats.
    fn name(&self) -> &str;

    async fn score(&self, query: &str, passage_text: &str) -> Result<f32, RetrievalError>;

    /// Score many passages against one query. Returns one score per input,
    /// in input order.
    async fn score_batch(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>, RetrievalError> {
        let mut scores = Vec::with_capacity(texts.len());
        for text in texts {
            scores.push(self.score(query, text).await?);
        }
        Ok(scores)
    }
}

/// Turns text into vectors; used by stores that embed queries locally.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::Embedding("No embedding returned".to_string()))
    }
}

/// Bound a collaborator call by `limit`, mapping expiry to
/// [`RetrievalError::Timeout`].
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T, RetrievalError>
where
    F: Future<Output = Result<T, RetrievalError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(RetrievalError::Timeout {
            operation: operation.to_string(),
            after: limit,
        }),
    }
}
