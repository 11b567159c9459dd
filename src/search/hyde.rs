//! Hypothetical Document Embeddings.
//!
//! A short query and the passage that answers it rarely sit close together in
//! embedding space. HyDE asks the generator to write the answer first and
//! searches with that text instead. Several hypotheses at rising temperatures
//! widen the net.

use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RetrievalError, Stage, StageFailure, StageResult};
use crate::models::{MetadataFilter, Passage};
use crate::traits::{with_timeout, DocumentStore, TextGenerator};

const BASE_TEMPERATURE: f32 = 0.3;
const TEMPERATURE_STEP: f32 = 0.2;

/// Sampling temperature for hypothesis `index`: 0.3, 0.5, 0.7, ...
pub fn hypothesis_temperature(index: usize) -> f32 {
    BASE_TEMPERATURE + TEMPERATURE_STEP * index as f32
}

pub fn build_hyde_prompt(query: &str) -> String {
    format!(
        "You are a domain expert. Write a passage of 150-200 words, in the style of \
         an excerpt from an authoritative document, that directly answers the \
         question below. Write only the passage, with no preamble.\n\n\
         Question: {query}\n\nPassage:"
    )
}

pub struct HydeRetriever {
    store: Arc<dyn DocumentStore>,
    generator: Arc<dyn TextGenerator>,
    hypothesis_count: usize,
    max_concurrency: usize,
    call_timeout: Duration,
}

impl HydeRetriever {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn TextGenerator>,
        hypothesis_count: usize,
        max_concurrency: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            generator,
            hypothesis_count: hypothesis_count.max(1),
            max_concurrency: max_concurrency.max(1),
            call_timeout,
        }
    }

    /// Generate hypotheses, search with each, and return up to `k` unique
    /// passages in first-seen order.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> StageResult<Vec<Passage>> {
        let hypotheses = self.generate_hypotheses(query).await;

        match self.search_hypotheses(&hypotheses, k, filter).await {
            Ok(passages) => Ok(passages),
            Err(e) => {
                tracing::warn!("HyDE retrieval failed, using plain vector search: {e}");
                with_timeout(
                    "vector search",
                    self.call_timeout,
                    self.store.similarity_search(query, k, filter),
                )
                .await
                .map_err(|e| StageFailure::new(Stage::Hyde, e))
            }
        }
    }

    /// Hypotheses in temperature order. Failed or blank generations are
    /// skipped; if none succeed the query itself is the only hypothesis.
    async fn generate_hypotheses(&self, query: &str) -> Vec<String> {
        let prompt = build_hyde_prompt(query);

        let generations: Vec<_> = (0..self.hypothesis_count)
            .map(|i| {
                with_timeout(
                    "hypothesis generation",
                    self.call_timeout,
                    self.generator.generate(&prompt, hypothesis_temperature(i)),
                )
            })
            .collect();
        let results: Vec<_> = stream::iter(generations)
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let mut hypotheses = Vec::with_capacity(results.len());
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(text) if !text.trim().is_empty() => hypotheses.push(text.trim().to_string()),
                Ok(_) => tracing::debug!("Hypothesis {i} was empty, skipping"),
                Err(e) => tracing::warn!("Hypothesis {i} generation failed: {e}"),
            }
        }

        if hypotheses.is_empty() {
            tracing::warn!("No hypotheses generated, searching with the original query");
            hypotheses.push(query.to_string());
        }
        hypotheses
    }

    async fn search_hypotheses(
        &self,
        hypotheses: &[String],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Passage>, RetrievalError> {
        let searches: Vec<_> = hypotheses
            .iter()
            .map(|h| {
                with_timeout(
                    "vector search",
                    self.call_timeout,
                    self.store.similarity_search(h, k, filter),
                )
            })
            .collect();
        let lists: Vec<Vec<Passage>> = stream::iter(searches)
            .buffered(self.max_concurrency)
            .try_collect()
            .await?;

        Ok(dedup_by_fingerprint(lists.into_iter().flatten(), k))
    }
}

/// Keep the first passage per content fingerprint, up to `limit`.
fn dedup_by_fingerprint(passages: impl IntoIterator<Item = Passage>, limit: usize) -> Vec<Passage> {
    let mut seen = HashSet::new();
    passages
        .into_iter()
        .filter(|p| seen.insert(p.fingerprint()))
        .take(limit)
        .collect()
}
