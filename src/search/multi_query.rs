use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RetrievalError, Stage, StageFailure, StageResult};
use crate::models::{MetadataFilter, Passage};
use crate::traits::{with_timeout, DocumentStore, TextGenerator};

/// Retrieves with several paraphrases of the query to cover vocabulary the
/// user did not use.
pub struct MultiQueryExpander {
    store: Arc<dyn DocumentStore>,
    generator: Arc<dyn TextGenerator>,
    paraphrase_count: usize,
    max_concurrency: usize,
    call_timeout: Duration,
}

impl MultiQueryExpander {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn TextGenerator>,
        paraphrase_count: usize,
        max_concurrency: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            generator,
            paraphrase_count: paraphrase_count.max(1),
            max_concurrency: max_concurrency.max(1),
            call_timeout,
        }
    }

    /// Concatenated per-variant results, `max(k/3, 1)` each. Duplicates are
    /// left for fusion to merge. Any failure degrades to one direct search
    /// for `query` with `k`.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> StageResult<Vec<Passage>> {
        match self.expand_and_search(query, k, filter).await {
            Ok(passages) => Ok(passages),
            Err(e) => {
                tracing::warn!("Multi-query expansion failed, using direct search: {e}");
                with_timeout(
                    "vector search",
                    self.call_timeout,
                    self.store.similarity_search(query, k, filter),
                )
                .await
                .map_err(|e| StageFailure::new(Stage::MultiQuery, e))
            }
        }
    }

    async fn expand_and_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Passage>, RetrievalError> {
        let variants = with_timeout(
            "paraphrase generation",
            self.call_timeout,
            self.generator.paraphrase(query, self.paraphrase_count),
        )
        .await?;

        if variants.is_empty() {
            return Err(RetrievalError::Generation("no query variants produced".to_string()));
        }
        tracing::debug!("Expanded query into {} variants", variants.len());

        let per_variant = (k / 3).max(1);
        let searches: Vec<_> = variants
            .iter()
            .map(|variant| {
                with_timeout(
                    "vector search",
                    self.call_timeout,
                    self.store.similarity_search(variant, per_variant, filter),
                )
            })
            .collect();
        let lists: Vec<Vec<Passage>> = stream::iter(searches)
            .buffered(self.max_concurrency)
            .try_collect()
            .await?;

        Ok(lists.into_iter().flatten().collect())
    }
}
