//! Retrieval orchestrator.
//!
//! ```text
//! query ─▶ strategy ─┬─ simple ──▶ vector search ───────────────────────┐
//!                    ├─ hybrid ──▶ vector + keyword (or vector) ────────┤
//!                    └─ advanced ▶ direct │ hybrid │ HyDE │ multi-query │
//!                                  └────────── RRF ─────────────────────┤
//!                                                                       ▼
//!                             rerank (or truncate) ─▶ threshold ─▶ passages
//! ```
//!
//! Any failure that escapes the strategy, including a panic, falls back to a
//! bare vector search. [`RetrievalPipeline::retrieve`] always returns a list.

use futures_util::future::BoxFuture;
use futures_util::stream::{self, StreamExt};
use futures_util::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetrievalConfig;
use crate::error::{RetrievalError, Stage, StageFailure, StageResult};
use crate::models::{MetadataFilter, Passage, RetrievalRequest};
use crate::search::fusion::reciprocal_rank_fusion;
use crate::search::hybrid::HybridCombiner;
use crate::search::hyde::HydeRetriever;
use crate::search::multi_query::MultiQueryExpander;
use crate::search::rerank::Reranker;
use crate::search::strategy::{resolve_strategy, Strategy};
use crate::search::threshold::apply_threshold;
use crate::traits::{with_timeout, DocumentStore, RelevanceScorer, TextGenerator};

/// Outcome of one retrieval run.
#[derive(Debug, Clone)]
pub struct RetrievalReport {
    /// Strategy that was executed
    pub strategy: Strategy,
    pub passages: Vec<Passage>,
    /// Stages that failed and were degraded around
    pub failures: Vec<StageFailure>,
    /// Whether the bare vector-search fallback produced the result
    pub fallback_used: bool,
}

/// Active configuration, for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieverStats {
    pub enable_hyde: bool,
    pub enable_hybrid: bool,
    pub enable_reranking: bool,
    pub top_k_retrieval: usize,
    pub top_k_final: usize,
    pub similarity_threshold: f32,
    pub hyde_hypothesis_count: usize,
    pub rrf_constant: u32,
    pub max_concurrency: usize,
    /// Name of the relevance scorer, if one is configured
    pub reranker: Option<String>,
}

pub struct RetrievalPipeline {
    config: RetrievalConfig,
    store: Arc<dyn DocumentStore>,
    hybrid: HybridCombiner,
    hyde: HydeRetriever,
    multi_query: MultiQueryExpander,
    reranker: Reranker,
}

impl RetrievalPipeline {
    pub fn new(
        config: RetrievalConfig,
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn TextGenerator>,
        scorer: Option<Arc<dyn RelevanceScorer>>,
    ) -> Result<Self, RetrievalError> {
        config.validate()?;
        let call_timeout = config.call_timeout();

        Ok(Self {
            hybrid: HybridCombiner::new(
                store.clone(),
                config.hybrid_vector_weight,
                config.hybrid_keyword_weight,
                call_timeout,
            ),
            hyde: HydeRetriever::new(
                store.clone(),
                generator.clone(),
                config.hyde_hypothesis_count,
                config.max_concurrency,
                call_timeout,
            ),
            multi_query: MultiQueryExpander::new(
                store.clone(),
                generator,
                config.paraphrase_count,
                config.max_concurrency,
                call_timeout,
            ),
            reranker: Reranker::new(scorer, call_timeout),
            store,
            config,
        })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Ranked passages for `request`. Never fails; see [`Self::retrieve_with_report`].
    pub async fn retrieve(&self, request: &RetrievalRequest) -> Vec<Passage> {
        self.retrieve_with_report(request).await.passages
    }

    pub async fn retrieve_with_report(&self, request: &RetrievalRequest) -> RetrievalReport {
        let query = request.query.as_str();
        let final_k = request.top_k.unwrap_or(self.config.top_k_final);
        let filter = request.filters.as_ref().filter(|f| !f.is_empty());
        let strategy = resolve_strategy(request.strategy, query, &self.config);

        tracing::info!(%strategy, final_k, "Retrieving passages");

        let mut failures = Vec::new();
        if final_k == 0 {
            return RetrievalReport {
                strategy,
                passages: Vec::new(),
                failures,
                fallback_used: false,
            };
        }

        let outcome = AssertUnwindSafe(self.run(strategy, query, final_k, filter, &mut failures))
            .catch_unwind()
            .await;

        let failure = match outcome {
            Ok(Ok(passages)) => {
                tracing::info!(%strategy, results = passages.len(), "Retrieval complete");
                return RetrievalReport {
                    strategy,
                    passages,
                    failures,
                    fallback_used: false,
                };
            }
            Ok(Err(failure)) => failure,
            Err(panic) => StageFailure::new(
                Stage::Pipeline,
                RetrievalError::Panicked(panic_message(panic.as_ref())),
            ),
        };

        tracing::error!("Retrieval failed ({failure}), falling back to vector search");
        failures.push(failure);
        let passages = self.fallback(query, final_k, filter, &mut failures).await;

        RetrievalReport {
            strategy,
            passages,
            failures,
            fallback_used: true,
        }
    }

    pub fn stats(&self) -> RetrieverStats {
        RetrieverStats {
            enable_hyde: self.config.enable_hyde,
            enable_hybrid: self.config.enable_hybrid,
            enable_reranking: self.config.enable_reranking,
            top_k_retrieval: self.config.top_k_retrieval,
            top_k_final: self.config.top_k_final,
            similarity_threshold: self.config.similarity_threshold,
            hyde_hypothesis_count: self.config.hyde_hypothesis_count,
            rrf_constant: self.config.rrf_constant,
            max_concurrency: self.config.max_concurrency,
            reranker: self.reranker.scorer_name().map(str::to_string),
        }
    }

    async fn run(
        &self,
        strategy: Strategy,
        query: &str,
        final_k: usize,
        filter: Option<&MetadataFilter>,
        failures: &mut Vec<StageFailure>,
    ) -> StageResult<Vec<Passage>> {
        let initial_k = self.config.top_k_retrieval;

        let candidates = match strategy {
            Strategy::Simple | Strategy::Auto => self.direct(query, initial_k, filter).await?,
            Strategy::Hybrid => match self.hybrid.search(query, initial_k, filter).await {
                Ok(passages) => passages,
                Err(failure) => {
                    tracing::warn!("{failure}, using plain vector search");
                    failures.push(failure);
                    self.direct(query, initial_k, filter).await?
                }
            },
            Strategy::Advanced => self.advanced(query, initial_k, filter, failures).await?,
        };

        let ranked = if self.config.enable_reranking {
            match self.reranker.try_rerank(query, &candidates, final_k).await {
                Ok(reranked) => reranked,
                Err(failure) => {
                    tracing::warn!("{failure}, keeping retrieval order");
                    failures.push(failure);
                    truncated(candidates, final_k)
                }
            }
        } else {
            truncated(candidates, final_k)
        };

        Ok(apply_threshold(ranked, self.config.similarity_threshold))
    }

    async fn direct(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> StageResult<Vec<Passage>> {
        with_timeout(
            "vector search",
            self.config.call_timeout(),
            self.store.similarity_search(query, k, filter),
        )
        .await
        .map_err(|e| StageFailure::new(Stage::Direct, e))
    }

    /// Run every enabled branch (capped by `max_concurrency`), fuse the
    /// successful lists with RRF and keep the top `initial_k`.
    async fn advanced(
        &self,
        query: &str,
        initial_k: usize,
        filter: Option<&MetadataFilter>,
        failures: &mut Vec<StageFailure>,
    ) -> StageResult<Vec<Passage>> {
        let mut branches: Vec<(Stage, BoxFuture<'_, StageResult<Vec<Passage>>>)> =
            vec![(Stage::Direct, self.direct(query, initial_k, filter).boxed())];
        if self.config.enable_hybrid {
            branches.push((Stage::Hybrid, self.hybrid.search(query, initial_k, filter).boxed()));
        }
        if self.config.enable_hyde {
            branches.push((Stage::Hyde, self.hyde.retrieve(query, initial_k, filter).boxed()));
        }
        branches.push((
            Stage::MultiQuery,
            self.multi_query.retrieve(query, initial_k, filter).boxed(),
        ));

        let branch_timeout = self.config.branch_timeout();
        let guarded: Vec<_> = branches
            .into_iter()
            .map(|(stage, branch)| run_branch(stage, branch_timeout, branch))
            .collect();
        let outcomes: Vec<StageResult<Vec<Passage>>> = stream::iter(guarded)
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let mut lists = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(list) => lists.push(list),
                Err(failure) => {
                    tracing::warn!("{failure}, omitting branch from fusion");
                    failures.push(failure);
                }
            }
        }

        if lists.is_empty() {
            return Err(StageFailure::new(
                Stage::Fusion,
                RetrievalError::Store("every retrieval branch failed".to_string()),
            ));
        }

        let mut fused = reciprocal_rank_fusion(&lists, None, self.config.rrf_constant);
        fused.truncate(initial_k);
        tracing::debug!(branches = lists.len(), fused = fused.len(), "Fused advanced branches");
        Ok(fused)
    }

    /// Bare vector search for `final_k`. Yields an empty list if that fails too.
    async fn fallback(
        &self,
        query: &str,
        final_k: usize,
        filter: Option<&MetadataFilter>,
        failures: &mut Vec<StageFailure>,
    ) -> Vec<Passage> {
        let attempt = AssertUnwindSafe(self.direct(query, final_k, filter))
            .catch_unwind()
            .await;

        let failure = match attempt {
            Ok(Ok(passages)) => return passages,
            Ok(Err(failure)) => StageFailure::new(Stage::Fallback, failure.error),
            Err(panic) => StageFailure::new(
                Stage::Fallback,
                RetrievalError::Panicked(panic_message(panic.as_ref())),
            ),
        };
        tracing::error!("Fallback search failed, returning no passages: {failure}");
        failures.push(failure);
        Vec::new()
    }
}

/// Run one advanced branch under `limit`. Errors, timeouts and panics all
/// become a failure of `stage`.
async fn run_branch(
    stage: Stage,
    limit: Duration,
    branch: BoxFuture<'_, StageResult<Vec<Passage>>>,
) -> StageResult<Vec<Passage>> {
    let label = format!("{stage} branch");
    let guarded = async {
        match AssertUnwindSafe(branch).catch_unwind().await {
            Ok(result) => result.map_err(|failure| failure.error),
            Err(panic) => Err(RetrievalError::Panicked(panic_message(panic.as_ref()))),
        }
    };
    with_timeout(&label, limit, guarded)
        .await
        .map_err(|e| StageFailure::new(stage, e))
}

fn truncated(mut passages: Vec<Passage>, k: usize) -> Vec<Passage> {
    passages.truncate(k);
    passages
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
