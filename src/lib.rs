//! # doc-retrieval
//!
//! Multi-strategy passage retrieval. One query goes in, a short ranked list
//! of passages comes out, produced by up to four complementary retrievers
//! whose results are merged with Reciprocal Rank Fusion and refined by a
//! relevance reranker.
//!
//! ## Architecture
//!
//! ```text
//!                        ┌──────────────┐
//!                        │  User Query  │
//!                        └──────┬───────┘
//!                               │ token count
//!                               ▼
//!                     ┌───────────────────┐
//!                     │ Strategy Selector │
//!                     │ <5 simple         │
//!                     │ 5-14 hybrid       │
//!                     │ 15+ advanced      │
//!                     └─────────┬─────────┘
//!                               │ advanced
//!        ┌──────────────┬───────┴───────┬──────────────┐
//!        ▼              ▼               ▼              ▼
//!  ┌───────────┐ ┌─────────────┐ ┌────────────┐ ┌─────────────┐
//!  │  Direct   │ │   Hybrid    │ │    HyDE    │ │ Multi-Query │
//!  │  vector   │ │ 0.7 v+0.3 kw│ │ 3 hypoth.  │ │ 3 variants  │
//!  └─────┬─────┘ └──────┬──────┘ └─────┬──────┘ └──────┬──────┘
//!        └──────────────┴───────┬──────┴───────────────┘
//!                               ▼
//!                  ┌─────────────────────────┐
//!                  │  RRF Fusion (k = 60)    │
//!                  │  keep top_k_retrieval   │
//!                  └────────────┬────────────┘
//!                               ▼
//!                  ┌─────────────────────────┐
//!                  │  Rerank (fail-open)     │
//!                  │  keep top_k_final       │
//!                  └────────────┬────────────┘
//!                               ▼
//!                  ┌─────────────────────────┐
//!                  │  Similarity threshold   │
//!                  └─────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for retrieval, LLM and reranker settings
//! - [`models`] - `Passage`, typed metadata, filters and `RetrievalRequest`
//! - [`error`] - `RetrievalError` and per-stage `StageFailure`
//! - [`traits`] - Collaborator capabilities: document store, generator, scorer, embedder
//! - [`search::strategy`] - Query-length strategy selection
//! - [`search::hybrid`] - Min-max normalized vector + keyword combination
//! - [`search::hyde`] - Hypothetical document retrieval
//! - [`search::multi_query`] - Paraphrase expansion
//! - [`search::fusion`] - Weighted Reciprocal Rank Fusion
//! - [`search::rerank`] - Relevance reranking
//! - [`search::threshold`] - Final similarity cut-off
//! - [`search::pipeline`] - The orchestrator tying the stages together
//! - [`llm`] - HTTP adapters: text generation, embeddings, cross-encoder and LLM-judge scorers
//! - [`store`] - Local vector index and tantivy BM25 index behind `DocumentStore`
//! - [`state`] - Shared handles built once per process

pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod search;
pub mod state;
pub mod store;
pub mod traits;

#[cfg(test)]
mod test_utils;

pub use error::{RetrievalError, Stage, StageFailure};
pub use models::{MetadataFilter, Passage, RetrievalRequest};
pub use search::pipeline::{RetrievalPipeline, RetrievalReport, RetrieverStats};
pub use search::strategy::Strategy;
