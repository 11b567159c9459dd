//! Cross-encoder relevance scorer via an OpenAI-compatible `/v1/rerank` endpoint.
//!
//! Sends one batch request with every query-document pair instead of N
//! individual calls.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::RerankerConfig;
use crate::error::RetrievalError;
use crate::traits::RelevanceScorer;

/// Scorer backed by a cross-encoder sidecar (e.g. llama-server with a
/// reranker model).
pub struct CrossEncoderScorer {
    client: reqwest::Client,
    url: String,
    model: String,
    timeout: Duration,
}

impl CrossEncoderScorer {
    /// Fails when no base URL is configured; callers treat that as "no
    /// scorer available".
    pub fn new(client: reqwest::Client, config: &RerankerConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .context("Reranker base_url not configured")?;

        Ok(Self {
            client,
            url: format!("{}/v1/rerank", base_url.trim_end_matches('/')),
            model: config.model.clone().unwrap_or_else(|| "default".to_string()),
            timeout: Duration::from_secs(config.timeout_secs.min(30)),
        })
    }

    async fn rerank(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        let req_body = RerankRequest {
            model: self.model.clone(),
            query: query.to_string(),
            documents: documents.iter().map(|d| d.to_string()).collect(),
            top_n: documents.len(),
        };

        let resp = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&req_body)
            .send()
            .await
            .context("Failed to reach reranker endpoint")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Reranker returned {status}: {body}");
        }

        let body: RerankResponse = resp
            .json()
            .await
            .context("Failed to parse reranker response")?;

        scores_in_input_order(body.results, documents.len())
    }
}

#[async_trait]
impl RelevanceScorer for CrossEncoderScorer {
    fn name(&self) -> &str {
        &self.model
    }

    async fn score(&self, query: &str, passage_text: &str) -> Result<f32, RetrievalError> {
        let scores = self.score_batch(query, &[passage_text]).await?;
        scores
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::Scoring("Reranker returned no score".to_string()))
    }

    async fn score_batch(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>, RetrievalError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.rerank(query, texts)
            .await
            .map_err(|e| RetrievalError::Scoring(format!("{e:#}")))
    }
}

/// Map index-tagged results back onto input positions, normalizing logits.
/// Every input must receive exactly one score.
fn scores_in_input_order(results: Vec<RerankResultRaw>, n: usize) -> Result<Vec<f32>> {
    let mut scores: Vec<Option<f32>> = vec![None; n];
    for r in results {
        let slot = scores
            .get_mut(r.index)
            .with_context(|| format!("Reranker returned out-of-range index {}", r.index))?;
        *slot = Some(sigmoid(r.relevance_score));
    }
    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.with_context(|| format!("Reranker returned no score for document {i}")))
        .collect()
}

/// Sigmoid normalization: maps raw logits to 0-1 range.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

// ─── Request/Response types ────────────────────────────

#[derive(Serialize)]
struct RerankRequest {
    model: String,
    query: String,
    documents: Vec<String>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResultRaw>,
}

#[derive(Deserialize)]
struct RerankResultRaw {
    index: usize,
    relevance_score: f32,
}
