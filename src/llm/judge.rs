use async_trait::async_trait;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::RetrievalError;
use crate::traits::{RelevanceScorer, TextGenerator};

/// Maximum in-flight judgement calls per batch.
const JUDGE_CONCURRENCY: usize = 4;

/// Relevance scorer that asks the chat model for a yes/no judgement per
/// passage and turns it into a score in `[0, 1]`.
pub struct LlmJudgeScorer {
    generator: Arc<dyn TextGenerator>,
    name: String,
}

impl LlmJudgeScorer {
    pub fn new(generator: Arc<dyn TextGenerator>, model_name: impl Into<String>) -> Self {
        Self {
            generator,
            name: model_name.into(),
        }
    }
}

#[async_trait]
impl RelevanceScorer for LlmJudgeScorer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn score(&self, query: &str, passage_text: &str) -> Result<f32, RetrievalError> {
        let prompt = build_yesno_prompt(query, passage_text);
        let response = self
            .generator
            .generate(&prompt, 0.0)
            .await
            .map_err(|e| RetrievalError::Scoring(e.to_string()))?;
        Ok(parse_relevance_score(&response))
    }

    async fn score_batch(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>, RetrievalError> {
        let scoring: Vec<_> = texts.iter().map(|text| self.score(query, text)).collect();
        stream::iter(scoring)
            .buffered(JUDGE_CONCURRENCY)
            .try_collect()
            .await
    }
}

/// Build a yes/no relevance prompt for a single passage.
fn build_yesno_prompt(query: &str, content: &str) -> String {
    let snippet = truncate_content(content, 800);
    format!(
        "Judge whether the following passage is relevant to the question. \
         Answer with ONLY a JSON object: {{\"relevant\": true/false, \"confidence\": 0.0-1.0}}\n\n\
         Question: {query}\n\nPassage:\n{snippet}\n"
    )
}

fn truncate_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        None => content.to_string(),
        Some((byte_idx, _)) => format!("{}...", &content[..byte_idx]),
    }
}

/// Map a judgement to a score: relevant answers land in `[0.5, 1]`,
/// irrelevant ones in `[0, 0.5]`, scaled by confidence.
fn parse_relevance_score(content: &str) -> f32 {
    if let Ok(v) = serde_json::from_str::<RelevanceResponse>(content.trim()) {
        return v.score();
    }

    if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<RelevanceResponse>(&content[start..=end]) {
                return v.score();
            }
        }
    }

    let lower = content.to_lowercase();
    let has_word = |word: &str| {
        lower
            .split_whitespace()
            .any(|w| w.trim_matches(|c: char| !c.is_alphanumeric()) == word)
    };
    if lower.contains("\"relevant\": true") || has_word("yes") {
        0.7
    } else if lower.contains("\"relevant\": false") || has_word("no") {
        0.2
    } else {
        0.5 // Uncertain
    }
}

#[derive(Deserialize)]
struct RelevanceResponse {
    relevant: bool,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

impl RelevanceResponse {
    fn score(&self) -> f32 {
        let confidence = self.confidence.clamp(0.0, 1.0);
        if self.relevant {
            0.5 + confidence * 0.5
        } else {
            0.5 - confidence * 0.5
        }
    }
}

fn default_confidence() -> f32 {
    0.5
}
