use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::search::strategy::Strategy;

/// A retrievable unit of text.
///
/// Passages are treated as values: stages never mutate a passage they were
/// handed, they build a new one through the `with_*` methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Stable id assigned by the document store, if it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: PassageMetadata,
}

/// Passage metadata: the fields the pipeline reads plus an open extension map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Raw vector similarity from the document store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f32>,
    /// Raw keyword/lexical score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_score: Option<f32>,
    /// Weighted vector + keyword score from the hybrid combiner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hybrid_score: Option<f32>,
    /// Reciprocal rank fusion score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fusion_score: Option<f32>,
    /// Cross-encoder relevance score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PassageMetadata {
    /// Look up a metadata value by key, well-known fields first.
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            "filename" => self.filename.clone().map(Value::from),
            "page" => self.page.map(Value::from),
            "similarity_score" => self.similarity_score.map(Value::from),
            "keyword_score" => self.keyword_score.map(Value::from),
            "hybrid_score" => self.hybrid_score.map(Value::from),
            "fusion_score" => self.fusion_score.map(Value::from),
            "rerank_score" => self.rerank_score.map(Value::from),
            other => self.extra.get(other).cloned(),
        }
    }
}

/// Deduplication identity of a passage.
///
/// Falls back to a content fingerprint when the store gives no id, so two
/// textually identical passages from different sources collapse into one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassageKey {
    Id(String),
    Content(String),
}

impl Passage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: None,
            content: content.into(),
            metadata: PassageMetadata::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.metadata.filename = Some(filename.into());
        self
    }

    pub fn with_similarity_score(mut self, score: f32) -> Self {
        self.metadata.similarity_score = Some(score);
        self
    }

    pub fn with_keyword_score(mut self, score: f32) -> Self {
        self.metadata.keyword_score = Some(score);
        self
    }

    pub fn with_hybrid_score(mut self, score: f32) -> Self {
        self.metadata.hybrid_score = Some(score);
        self
    }

    pub fn with_fusion_score(mut self, score: f32) -> Self {
        self.metadata.fusion_score = Some(score);
        self
    }

    pub fn with_rerank_score(mut self, score: f32) -> Self {
        self.metadata.rerank_score = Some(score);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.extra.insert(key.into(), value.into());
        self
    }

    /// blake3 hex digest of the content text.
    pub fn fingerprint(&self) -> String {
        blake3::hash(self.content.as_bytes()).to_hex().to_string()
    }

    /// Store id if present, else the content fingerprint.
    pub fn key(&self) -> PassageKey {
        match &self.id {
            Some(id) => PassageKey::Id(id.clone()),
            None => PassageKey::Content(self.fingerprint()),
        }
    }

    /// Rerank score, else similarity score, else `None` (unscored).
    pub fn relevance_score(&self) -> Option<f32> {
        self.metadata
            .rerank_score
            .or(self.metadata.similarity_score)
    }
}

/// Equality filter over passage metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter(pub BTreeMap<String, Value>);

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every filter entry equals the passage's metadata value.
    pub fn matches(&self, metadata: &PassageMetadata) -> bool {
        self.0
            .iter()
            .all(|(key, expected)| metadata.get(key).as_ref() == Some(expected))
    }
}

/// One call into the retrieval pipeline.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    /// Final result size; defaults to the configured `top_k_final`
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub filters: Option<MetadataFilter>,
    /// Forced strategy; `None` or `Auto` runs the selector
    #[serde(default)]
    pub strategy: Option<Strategy>,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn filters(mut self, filters: MetadataFilter) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}
