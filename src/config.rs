use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::RetrievalError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the local document store persists its indexes
    pub data_dir: PathBuf,
    /// Retrieval pipeline settings
    pub retrieval: RetrievalConfig,
    /// LLM provider used for generation and embeddings
    pub llm: LlmConfig,
    /// Relevance scorer configuration
    pub reranker: RerankerConfig,
}

/// Immutable per-pipeline retrieval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalConfig {
    pub enable_hyde: bool,
    pub enable_hybrid: bool,
    pub enable_reranking: bool,
    /// Candidate pool size fetched by each retriever
    pub top_k_retrieval: usize,
    /// Final result size
    pub top_k_final: usize,
    /// Minimum relevance kept by the threshold filter (0 disables it)
    pub similarity_threshold: f32,
    pub hyde_hypothesis_count: usize,
    /// RRF smoothing constant
    pub rrf_constant: u32,
    pub hybrid_vector_weight: f32,
    pub hybrid_keyword_weight: f32,
    /// Number of paraphrases requested by the multi-query expander
    pub paraphrase_count: usize,
    /// Cap on concurrently running branches and generation calls (1 = sequential)
    pub max_concurrency: usize,
    /// Deadline for a single generation, scoring or store call
    pub call_timeout_secs: u64,
    /// Deadline for one advanced-strategy branch
    pub branch_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enable_hyde: true,
            enable_hybrid: true,
            enable_reranking: true,
            top_k_retrieval: 20,
            top_k_final: 5,
            similarity_threshold: 0.7,
            hyde_hypothesis_count: 3,
            rrf_constant: 60,
            hybrid_vector_weight: 0.7,
            hybrid_keyword_weight: 0.3,
            paraphrase_count: 3,
            max_concurrency: 4,
            call_timeout_secs: 20,
            branch_timeout_secs: 60,
        }
    }
}

impl RetrievalConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn branch_timeout(&self) -> Duration {
        Duration::from_secs(self.branch_timeout_secs)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), RetrievalError> {
        let invalid = |msg: String| Err(RetrievalError::InvalidConfig(msg));

        if self.top_k_retrieval == 0 {
            return invalid("topKRetrieval must be at least 1".to_string());
        }
        if self.top_k_final == 0 {
            return invalid("topKFinal must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return invalid(format!(
                "similarityThreshold must be within 0..=1, got {}",
                self.similarity_threshold
            ));
        }
        if self.hyde_hypothesis_count == 0 {
            return invalid("hydeHypothesisCount must be at least 1".to_string());
        }
        let weight_ok = |w: f32| w.is_finite() && w >= 0.0;
        if !weight_ok(self.hybrid_vector_weight) || !weight_ok(self.hybrid_keyword_weight) {
            return invalid("hybrid weights must be finite and not negative".to_string());
        }
        if self.max_concurrency == 0 {
            return invalid("maxConcurrency must be at least 1".to_string());
        }
        if self.call_timeout_secs == 0 || self.branch_timeout_secs == 0 {
            return invalid("timeouts must be at least one second".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for hypothesis / paraphrase generation
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            api_key: None,
        }
    }
}

/// Configuration for the relevance scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// "cross-encoder" (rerank sidecar) or "llm" (yes/no judgement via the chat model)
    pub provider: String,
    /// Base URL for the cross-encoder API (e.g. "http://127.0.0.1:8082").
    /// If None, the cross-encoder is unavailable and reranking is fail-open.
    pub base_url: Option<String>,
    /// Model name to send in the rerank request.
    pub model: Option<String>,
    /// Request timeout in seconds (capped at 30).
    pub timeout_secs: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: "cross-encoder".to_string(),
            base_url: None,
            model: None,
            timeout_secs: 10,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
            reranker: RerankerConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from defaults overlaid with values from `lookup`.
    /// Unparseable values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("RETRIEVAL_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        let r = &mut config.retrieval;
        set_parsed(&lookup, "RETRIEVAL_ENABLE_HYDE", &mut r.enable_hyde);
        set_parsed(&lookup, "RETRIEVAL_ENABLE_HYBRID", &mut r.enable_hybrid);
        set_parsed(&lookup, "RETRIEVAL_ENABLE_RERANKING", &mut r.enable_reranking);
        set_parsed(&lookup, "RETRIEVAL_TOP_K", &mut r.top_k_retrieval);
        set_parsed(&lookup, "RETRIEVAL_TOP_K_FINAL", &mut r.top_k_final);
        set_parsed(&lookup, "RETRIEVAL_SIMILARITY_THRESHOLD", &mut r.similarity_threshold);
        set_parsed(&lookup, "RETRIEVAL_HYDE_HYPOTHESES", &mut r.hyde_hypothesis_count);
        set_parsed(&lookup, "RETRIEVAL_RRF_CONSTANT", &mut r.rrf_constant);
        set_parsed(&lookup, "RETRIEVAL_HYBRID_VECTOR_WEIGHT", &mut r.hybrid_vector_weight);
        set_parsed(&lookup, "RETRIEVAL_HYBRID_KEYWORD_WEIGHT", &mut r.hybrid_keyword_weight);
        set_parsed(&lookup, "RETRIEVAL_PARAPHRASES", &mut r.paraphrase_count);
        set_parsed(&lookup, "RETRIEVAL_MAX_CONCURRENCY", &mut r.max_concurrency);
        set_parsed(&lookup, "RETRIEVAL_CALL_TIMEOUT_SECS", &mut r.call_timeout_secs);
        set_parsed(&lookup, "RETRIEVAL_BRANCH_TIMEOUT_SECS", &mut r.branch_timeout_secs);

        if let Some(provider) = lookup("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Some(url) = lookup("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Some(model) = lookup("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Some(model) = lookup("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Some(key) = lookup("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }

        // Reranker config
        if let Some(provider) = lookup("RERANKER_PROVIDER") {
            config.reranker.provider = provider;
        }
        if let Some(url) = lookup("RERANKER_BASE_URL") {
            config.reranker.base_url = Some(url);
        }
        if let Some(model) = lookup("RERANKER_MODEL") {
            config.reranker.model = Some(model);
        }
        if let Some(val) = lookup("RERANKER_TIMEOUT_SECS") {
            if let Ok(v) = val.parse::<u64>() {
                config.reranker.timeout_secs = v.min(30); // Cap at 30s
            }
        }

        config
    }

    pub fn vector_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }
}

fn set_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(v) => *target = v,
            Err(_) => tracing::warn!("Ignoring unparseable value for {key}: {raw:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        let r = &config.retrieval;
        assert!(r.enable_hyde && r.enable_hybrid && r.enable_reranking);
        assert_eq!(r.top_k_retrieval, 20);
        assert_eq!(r.top_k_final, 5);
        assert_eq!(r.rrf_constant, 60);
        assert_eq!(r.hyde_hypothesis_count, 3);
        assert!((r.hybrid_vector_weight - 0.7).abs() < 1e-6);
        assert!((r.hybrid_keyword_weight - 0.3).abs() < 1e-6);
        assert!(r.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("RETRIEVAL_ENABLE_HYDE", "false"),
            ("RETRIEVAL_TOP_K", "40"),
            ("RETRIEVAL_SIMILARITY_THRESHOLD", "0.25"),
            ("LLM_PROVIDER", "openai"),
            ("RERANKER_BASE_URL", "http://127.0.0.1:8082"),
            ("RERANKER_TIMEOUT_SECS", "120"),
        ]));
        assert!(!config.retrieval.enable_hyde);
        assert_eq!(config.retrieval.top_k_retrieval, 40);
        assert!((config.retrieval.similarity_threshold - 0.25).abs() < 1e-6);
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(
            config.reranker.base_url.as_deref(),
            Some("http://127.0.0.1:8082")
        );
        assert_eq!(config.reranker.timeout_secs, 30);
    }

    #[test]
    fn test_unparseable_values_keep_default() {
        let config = Config::from_lookup(lookup_from(&[
            ("RETRIEVAL_TOP_K_FINAL", "lots"),
            ("RETRIEVAL_ENABLE_HYBRID", "yes please"),
        ]));
        assert_eq!(config.retrieval.top_k_final, 5);
        assert!(config.retrieval.enable_hybrid);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let bad = [
            RetrievalConfig {
                top_k_final: 0,
                ..Default::default()
            },
            RetrievalConfig {
                similarity_threshold: 1.5,
                ..Default::default()
            },
            RetrievalConfig {
                hyde_hypothesis_count: 0,
                ..Default::default()
            },
            RetrievalConfig {
                hybrid_keyword_weight: -0.1,
                ..Default::default()
            },
            RetrievalConfig {
                max_concurrency: 0,
                ..Default::default()
            },
            RetrievalConfig {
                hybrid_vector_weight: f32::NAN,
                ..Default::default()
            },
            RetrievalConfig {
                hybrid_keyword_weight: f32::INFINITY,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(
                config.validate(),
                Err(RetrievalError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_camel_case_option_names() {
        let json = r#"{"enableHyde": false, "topKRetrieval": 12, "topKFinal": 3, "rrfConstant": 30, "hybridVectorWeight": 0.5}"#;
        let config: RetrievalConfig = serde_json::from_str(json).unwrap();
        assert!(!config.enable_hyde);
        assert_eq!(config.top_k_retrieval, 12);
        assert_eq!(config.top_k_final, 3);
        assert_eq!(config.rrf_constant, 30);
        assert!((config.hybrid_vector_weight - 0.5).abs() < 1e-6);
        // Unspecified options keep their defaults
        assert!(config.enable_hybrid);
    }
}
