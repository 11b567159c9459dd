use std::sync::Arc;

use crate::config::{Config, RerankerConfig};
use crate::llm::cross_encoder::CrossEncoderScorer;
use crate::llm::embeddings::HttpEmbedder;
use crate::llm::generate::HttpTextGenerator;
use crate::llm::judge::LlmJudgeScorer;
use crate::search::pipeline::RetrievalPipeline;
use crate::store::local::LocalDocumentStore;
use crate::traits::{RelevanceScorer, TextGenerator};

/// Process-wide handles, built once from [`Config`] and shared by `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub http_client: reqwest::Client,
    pub store: Arc<LocalDocumentStore>,
    pub generator: Arc<dyn TextGenerator>,
    pub scorer: Option<Arc<dyn RelevanceScorer>>,
    pub pipeline: Arc<RetrievalPipeline>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        let embedder = Arc::new(HttpEmbedder::new(http_client.clone(), config.llm.clone()));
        let store = Arc::new(LocalDocumentStore::open(embedder, &config)?);
        let generator: Arc<dyn TextGenerator> =
            Arc::new(HttpTextGenerator::new(http_client.clone(), config.llm.clone()));

        let scorer = if config.retrieval.enable_reranking {
            build_scorer(&http_client, &config.reranker, &generator, &config.llm.chat_model)
        } else {
            None
        };

        let pipeline = RetrievalPipeline::new(
            config.retrieval.clone(),
            store.clone(),
            generator.clone(),
            scorer.clone(),
        )?;

        Ok(Self {
            config,
            http_client,
            store,
            generator,
            scorer,
            pipeline: Arc::new(pipeline),
        })
    }
}

/// Relevance scorer for the configured provider. `None` (with a warning)
/// when the provider is unknown or not configured; reranking then passes
/// candidates through unchanged.
fn build_scorer(
    client: &reqwest::Client,
    config: &RerankerConfig,
    generator: &Arc<dyn TextGenerator>,
    chat_model: &str,
) -> Option<Arc<dyn RelevanceScorer>> {
    match config.provider.as_str() {
        "cross-encoder" => match CrossEncoderScorer::new(client.clone(), config) {
            Ok(scorer) => {
                tracing::info!("Reranking with cross-encoder {}", scorer.name());
                Some(Arc::new(scorer))
            }
            Err(e) => {
                tracing::warn!("Cross-encoder unavailable, reranking disabled: {e}");
                None
            }
        },
        "llm" => {
            let model = config.model.clone().unwrap_or_else(|| chat_model.to_string());
            tracing::info!("Reranking with LLM judge {model}");
            Some(Arc::new(LlmJudgeScorer::new(generator.clone(), model)))
        }
        "none" => None,
        other => {
            tracing::warn!("Unknown reranker provider {other:?}, reranking disabled");
            None
        }
    }
}
