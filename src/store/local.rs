use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::error::RetrievalError;
use crate::models::{MetadataFilter, Passage};
use crate::store::bm25::Bm25Index;
use crate::store::vector::VectorIndex;
use crate::traits::{DocumentStore, Embedder};

/// Passages embedded per request during ingestion.
const EMBED_BATCH_SIZE: usize = 32;

/// Document store backed by the local vector index and, optionally, a BM25
/// index. Without BM25, keyword search reports `Unsupported` and callers use
/// the substring fallback.
pub struct LocalDocumentStore {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<VectorIndex>,
    bm25: Option<Arc<Bm25Index>>,
}

impl LocalDocumentStore {
    pub fn new(embedder: Arc<dyn Embedder>, vectors: VectorIndex, bm25: Option<Bm25Index>) -> Self {
        Self {
            embedder,
            vectors: Arc::new(vectors),
            bm25: bm25.map(Arc::new),
        }
    }

    /// Open the persisted indexes under `config.data_dir`.
    pub fn open(embedder: Arc<dyn Embedder>, config: &Config) -> Result<Self> {
        let vectors = VectorIndex::open_or_create(&config.vector_dir())?;
        let bm25 = Bm25Index::open_or_create(&config.index_dir())?;
        Ok(Self::new(embedder, vectors, Some(bm25)))
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn has_keyword_index(&self) -> bool {
        self.bm25.is_some()
    }

    /// Embed and index `passages`. Returns the number added.
    pub async fn ingest(&self, passages: Vec<Passage>) -> Result<usize> {
        let passages: Vec<Passage> = passages
            .into_iter()
            .filter(|p| !p.content.trim().is_empty())
            .collect();
        if passages.is_empty() {
            return Ok(0);
        }

        for batch in passages.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|p| p.content.clone()).collect();
            let embeddings = self
                .embedder
                .embed(&texts)
                .await
                .context("Failed to embed passages")?;
            self.vectors.add(batch, embeddings)?;
        }

        if let Some(bm25) = &self.bm25 {
            let bm25 = bm25.clone();
            let batch = passages.clone();
            tokio::task::spawn_blocking(move || bm25.index_passages(&batch))
                .await
                .context("BM25 indexing task failed")??;
        }

        tracing::info!("Ingested {} passages", passages.len());
        Ok(passages.len())
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn similarity_search_with_score(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(Passage, f32)>, RetrievalError> {
        let embedding = self.embedder.embed_one(query).await?;
        Ok(self.vectors.search(&embedding, k, filter))
    }

    async fn keyword_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<(Passage, f32)>, RetrievalError> {
        let Some(bm25) = &self.bm25 else {
            return Err(RetrievalError::Unsupported(
                "keyword search (no BM25 index)".to_string(),
            ));
        };

        let bm25 = bm25.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || bm25.search(&query, k))
            .await
            .map_err(|e| RetrievalError::Store(format!("BM25 search task failed: {e}")))?
            .map_err(|e| RetrievalError::Store(format!("BM25 search error: {e:#}")))
    }

    async fn substring_search(&self, query: &str, k: usize) -> Result<Vec<Passage>, RetrievalError> {
        Ok(self.vectors.substring_search(query, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Two-dimensional "embedding": does the text mention refunds, shipping?
    struct TopicEmbedder;

    #[async_trait]
    impl Embedder for TopicEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        if t.contains("refund") { 1.0 } else { 0.0 },
                        if t.contains("ship") { 1.0 } else { 0.1 },
                    ]
                })
                .collect())
        }
    }

    fn corpus() -> Vec<Passage> {
        vec![
            Passage::new("Refunds are issued within 30 days.").with_id("refund"),
            Passage::new("We ship worldwide in 5 days.").with_id("ship"),
            Passage::new("   ").with_id("blank"),
        ]
    }

    #[tokio::test]
    async fn test_ingest_skips_blank_passages() {
        let store = LocalDocumentStore::new(Arc::new(TopicEmbedder), VectorIndex::in_memory(), None);
        assert_eq!(store.ingest(corpus()).await.unwrap(), 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_similarity_search_uses_embedder() {
        let store = LocalDocumentStore::new(Arc::new(TopicEmbedder), VectorIndex::in_memory(), None);
        store.ingest(corpus()).await.unwrap();

        let hits = store.similarity_search("refund policy", 1, None).await.unwrap();
        assert_eq!(hits[0].id.as_deref(), Some("refund"));
        assert!(hits[0].metadata.similarity_score.unwrap() > 0.9);
    }

    #[tokio::test]
    async fn test_keyword_search_without_index_is_unsupported() {
        let store = LocalDocumentStore::new(Arc::new(TopicEmbedder), VectorIndex::in_memory(), None);
        store.ingest(corpus()).await.unwrap();

        let err = store.keyword_search("refunds", 5).await.unwrap_err();
        assert!(err.is_unsupported());
        let hits = store.substring_search("ship worldwide", 5).await.unwrap();
        assert_eq!(hits[0].id.as_deref(), Some("ship"));
    }

    #[tokio::test]
    async fn test_keyword_search_with_bm25() {
        let store = LocalDocumentStore::new(
            Arc::new(TopicEmbedder),
            VectorIndex::in_memory(),
            Some(Bm25Index::in_memory()),
        );
        store.ingest(corpus()).await.unwrap();

        let hits = store.keyword_search("worldwide", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id.as_deref(), Some("ship"));
    }

    #[tokio::test]
    async fn test_open_persists_under_data_dir() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        {
            let store = LocalDocumentStore::open(Arc::new(TopicEmbedder), &config).unwrap();
            store.ingest(corpus()).await.unwrap();
        }
        let store = LocalDocumentStore::open(Arc::new(TopicEmbedder), &config).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.has_keyword_index());
        assert_eq!(store.keyword_search("issued", 5).await.unwrap().len(), 1);
    }
}
