use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::{MetadataFilter, Passage};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    passage: Passage,
    embedding: Vec<f32>,
}

/// In-memory passage vectors with optional JSON persistence and cosine
/// similarity search.
pub struct VectorIndex {
    entries: RwLock<Vec<VectorEntry>>,
    persist_path: Option<PathBuf>,
}

impl VectorIndex {
    /// Index that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            persist_path: None,
        }
    }

    /// Load `vectors.json` from `vector_dir`, or start empty.
    pub fn open_or_create(vector_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(vector_dir)
            .with_context(|| format!("Failed to create {}", vector_dir.display()))?;
        let persist_path = vector_dir.join("vectors.json");

        let entries = if persist_path.exists() {
            let data = std::fs::read_to_string(&persist_path)
                .context("Failed to read vector index")?;
            serde_json::from_str(&data).context("Vector index is corrupt")?
        } else {
            Vec::new()
        };

        Ok(Self {
            entries: RwLock::new(entries),
            persist_path: Some(persist_path),
        })
    }

    /// Add passages with their embeddings. The two slices must be parallel.
    pub fn add(&self, passages: &[Passage], embeddings: Vec<Vec<f32>>) -> Result<()> {
        if passages.len() != embeddings.len() {
            anyhow::bail!(
                "Got {} embeddings for {} passages",
                embeddings.len(),
                passages.len()
            );
        }

        let mut entries = self.entries.write();
        entries.extend(
            passages
                .iter()
                .cloned()
                .zip(embeddings)
                .map(|(passage, embedding)| VectorEntry { passage, embedding }),
        );
        self.persist(&entries)
    }

    /// Atomic write via temp file + rename.
    fn persist(&self, entries: &[VectorEntry]) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let data = serde_json::to_string(entries)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data).context("Failed to write vector index")?;
        std::fs::rename(&tmp_path, path).context("Failed to replace vector index")?;
        Ok(())
    }

    /// Top `limit` passages by cosine similarity to `query_embedding`,
    /// restricted to those matching `filter`.
    pub fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Vec<(Passage, f32)> {
        let entries = self.entries.read();

        let mut scored: Vec<(f32, &VectorEntry)> = entries
            .iter()
            .filter(|e| filter.map_or(true, |f| f.matches(&e.passage.metadata)))
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), e))
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(score, e)| (e.passage.clone(), score))
            .collect()
    }

    /// Passages whose content contains `query`, ignoring case, in insertion
    /// order.
    pub fn substring_search(&self, query: &str, limit: usize) -> Vec<Passage> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.entries
            .read()
            .iter()
            .filter(|e| e.passage.content.to_lowercase().contains(&needle))
            .take(limit)
            .map(|e| e.passage.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
