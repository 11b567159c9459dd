use anyhow::{Context, Result};
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexWriter, ReloadPolicy};

use crate::models::Passage;

const WRITER_MEMORY_BYTES: usize = 50_000_000;

/// BM25 full-text index over passage content, built on tantivy.
///
/// The whole passage is stored as JSON next to the indexed text so hits come
/// back with their metadata intact.
pub struct Bm25Index {
    index: Index,
    f_content: Field,
    f_filename: Field,
    f_passage: Field,
}

struct Fields {
    schema: Schema,
    content: Field,
    filename: Field,
    passage: Field,
}

fn build_schema() -> Fields {
    let mut schema_builder = Schema::builder();
    let content = schema_builder.add_text_field("content", TEXT);
    let filename = schema_builder.add_text_field("filename", TEXT);
    let passage = schema_builder.add_text_field("passage", STORED);
    Fields {
        schema: schema_builder.build(),
        content,
        filename,
        passage,
    }
}

impl Bm25Index {
    /// Create or open a BM25 index at the given directory.
    pub fn open_or_create(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir)?;
        let fields = build_schema();

        let index = if index_dir.join("meta.json").exists() {
            Index::open_in_dir(index_dir).context("Failed to open existing tantivy index")?
        } else {
            Index::create_in_dir(index_dir, fields.schema.clone())
                .context("Failed to create tantivy index")?
        };

        Ok(Self::with_index(index, &fields))
    }

    pub fn in_memory() -> Self {
        let fields = build_schema();
        let index = Index::create_in_ram(fields.schema.clone());
        Self::with_index(index, &fields)
    }

    fn with_index(index: Index, fields: &Fields) -> Self {
        Self {
            index,
            f_content: fields.content,
            f_filename: fields.filename,
            f_passage: fields.passage,
        }
    }

    /// Index a batch of passages and commit.
    pub fn index_passages(&self, passages: &[Passage]) -> Result<()> {
        let mut writer: IndexWriter = self
            .index
            .writer(WRITER_MEMORY_BYTES)
            .context("Failed to create index writer")?;

        for passage in passages {
            let stored = serde_json::to_string(passage)?;
            writer.add_document(doc!(
                self.f_content => passage.content.clone(),
                self.f_filename => passage.metadata.filename.clone().unwrap_or_default(),
                self.f_passage => stored,
            ))?;
        }

        writer.commit().context("Failed to commit index")?;
        Ok(())
    }

    /// Search the index and return `(passage, bm25 score)` pairs, best first.
    ///
    /// Query syntax errors are tolerated: whatever part of the query parses
    /// is searched.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<(Passage, f32)>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .context("Failed to create reader")?;
        let searcher = reader.searcher();

        let query_parser =
            QueryParser::for_index(&self.index, vec![self.f_content, self.f_filename]);
        let (query, errors) = query_parser.parse_query_lenient(query_str);
        if !errors.is_empty() {
            tracing::debug!("Ignored {} query syntax errors in {query_str:?}", errors.len());
        }

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .context("Search failed")?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .context("Failed to retrieve document")?;

            let Some(stored) = doc.get_first(self.f_passage).and_then(|v| v.as_str()) else {
                continue;
            };
            match serde_json::from_str::<Passage>(stored) {
                Ok(passage) => hits.push((passage, score)),
                Err(e) => tracing::warn!("Skipping unreadable indexed passage: {e}"),
            }
        }

        Ok(hits)
    }
}
