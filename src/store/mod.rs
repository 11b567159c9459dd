//! Local document store: cosine vector index plus optional BM25.

pub mod bm25;
pub mod local;
pub mod vector;
