pub mod cross_encoder;
pub mod embeddings;
pub mod generate;
pub mod judge;
pub mod query_expand;
