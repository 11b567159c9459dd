pub mod fusion;
pub mod hybrid;
pub mod hyde;
pub mod multi_query;
pub mod pipeline;
pub mod rerank;
pub mod strategy;
pub mod threshold;
