//! Error types shared by the retrieval stages and collaborator adapters.
//!
//! Collaborators report failures as [`RetrievalError`]. The pipeline never
//! hands these to its caller: each stage turns them into a [`StageFailure`]
//! and degrades instead.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by document stores, generators, scorers and embedders.
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    /// The collaborator does not implement this capability
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    /// Document store unreachable or query failed
    #[error("Document store error: {0}")]
    Store(String),
    /// Text generation failed
    #[error("Generation failed: {0}")]
    Generation(String),
    /// Relevance scoring failed
    #[error("Scoring failed: {0}")]
    Scoring(String),
    /// Embedding the query or passages failed
    #[error("Embedding failed: {0}")]
    Embedding(String),
    /// A call exceeded its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: String,
        after: Duration,
    },
    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// A stage panicked
    #[error("Stage panicked: {0}")]
    Panicked(String),
}

impl RetrievalError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

/// Pipeline stage names, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Direct,
    Hybrid,
    Hyde,
    MultiQuery,
    Fusion,
    Rerank,
    /// The orchestrator itself, for failures no single stage owns
    Pipeline,
    Fallback,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Direct => "direct",
            Stage::Hybrid => "hybrid",
            Stage::Hyde => "hyde",
            Stage::MultiQuery => "multi_query",
            Stage::Fusion => "fusion",
            Stage::Rerank => "rerank",
            Stage::Pipeline => "pipeline",
            Stage::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// A failure attributed to one stage of a retrieval run.
#[derive(Debug, Clone, Error)]
#[error("{stage} stage failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    pub error: RetrievalError,
}

impl StageFailure {
    pub fn new(stage: Stage, error: RetrievalError) -> Self {
        Self { stage, error }
    }
}

/// Outcome of a single retrieval stage.
pub type StageResult<T> = Result<T, StageFailure>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failure_display_names_stage() {
        let failure = StageFailure::new(
            Stage::MultiQuery,
            RetrievalError::Generation("model offline".to_string()),
        );
        assert_eq!(
            failure.to_string(),
            "multi_query stage failed: Generation failed: model offline"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = RetrievalError::Timeout {
            operation: "generate".to_string(),
            after: Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "generate timed out after 2s");
    }

    #[test]
    fn test_is_unsupported() {
        assert!(RetrievalError::Unsupported("fts".into()).is_unsupported());
        assert!(!RetrievalError::Store("down".into()).is_unsupported());
    }
}
