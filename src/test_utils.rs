//! In-memory collaborators for unit tests.
//!
//! Only compiled when running tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::RetrievalError;
use crate::models::{MetadataFilter, Passage};
use crate::traits::{DocumentStore, RelevanceScorer, TextGenerator};

/// Passage with a stable id and filename derived from `id`.
pub fn passage(id: &str, content: &str) -> Passage {
    Passage::new(content)
        .with_id(id)
        .with_filename(format!("{id}.txt"))
}

pub fn ids(passages: &[Passage]) -> Vec<String> {
    passages
        .iter()
        .map(|p| p.id.clone().unwrap_or_else(|| p.content.clone()))
        .collect()
}

/// Scripted document store. Vector results are looked up by exact query
/// text, falling back to a default list.
pub struct MockStore {
    vector: HashMap<String, Vec<(Passage, f32)>>,
    default_vector: Vec<(Passage, f32)>,
    vector_errors: HashMap<String, RetrievalError>,
    fail_all_vector: Option<RetrievalError>,
    transient_vector_failures: AtomicUsize,
    delays: HashMap<String, Duration>,
    panic_on: Option<String>,
    keyword: Result<Vec<(Passage, f32)>, RetrievalError>,
    substring: Result<Vec<Passage>, RetrievalError>,
    pub vector_calls: Mutex<Vec<(String, usize)>>,
    pub keyword_calls: AtomicUsize,
    pub substring_calls: AtomicUsize,
}

impl Default for MockStore {
    fn default() -> Self {
        Self {
            vector: HashMap::new(),
            default_vector: Vec::new(),
            vector_errors: HashMap::new(),
            fail_all_vector: None,
            transient_vector_failures: AtomicUsize::new(0),
            delays: HashMap::new(),
            panic_on: None,
            keyword: Ok(Vec::new()),
            substring: Err(RetrievalError::Unsupported("substring search".to_string())),
            vector_calls: Mutex::new(Vec::new()),
            keyword_calls: AtomicUsize::new(0),
            substring_calls: AtomicUsize::new(0),
        }
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vector(mut self, query: &str, hits: Vec<(Passage, f32)>) -> Self {
        self.vector.insert(query.to_string(), hits);
        self
    }

    pub fn with_default_vector(mut self, hits: Vec<(Passage, f32)>) -> Self {
        self.default_vector = hits;
        self
    }

    pub fn with_vector_error(mut self, query: &str, err: RetrievalError) -> Self {
        self.vector_errors.insert(query.to_string(), err);
        self
    }

    pub fn failing_vector(mut self, err: RetrievalError) -> Self {
        self.fail_all_vector = Some(err);
        self
    }

    /// The next `n` vector searches fail, later ones succeed.
    pub fn with_transient_vector_failures(self, n: usize) -> Self {
        self.transient_vector_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_delay(mut self, query: &str, delay: Duration) -> Self {
        self.delays.insert(query.to_string(), delay);
        self
    }

    pub fn panicking_on(mut self, query: &str) -> Self {
        self.panic_on = Some(query.to_string());
        self
    }

    pub fn with_keyword(mut self, result: Result<Vec<(Passage, f32)>, RetrievalError>) -> Self {
        self.keyword = result;
        self
    }

    pub fn with_substring(mut self, result: Result<Vec<Passage>, RetrievalError>) -> Self {
        self.substring = result;
        self
    }

    pub fn vector_queries(&self) -> Vec<String> {
        self.vector_calls.lock().iter().map(|(q, _)| q.clone()).collect()
    }

    pub fn vector_call_count(&self) -> usize {
        self.vector_calls.lock().len()
    }
}

#[async_trait]
impl DocumentStore for MockStore {
    async fn similarity_search_with_score(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(Passage, f32)>, RetrievalError> {
        self.vector_calls.lock().push((query.to_string(), k));
        if let Some(delay) = self.delays.get(query) {
            tokio::time::sleep(*delay).await;
        }
        if self.panic_on.as_deref() == Some(query) {
            panic!("mock store panicked on {query:?}");
        }
        let transient = self
            .transient_vector_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if transient {
            return Err(RetrievalError::Store("transient failure".to_string()));
        }
        if let Some(err) = &self.fail_all_vector {
            return Err(err.clone());
        }
        if let Some(err) = self.vector_errors.get(query) {
            return Err(err.clone());
        }
        let hits = self.vector.get(query).unwrap_or(&self.default_vector);
        Ok(hits
            .iter()
            .filter(|(p, _)| filter.map_or(true, |f| f.matches(&p.metadata)))
            .take(k)
            .cloned()
            .collect())
    }

    async fn keyword_search(
        &self,
        _query: &str,
        k: usize,
    ) -> Result<Vec<(Passage, f32)>, RetrievalError> {
        self.keyword_calls.fetch_add(1, Ordering::SeqCst);
        self.keyword
            .clone()
            .map(|hits| hits.into_iter().take(k).collect())
    }

    async fn substring_search(
        &self,
        _query: &str,
        k: usize,
    ) -> Result<Vec<Passage>, RetrievalError> {
        self.substring_calls.fetch_add(1, Ordering::SeqCst);
        self.substring
            .clone()
            .map(|hits| hits.into_iter().take(k).collect())
    }
}

type GenerateFn = dyn Fn(&str, f32) -> Result<String, RetrievalError> + Send + Sync;

/// Generator driven by a closure; records every call's temperature.
pub struct ScriptedGenerator {
    respond: Box<GenerateFn>,
    pub temperatures: Mutex<Vec<f32>>,
}

impl ScriptedGenerator {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&str, f32) -> Result<String, RetrievalError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            temperatures: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self::new(|_, _| Err(RetrievalError::Generation("model offline".to_string())))
    }

    pub fn call_count(&self) -> usize {
        self.temperatures.lock().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, RetrievalError> {
        self.temperatures.lock().push(temperature);
        (self.respond)(prompt, temperature)
    }
}

type ScoreFn = dyn Fn(&str, &str) -> Result<f32, RetrievalError> + Send + Sync;

/// Scorer driven by a closure over (query, passage text).
pub struct ScriptedScorer {
    score: Box<ScoreFn>,
}

impl ScriptedScorer {
    pub fn new<F>(score: F) -> Self
    where
        F: Fn(&str, &str) -> Result<f32, RetrievalError> + Send + Sync + 'static,
    {
        Self {
            score: Box::new(score),
        }
    }

    /// Scores each passage by the number in its text (e.g. "doc 0.8" → 0.8).
    pub fn from_content() -> Self {
        Self::new(|_, text| {
            text.split_whitespace()
                .find_map(|tok| tok.parse::<f32>().ok())
                .ok_or_else(|| RetrievalError::Scoring(format!("no score in {text:?}")))
        })
    }
}

#[async_trait]
impl RelevanceScorer for ScriptedScorer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn score(&self, query: &str, passage_text: &str) -> Result<f32, RetrievalError> {
        (self.score)(query, passage_text)
    }
}
