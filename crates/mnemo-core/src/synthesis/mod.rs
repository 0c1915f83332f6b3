//! Multi-backend recall synthesis.
//!
//! Each enabled backend answers the same query independently; the engine
//! merges their raw scores into one ranked result set using the selected
//! [`Algorithm`]. Backends that fail or time out are skipped and reported.

pub mod sources;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::backends::RecordStore;
use crate::config::SynthesisConfig;
use crate::error::{Error, Result};

pub use sources::{
    AttentionSource, GraphSource, RecallSource, SourceHit, StructuredSource, VectorSource,
};

/// A recall backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Vector,
    Graph,
    Structured,
    Attention,
}

impl Backend {
    /// Hierarchical query order
    pub const PRIORITY: [Backend; 4] = [
        Backend::Vector,
        Backend::Graph,
        Backend::Structured,
        Backend::Attention,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Vector => "vector",
            Backend::Graph => "graph",
            Backend::Structured => "structured",
            Backend::Attention => "attention",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "vector" => Ok(Backend::Vector),
            "graph" => Ok(Backend::Graph),
            "structured" | "sql" => Ok(Backend::Structured),
            "attention" | "working" => Ok(Backend::Attention),
            other => Err(Error::invalid_input(format!("unknown backend: {other}"))),
        }
    }
}

/// How per-backend results are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Every id from any backend, summed raw scores
    Union,
    /// Only ids every responding backend found, summed raw scores
    Intersection,
    /// Every id, weighted sum
    #[default]
    Weighted,
    /// Backends in priority order until `max_results` candidates are found
    Hierarchical,
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "union" => Ok(Algorithm::Union),
            "intersection" => Ok(Algorithm::Intersection),
            "weighted" => Ok(Algorithm::Weighted),
            "hierarchical" => Ok(Algorithm::Hierarchical),
            other => Err(Error::invalid_input(format!("unknown algorithm: {other}"))),
        }
    }
}

/// One value per backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendScores {
    pub vector: f64,
    pub graph: f64,
    pub structured: f64,
    pub attention: f64,
}

impl BackendScores {
    pub fn get(&self, backend: Backend) -> f64 {
        match backend {
            Backend::Vector => self.vector,
            Backend::Graph => self.graph,
            Backend::Structured => self.structured,
            Backend::Attention => self.attention,
        }
    }

    pub fn set(&mut self, backend: Backend, value: f64) {
        match backend {
            Backend::Vector => self.vector = value,
            Backend::Graph => self.graph = value,
            Backend::Structured => self.structured = value,
            Backend::Attention => self.attention = value,
        }
    }

    pub fn sum(&self) -> f64 {
        self.vector + self.graph + self.structured + self.attention
    }

    /// Σ score × weight
    pub fn weighted(&self, weights: &BackendScores) -> f64 {
        Backend::PRIORITY
            .iter()
            .map(|b| self.get(*b) * weights.get(*b))
            .sum()
    }
}

/// Which backends produced a result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundBy {
    pub vector: bool,
    pub graph: bool,
    pub structured: bool,
    pub attention: bool,
}

impl FoundBy {
    pub fn get(&self, backend: Backend) -> bool {
        match backend {
            Backend::Vector => self.vector,
            Backend::Graph => self.graph,
            Backend::Structured => self.structured,
            Backend::Attention => self.attention,
        }
    }

    pub fn set(&mut self, backend: Backend) {
        match backend {
            Backend::Vector => self.vector = true,
            Backend::Graph => self.graph = true,
            Backend::Structured => self.structured = true,
            Backend::Attention => self.attention = true,
        }
    }

    pub fn count(&self) -> usize {
        Backend::PRIORITY.iter().filter(|b| self.get(**b)).count()
    }
}

/// Hits per backend after threshold filtering.
///
/// A zero count means the backend answered with nothing, failed, or was never
/// queried; see [`SynthesisResultSet::failed_backends`] and
/// [`SynthesisResultSet::skipped_backends`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HitCounts {
    pub vector: usize,
    pub graph: usize,
    pub structured: usize,
    pub attention: usize,
}

impl HitCounts {
    pub fn get(&self, backend: Backend) -> usize {
        match backend {
            Backend::Vector => self.vector,
            Backend::Graph => self.graph,
            Backend::Structured => self.structured,
            Backend::Attention => self.attention,
        }
    }

    fn set(&mut self, backend: Backend, value: usize) {
        match backend {
            Backend::Vector => self.vector = value,
            Backend::Graph => self.graph = value,
            Backend::Structured => self.structured = value,
            Backend::Attention => self.attention = value,
        }
    }
}

/// Recall parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RecallOptions {
    pub backends: Vec<Backend>,
    pub weights: BackendScores,
    /// Raw backend scores below this are dropped
    pub similarity_threshold: f64,
    pub max_results: usize,
    pub algorithm: Algorithm,
    pub backend_timeout: Duration,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self::comprehensive()
    }
}

impl RecallOptions {
    /// Every backend, weighted
    pub fn comprehensive() -> Self {
        Self {
            backends: Backend::PRIORITY.to_vec(),
            weights: BackendScores {
                vector: 0.3,
                graph: 0.3,
                structured: 0.3,
                attention: 0.1,
            },
            similarity_threshold: 0.3,
            max_results: 20,
            algorithm: Algorithm::Weighted,
            backend_timeout: Duration::from_secs(2),
        }
    }

    /// Meaning over structure: vectors plus working memory
    pub fn semantic() -> Self {
        Self {
            backends: vec![Backend::Vector, Backend::Attention],
            weights: BackendScores {
                vector: 0.8,
                attention: 0.2,
                ..BackendScores::default()
            },
            algorithm: Algorithm::Union,
            ..Self::comprehensive()
        }
    }

    /// Graph first, structured to fill
    pub fn relationships() -> Self {
        Self {
            backends: vec![Backend::Graph, Backend::Structured],
            weights: BackendScores {
                graph: 0.7,
                structured: 0.3,
                ..BackendScores::default()
            },
            algorithm: Algorithm::Hierarchical,
            ..Self::comprehensive()
        }
    }

    /// Cheap backends only
    pub fn fast() -> Self {
        Self {
            backends: vec![Backend::Structured, Backend::Attention],
            weights: BackendScores {
                structured: 0.5,
                attention: 0.5,
                ..BackendScores::default()
            },
            max_results: 10,
            algorithm: Algorithm::Union,
            ..Self::comprehensive()
        }
    }

    /// Look up a preset by name
    pub fn preset(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "comprehensive" => Ok(Self::comprehensive()),
            "semantic" => Ok(Self::semantic()),
            "relationships" => Ok(Self::relationships()),
            "fast" => Ok(Self::fast()),
            other => Err(Error::invalid_input(format!("unknown recall preset: {other}"))),
        }
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_backends(mut self, backends: Vec<Backend>) -> Self {
        self.backends = backends;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    fn enables(&self, backend: Backend) -> bool {
        self.backends.contains(&backend)
    }

    /// Per-source request size; sources over-fetch so merging has room
    fn source_limit(&self) -> usize {
        self.max_results.saturating_mul(2).max(1)
    }
}

/// One merged recall result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisResult {
    pub record_id: String,
    pub content: String,
    /// Combined score under the chosen algorithm
    pub score: f64,
    pub scores: BackendScores,
    pub found_by: FoundBy,
    pub timestamp: DateTime<Utc>,
    pub importance: f64,
}

/// Ranked recall results with per-backend diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SynthesisResultSet {
    pub results: Vec<SynthesisResult>,
    pub hit_counts: HitCounts,
    pub failed_backends: Vec<Backend>,
    /// Enabled backends not queried because hierarchical recall was already full
    pub skipped_backends: Vec<Backend>,
}

impl SynthesisResultSet {
    pub fn ids(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.record_id.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[derive(Debug, Default)]
struct Candidate {
    scores: BackendScores,
    found_by: FoundBy,
    content: Option<String>,
}

/// Candidate table keyed by record id, in first-seen order
#[derive(Debug, Default)]
struct Candidates {
    order: Vec<String>,
    entries: HashMap<String, Candidate>,
}

impl Candidates {
    fn len(&self) -> usize {
        self.order.len()
    }

    fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    fn record(&mut self, backend: Backend, hit: SourceHit) {
        let entry = self.entries.entry(hit.record_id.clone()).or_insert_with(|| {
            self.order.push(hit.record_id.clone());
            Candidate::default()
        });
        entry.scores.set(backend, hit.score);
        entry.found_by.set(backend);
        if entry.content.is_none() {
            entry.content = hit.content;
        }
    }
}

/// Multi-backend recall engine
pub struct SynthesisEngine {
    records: Arc<dyn RecordStore>,
    sources: Vec<Arc<dyn RecallSource>>,
    config: SynthesisConfig,
}

impl SynthesisEngine {
    pub fn new(records: Arc<dyn RecordStore>, config: SynthesisConfig) -> Self {
        Self {
            records,
            sources: Vec::new(),
            config,
        }
    }

    /// Register a source; a later source for the same backend replaces the earlier one
    pub fn with_source(mut self, source: Arc<dyn RecallSource>) -> Self {
        self.sources.retain(|s| s.backend() != source.backend());
        self.sources.push(source);
        self
    }

    /// Preset options with the configured backend timeout
    pub fn options(&self, preset: &str) -> Result<RecallOptions> {
        Ok(RecallOptions::preset(preset)?
            .with_backend_timeout(Duration::from_millis(self.config.backend_timeout_ms)))
    }

    fn enabled_sources(&self, options: &RecallOptions) -> Vec<Arc<dyn RecallSource>> {
        let mut enabled: Vec<Arc<dyn RecallSource>> = self
            .sources
            .iter()
            .filter(|s| options.enables(s.backend()))
            .cloned()
            .collect();
        enabled.sort_by_key(|s| s.backend());
        enabled
    }

    /// Synthesized recall for `query`
    pub async fn recall(
        &self,
        owner_id: &str,
        query: &str,
        options: &RecallOptions,
    ) -> Result<SynthesisResultSet> {
        if owner_id.trim().is_empty() {
            return Err(Error::invalid_input("owner_id is required"));
        }
        if query.trim().is_empty() {
            return Err(Error::not_found("query", "empty"));
        }

        let sources = self.enabled_sources(options);
        if sources.is_empty() {
            return Err(Error::invalid_input("no recall backends enabled"));
        }

        let mut set = SynthesisResultSet::default();
        let mut candidates = Candidates::default();

        if options.algorithm == Algorithm::Hierarchical {
            for source in &sources {
                let backend = source.backend();
                if candidates.len() >= options.max_results {
                    set.skipped_backends.push(backend);
                    continue;
                }
                let hits = match query_source(source.as_ref(), owner_id, query, options).await {
                    Ok(hits) => filter_hits(hits, options.similarity_threshold),
                    Err(e) => {
                        tracing::warn!(backend = %backend, error = %e, "recall backend skipped");
                        set.failed_backends.push(backend);
                        continue;
                    }
                };
                set.hit_counts.set(backend, hits.len());
                for hit in hits {
                    if candidates.contains(&hit.record_id) || candidates.len() < options.max_results {
                        candidates.record(backend, hit);
                    }
                }
            }
        } else {
            let responses = self.query_concurrently(&sources, owner_id, query, options).await;
            for source in &sources {
                let backend = source.backend();
                match responses.get(&backend) {
                    Some(Ok(hits)) => {
                        let hits = filter_hits(hits.clone(), options.similarity_threshold);
                        set.hit_counts.set(backend, hits.len());
                        for hit in hits {
                            candidates.record(backend, hit);
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(backend = %backend, error = %e, "recall backend skipped");
                        set.failed_backends.push(backend);
                    }
                    None => {
                        tracing::warn!(backend = %backend, "recall backend task aborted");
                        set.failed_backends.push(backend);
                    }
                }
            }
        }

        let responding: Vec<Backend> = sources
            .iter()
            .map(|s| s.backend())
            .filter(|b| !set.failed_backends.contains(b))
            .collect();

        let mut results = Vec::new();
        for id in candidates.order {
            let Some(candidate) = candidates.entries.remove(&id) else {
                continue;
            };
            let score = match options.algorithm {
                Algorithm::Intersection => {
                    if !responding.iter().all(|b| candidate.found_by.get(*b)) {
                        continue;
                    }
                    candidate.scores.sum()
                }
                Algorithm::Weighted => candidate.scores.weighted(&options.weights),
                Algorithm::Union | Algorithm::Hierarchical => candidate.scores.sum(),
            };
            if let Some(result) = self.hydrate(owner_id, id, candidate, score).await? {
                results.push(result);
            }
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });
        results.truncate(options.max_results);
        set.results = results;

        tracing::debug!(
            owner = %owner_id,
            algorithm = ?options.algorithm,
            results = set.results.len(),
            failed = set.failed_backends.len(),
            "recall synthesized"
        );
        Ok(set)
    }

    async fn query_concurrently(
        &self,
        sources: &[Arc<dyn RecallSource>],
        owner_id: &str,
        query: &str,
        options: &RecallOptions,
    ) -> HashMap<Backend, Result<Vec<SourceHit>>> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for source in sources {
            let source = Arc::clone(source);
            let semaphore = Arc::clone(&semaphore);
            let owner_id = owner_id.to_string();
            let query = query.to_string();
            let options = options.clone();

            tasks.spawn(async move {
                let backend = source.backend();
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => query_source(source.as_ref(), &owner_id, &query, &options).await,
                    Err(_) => Err(Error::backend(backend.as_str(), "recall semaphore closed")),
                };
                (backend, outcome)
            });
        }

        let mut responses = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((backend, outcome)) => {
                    responses.insert(backend, outcome);
                }
                Err(e) => tracing::warn!(error = %e, "recall task failed"),
            }
        }
        responses
    }

    async fn hydrate(
        &self,
        owner_id: &str,
        record_id: String,
        candidate: Candidate,
        score: f64,
    ) -> Result<Option<SynthesisResult>> {
        let Some(record) = self.records.get(&record_id).await? else {
            tracing::debug!(record_id = %record_id, "recall hit has no record");
            return Ok(None);
        };
        if record.owner_id != owner_id || record.archived {
            return Ok(None);
        }

        Ok(Some(SynthesisResult {
            content: candidate.content.unwrap_or(record.content),
            record_id,
            score,
            scores: candidate.scores,
            found_by: candidate.found_by,
            timestamp: record.created_at,
            importance: record.importance,
        }))
    }

    /// Records related to an existing record, excluding the record itself
    pub async fn recall_related(
        &self,
        owner_id: &str,
        record_id: &str,
        options: &RecallOptions,
    ) -> Result<SynthesisResultSet> {
        let record = self
            .records
            .get(record_id)
            .await?
            .filter(|r| r.owner_id == owner_id)
            .ok_or_else(|| Error::not_found("memory_record", record_id))?;

        let widened = options.clone().with_max_results(options.max_results.saturating_add(1));
        let mut set = self.recall(owner_id, &record.content, &widened).await?;
        set.results.retain(|r| r.record_id != record_id);
        set.results.truncate(options.max_results);
        Ok(set)
    }

    /// Everything every backend knows about `topic`
    pub async fn what_do_i_know(&self, owner_id: &str, topic: &str) -> Result<SynthesisResultSet> {
        let options = self.options("comprehensive")?;
        self.recall(owner_id, topic, &options).await
    }
}

async fn query_source(
    source: &dyn RecallSource,
    owner_id: &str,
    query: &str,
    options: &RecallOptions,
) -> Result<Vec<SourceHit>> {
    let timeout = options.backend_timeout;
    tokio::time::timeout(timeout, source.recall(owner_id, query, options.source_limit()))
        .await
        .map_err(|_| Error::timeout(timeout.as_millis() as u64))?
}

/// Drop sub-threshold hits and keep the best score per id
fn filter_hits(hits: Vec<SourceHit>, threshold: f64) -> Vec<SourceHit> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut best: Vec<SourceHit> = Vec::new();
    for hit in hits.into_iter().filter(|h| h.score >= threshold) {
        if seen.insert(hit.record_id.clone()) {
            best.push(hit);
        } else if let Some(existing) = best.iter_mut().find(|b| b.record_id == hit.record_id) {
            if hit.score > existing.score {
                *existing = hit;
            }
        }
    }
    best
}
