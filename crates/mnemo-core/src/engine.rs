//! Engine facade.
//!
//! Wires the SQLite backends, attention cache, archival pipeline,
//! convergence detector, and synthesis engine together. Archival and
//! automatic memory formation are serialized per owner; recall runs
//! concurrently.

use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::backends::{
    AttentionCache, AttentionEntry, Embedder, GraphBackend, HashingEmbedder, RecordStore,
    SqliteStore, SqliteVectorStore, SummaryTier,
};
use crate::config::EngineConfig;
use crate::convergence::{analyze_conversation, AutoMemoryOutcome, ConvergenceDetector, ConvergenceStats};
use crate::db::{Database, RecordCounts};
use crate::error::{Error, Result};
use crate::lifecycle::{ArchivalPipeline, ArchiveReport, AtRiskRecord};
use crate::synthesis::{
    AttentionSource, GraphSource, RecallOptions, StructuredSource, SynthesisEngine,
    SynthesisResultSet, VectorSource,
};
use crate::types::{Digest, MemoryRecord, NewMemoryRecord};

/// Snapshot of one owner's memory
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub total: usize,
    pub archived: usize,
    pub keep_forever: usize,
    pub curated: usize,
    pub pattern_outliers: usize,
    pub digests: usize,
    pub working_memory: usize,
    pub convergence: ConvergenceStats,
}

impl EngineStats {
    fn new(counts: RecordCounts, working_memory: usize, convergence: ConvergenceStats) -> Self {
        Self {
            total: counts.total,
            archived: counts.archived,
            keep_forever: counts.keep_forever,
            curated: counts.curated,
            pattern_outliers: counts.pattern_outliers,
            digests: counts.digests,
            working_memory,
            convergence,
        }
    }

    pub fn hot(&self) -> usize {
        self.total - self.archived
    }
}

/// Long-term memory engine over one SQLite database
pub struct MemoryEngine {
    db: Arc<Database>,
    store: Arc<SqliteStore>,
    attention: Arc<AttentionCache>,
    archival: ArchivalPipeline,
    convergence: ConvergenceDetector,
    synthesis: SynthesisEngine,
    config: EngineConfig,
    owner_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl MemoryEngine {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        Self::with_database(Arc::new(Database::open(path)?), config)
    }

    /// Private in-memory engine
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Self::with_database(Arc::new(Database::open_in_memory()?), config)
    }

    /// Engine over an existing database with the hashing embedder
    pub fn with_database(db: Arc<Database>, config: EngineConfig) -> Result<Self> {
        Self::with_embedder(db, config, Arc::new(HashingEmbedder::default()))
    }

    pub fn with_embedder(
        db: Arc<Database>,
        config: EngineConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(SqliteStore::new(db.clone()));
        let vectors = Arc::new(SqliteVectorStore::new(db.clone(), embedder));
        let attention = Arc::new(AttentionCache::new(config.attention.clone()));

        let archival = ArchivalPipeline::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            &config,
        );
        let convergence =
            ConvergenceDetector::new(store.clone(), store.clone(), config.convergence.clone())
                .with_vectors(vectors.clone());
        let synthesis = SynthesisEngine::new(store.clone(), config.synthesis.clone())
            .with_source(Arc::new(VectorSource::new(vectors)))
            .with_source(Arc::new(GraphSource::new(
                store.clone(),
                store.clone(),
                store.clone(),
                config.synthesis.graph_seed_count,
                config.synthesis.graph_max_depth,
            )))
            .with_source(Arc::new(StructuredSource::new(store.clone(), store.clone())))
            .with_source(Arc::new(AttentionSource::new(attention.clone())));

        Ok(Self {
            db,
            store,
            attention,
            archival,
            convergence,
            synthesis,
            config,
            owner_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    fn owner_lock(&self, owner_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self.owner_locks.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(locks.entry(owner_id.to_string()).or_default().clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Formation
    // ─────────────────────────────────────────────────────────────────────────

    /// Explicitly remember something
    pub async fn remember(&self, record: NewMemoryRecord) -> Result<MemoryRecord> {
        let record = self.store.create(record).await?;
        self.convergence.record_conscious(&record).await?;
        self.attention.attend(&record.owner_id, &record.id, &record.content)?;
        tracing::info!(
            record_id = %record.id,
            owner = %record.owner_id,
            importance = record.importance,
            "memory formed"
        );
        Ok(record)
    }

    /// Analyze one exchange and form or strengthen automatic memories
    pub async fn observe(
        &self,
        owner_id: &str,
        user_input: &str,
        ci_response: &str,
    ) -> Result<Vec<AutoMemoryOutcome>> {
        if owner_id.trim().is_empty() {
            return Err(Error::invalid_input("owner_id is required"));
        }
        let lock = self.owner_lock(owner_id)?;
        let _guard = lock.lock().await;

        let mut outcomes = Vec::new();
        for candidate in analyze_conversation(user_input, ci_response) {
            let content = candidate.content.clone();
            let outcome = self
                .convergence
                .store_automatic_memory(owner_id, candidate)
                .await?;
            self.attention.attend(owner_id, outcome.record_id(), &content)?;
            outcomes.push(outcome);
        }

        tracing::debug!(owner = %owner_id, formed = outcomes.len(), "conversation observed");
        Ok(outcomes)
    }

    /// Relate two records of the same owner
    pub async fn link(
        &self,
        from_id: &str,
        to_id: &str,
        relation: &str,
        strength: f64,
    ) -> Result<()> {
        let from = self.require_record(from_id).await?;
        let to = self.require_record(to_id).await?;
        if from.owner_id != to.owner_id {
            return Err(Error::invalid_input("cannot link records of different owners"));
        }
        if !(0.0..=1.0).contains(&strength) {
            return Err(Error::invalid_input("strength must be between 0 and 1"));
        }
        self.store.link(from_id, to_id, relation, strength).await
    }

    async fn require_record(&self, id: &str) -> Result<MemoryRecord> {
        RecordStore::get(self.store.as_ref(), id)
            .await?
            .ok_or_else(|| Error::not_found("memory_record", id))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one archival pass for an owner
    pub async fn archive(&self, owner_id: &str, max_age_days: f64) -> Result<ArchiveReport> {
        let lock = self.owner_lock(owner_id)?;
        let _guard = lock.lock().await;
        self.archival.archive(owner_id, max_age_days).await
    }

    /// Records the next archival pass would take
    pub async fn at_risk(&self, owner_id: &str, max_age_days: f64) -> Result<Vec<AtRiskRecord>> {
        self.archival.at_risk(owner_id, max_age_days).await
    }

    pub async fn digests(&self, owner_id: &str) -> Result<Vec<Digest>> {
        self.store.list_digests(owner_id).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Recall
    // ─────────────────────────────────────────────────────────────────────────

    /// Named recall preset with the configured backend timeout
    pub fn recall_options(&self, preset: &str) -> Result<RecallOptions> {
        self.synthesis.options(preset)
    }

    /// Synthesized recall; returned records count as accessed
    pub async fn recall(
        &self,
        owner_id: &str,
        query: &str,
        options: &RecallOptions,
    ) -> Result<SynthesisResultSet> {
        let set = self.synthesis.recall(owner_id, query, options).await?;
        self.touch_results(&set).await;
        Ok(set)
    }

    pub async fn related(
        &self,
        owner_id: &str,
        record_id: &str,
        options: &RecallOptions,
    ) -> Result<SynthesisResultSet> {
        let set = self.synthesis.recall_related(owner_id, record_id, options).await?;
        self.touch_results(&set).await;
        Ok(set)
    }

    pub async fn what_do_i_know(&self, owner_id: &str, topic: &str) -> Result<SynthesisResultSet> {
        let set = self.synthesis.what_do_i_know(owner_id, topic).await?;
        self.touch_results(&set).await;
        Ok(set)
    }

    async fn touch_results(&self, set: &SynthesisResultSet) {
        for result in &set.results {
            if let Err(e) = self.store.touch(&result.record_id).await {
                tracing::warn!(record_id = %result.record_id, error = %e, "access not recorded");
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Introspection
    // ─────────────────────────────────────────────────────────────────────────

    pub fn working_memory(&self, owner_id: &str) -> Result<Vec<AttentionEntry>> {
        self.attention.snapshot(owner_id)
    }

    pub fn stats(&self, owner_id: &str) -> Result<EngineStats> {
        let counts = self.db.record_counts(owner_id)?;
        let working_memory = self.attention.snapshot(owner_id)?.len();
        Ok(EngineStats::new(counts, working_memory, self.convergence.stats()))
    }
}
