//! Conscious / subconscious convergence.
//!
//! An automatically captured memory "converges" when independent
//! pathways already point at the same thing: recent full-text matches
//! (conscious, explicit) and graph hubs or semantic neighbours
//! (subconscious, implicit). Converged memories strengthen the existing
//! record instead of creating a duplicate.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backends::{RecordStore, RelationalIndex, SimilarityWindow, VectorBackend};
use crate::config::{ConvergenceConfig, ConvergenceRule};
use crate::error::{Error, Result};
use crate::types::{importance, MemoryRecord, MemoryType, MetadataUpdate, NewMemoryRecord};

const FTS_EVIDENCE: f64 = 0.3;
const EXPLICIT_MARKER_EVIDENCE: f64 = 0.4;
const GRAPH_HUB_EVIDENCE: f64 = 0.3;
const SEMANTIC_EVIDENCE: f64 = 0.3;

/// Tolerance for comparing summed evidence against the threshold
const SCORE_EPSILON: f64 = 1e-9;

const DECISION_KEYWORDS: &[&str] = &["decide", "chose", "will use", "going with", "selected"];
const QUESTION_KEYWORDS: &[&str] = &["?", "how", "what", "why", "when", "where", "who"];
const KNOWLEDGE_KEYWORDS: &[&str] = &["learned", "understand", "realize", "discovered", "found out"];

/// Evidence that both pathways agree on an existing record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergenceSignal {
    pub record_id: String,
    pub conscious_strength: f64,
    pub subconscious_strength: f64,
    pub combined_score: f64,
    /// A matching record is marked keep-forever
    pub explicit_marker: bool,
    /// A matching record is a graph hub
    pub graph_hub: bool,
    /// The vector backend found a close neighbour
    pub semantic_match: bool,
    /// The relational index found a full-text match
    pub fts_match: bool,
    pub detected_at: DateTime<Utc>,
}

/// A memory proposed by conversation analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutoMemoryCandidate {
    pub content: String,
    pub memory_type: MemoryType,
    pub decision_made: bool,
    pub question_asked: bool,
    pub knowledge_shared: bool,
    pub pattern_detected: bool,
    pub rationale: String,
    pub importance: f64,
}

impl AutoMemoryCandidate {
    /// Build a candidate from raw text, or `None` when nothing in it is memorable
    pub fn from_text(content: &str, memory_type: MemoryType) -> Option<Self> {
        let lowered = content.to_lowercase();
        let mut candidate = Self {
            content: content.to_string(),
            memory_type,
            decision_made: contains_any(&lowered, DECISION_KEYWORDS),
            question_asked: contains_any(&lowered, QUESTION_KEYWORDS),
            knowledge_shared: contains_any(&lowered, KNOWLEDGE_KEYWORDS),
            pattern_detected: false,
            rationale: String::new(),
            importance: importance::LOW,
        };
        candidate.rationale = candidate.describe_rationale();
        if candidate.rationale.is_empty() {
            return None;
        }
        candidate.importance = candidate.computed_importance();
        Some(candidate)
    }

    fn describe_rationale(&self) -> String {
        let mut reasons = Vec::new();
        if self.decision_made {
            reasons.push("Decision made");
        }
        if self.question_asked {
            reasons.push("Question asked");
        }
        if self.knowledge_shared {
            reasons.push("Knowledge shared");
        }
        if self.pattern_detected {
            reasons.push("Pattern detected");
        }
        reasons.join("; ")
    }

    /// `0.25 + 0.3·decision + 0.2·question + 0.3·knowledge + 0.2·pattern`, capped at 1
    pub fn computed_importance(&self) -> f64 {
        let mut value = importance::LOW;
        if self.decision_made {
            value += 0.3;
        }
        if self.question_asked {
            value += 0.2;
        }
        if self.knowledge_shared {
            value += 0.3;
        }
        if self.pattern_detected {
            value += 0.2;
        }
        value.min(importance::CRITICAL)
    }
}

fn contains_any(lowered: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| lowered.contains(needle))
}

/// Candidates worth remembering from one exchange.
///
/// The user turn is an experience; the CI turn is a reflection and only
/// counts when it records a decision or shares knowledge.
pub fn analyze_conversation(user_input: &str, ci_response: &str) -> Vec<AutoMemoryCandidate> {
    let mut candidates = Vec::new();
    if let Some(candidate) = AutoMemoryCandidate::from_text(user_input, MemoryType::Experience) {
        candidates.push(candidate);
    }
    if let Some(candidate) = AutoMemoryCandidate::from_text(ci_response, MemoryType::Reflection)
        .filter(|c| c.decision_made || c.knowledge_shared)
    {
        candidates.push(candidate);
    }
    candidates
}

/// What `store_automatic_memory` did with a candidate
#[derive(Debug, Clone, PartialEq)]
pub enum AutoMemoryOutcome {
    /// An existing record was boosted
    Strengthened {
        record_id: String,
        signal: ConvergenceSignal,
    },
    /// No convergence; a new record was created
    Created { record_id: String },
}

impl AutoMemoryOutcome {
    pub fn record_id(&self) -> &str {
        match self {
            AutoMemoryOutcome::Strengthened { record_id, .. }
            | AutoMemoryOutcome::Created { record_id } => record_id,
        }
    }

    pub fn converged(&self) -> bool {
        matches!(self, AutoMemoryOutcome::Strengthened { .. })
    }
}

/// Formation counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConvergenceStats {
    pub conscious_memories: u64,
    pub subconscious_memories: u64,
    pub convergences_detected: u64,
    pub memories_strengthened: u64,
    /// Strengthened memories per formed memory
    pub boost_ratio: f64,
}

#[derive(Debug, Default)]
struct Counters {
    conscious: AtomicU64,
    subconscious: AtomicU64,
    convergences: AtomicU64,
    strengthened: AtomicU64,
}

/// Convergence detector over the relational index and (optionally) vectors
pub struct ConvergenceDetector {
    records: Arc<dyn RecordStore>,
    index: Arc<dyn RelationalIndex>,
    vectors: Option<Arc<dyn VectorBackend>>,
    config: ConvergenceConfig,
    counters: Counters,
}

impl ConvergenceDetector {
    pub fn new(
        records: Arc<dyn RecordStore>,
        index: Arc<dyn RelationalIndex>,
        config: ConvergenceConfig,
    ) -> Self {
        Self {
            records,
            index,
            vectors: None,
            config,
            counters: Counters::default(),
        }
    }

    /// Enable the semantic channel
    pub fn with_vectors(mut self, vectors: Arc<dyn VectorBackend>) -> Self {
        self.vectors = Some(vectors);
        self
    }

    pub fn config(&self) -> &ConvergenceConfig {
        &self.config
    }

    /// Look for convergence on `candidate_text`; `None` means no convergence
    pub async fn detect(
        &self,
        owner_id: &str,
        candidate_text: &str,
    ) -> Result<Option<ConvergenceSignal>> {
        if owner_id.trim().is_empty() {
            return Err(Error::invalid_input("owner_id is required"));
        }
        if candidate_text.trim().is_empty() {
            return Ok(None);
        }

        let now = Utc::now();
        let mut conscious = 0.0;
        let mut subconscious = 0.0;
        let mut explicit_marker = false;
        let mut graph_hub = false;
        let mut semantic_match = false;

        // Channel 1: relational index
        let window = SimilarityWindow {
            since: Some(now - Duration::hours(self.config.window_hours)),
            importance_floor: self.config.importance_floor,
            ..SimilarityWindow::default()
        };
        let hits = self.index.find_similar(owner_id, candidate_text, &window).await?;
        let fts_match = !hits.is_empty();
        if fts_match {
            conscious += FTS_EVIDENCE;
        }

        let mut marked_record: Option<String> = None;
        for hit in &hits {
            let Some(record) = self.records.get(&hit.record_id).await? else {
                continue;
            };
            if record.keep_forever && !explicit_marker {
                explicit_marker = true;
                conscious += EXPLICIT_MARKER_EVIDENCE;
                marked_record = Some(record.id.clone());
            }
            if record.graph_centrality >= self.config.min_hub_centrality && !graph_hub {
                graph_hub = true;
                subconscious += GRAPH_HUB_EVIDENCE;
            }
        }

        // Channel 2: vectors
        let mut top_vector_match = None;
        if let Some(vectors) = &self.vectors {
            match vectors
                .nearest(owner_id, candidate_text, self.config.vector_k)
                .await
            {
                Ok(matches) => {
                    if matches
                        .iter()
                        .any(|m| m.similarity >= self.config.min_semantic_similarity)
                    {
                        semantic_match = true;
                        subconscious += SEMANTIC_EVIDENCE;
                    }
                    top_vector_match = matches.into_iter().next().map(|m| m.record_id);
                }
                Err(e) => {
                    tracing::warn!(owner = %owner_id, error = %e, "vector channel unavailable");
                }
            }
        }

        let combined = self.combine(conscious, subconscious);
        let evidenced = conscious > 0.0 || subconscious > 0.0;
        tracing::debug!(
            owner = %owner_id,
            conscious,
            subconscious,
            combined,
            "convergence evaluated"
        );
        if !evidenced || combined + SCORE_EPSILON < self.config.threshold {
            return Ok(None);
        }

        let Some(record_id) = marked_record
            .or_else(|| hits.first().map(|h| h.record_id.clone()))
            .or(top_vector_match)
        else {
            return Ok(None);
        };

        self.counters.convergences.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            owner = %owner_id,
            record_id = %record_id,
            combined,
            "convergence detected"
        );
        Ok(Some(ConvergenceSignal {
            record_id,
            conscious_strength: conscious,
            subconscious_strength: subconscious,
            combined_score: combined,
            explicit_marker,
            graph_hub,
            semantic_match,
            fts_match,
            detected_at: now,
        }))
    }

    fn combine(&self, conscious: f64, subconscious: f64) -> f64 {
        match self.config.rule {
            ConvergenceRule::Mean => (conscious + subconscious) / 2.0,
            ConvergenceRule::EvidencedOnly => {
                let channels: Vec<f64> = [conscious, subconscious]
                    .into_iter()
                    .filter(|s| *s > 0.0)
                    .collect();
                if channels.is_empty() {
                    0.0
                } else {
                    channels.iter().sum::<f64>() / channels.len() as f64
                }
            }
        }
    }

    /// Boost the signalled record's importance; returns the new importance
    pub async fn strengthen(&self, signal: &ConvergenceSignal) -> Result<f64> {
        let record = self
            .records
            .get(&signal.record_id)
            .await?
            .ok_or_else(|| Error::not_found("memory_record", &signal.record_id))?;

        let boosted = (record.importance + self.config.boost).min(importance::CRITICAL);
        let update = MetadataUpdate {
            importance: Some(boosted),
            ..MetadataUpdate::default()
        };
        self.index.update_metadata(&record.id, &update).await?;
        self.counters.strengthened.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            record_id = %record.id,
            from = record.importance,
            to = boosted,
            "memory strengthened"
        );
        Ok(boosted)
    }

    /// Strengthen a converging record, or create a new one for the candidate
    pub async fn store_automatic_memory(
        &self,
        owner_id: &str,
        candidate: AutoMemoryCandidate,
    ) -> Result<AutoMemoryOutcome> {
        if let Some(signal) = self.detect(owner_id, &candidate.content).await? {
            self.strengthen(&signal).await?;
            return Ok(AutoMemoryOutcome::Strengthened {
                record_id: signal.record_id.clone(),
                signal,
            });
        }

        let record = self
            .records
            .create(
                NewMemoryRecord::new(owner_id, candidate.content)
                    .with_type(candidate.memory_type)
                    .with_importance(candidate.importance),
            )
            .await?;
        self.register_vector(&record).await;
        self.counters.subconscious.fetch_add(1, Ordering::Relaxed);

        Ok(AutoMemoryOutcome::Created {
            record_id: record.id,
        })
    }

    /// Count an explicitly formed memory and make it semantically searchable
    pub async fn record_conscious(&self, record: &MemoryRecord) -> Result<()> {
        self.register_vector(record).await;
        self.counters.conscious.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn register_vector(&self, record: &MemoryRecord) {
        let Some(vectors) = &self.vectors else {
            return;
        };
        if let Err(e) = vectors
            .store(&record.owner_id, &record.id, &record.content)
            .await
        {
            tracing::warn!(record_id = %record.id, error = %e, "vector registration failed");
        }
    }

    pub fn stats(&self) -> ConvergenceStats {
        let conscious = self.counters.conscious.load(Ordering::Relaxed);
        let subconscious = self.counters.subconscious.load(Ordering::Relaxed);
        let strengthened = self.counters.strengthened.load(Ordering::Relaxed);
        let formed = conscious + subconscious;

        ConvergenceStats {
            conscious_memories: conscious,
            subconscious_memories: subconscious,
            convergences_detected: self.counters.convergences.load(Ordering::Relaxed),
            memories_strengthened: strengthened,
            boost_ratio: if formed == 0 {
                0.0
            } else {
                strengthened as f64 / formed as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{SqliteStore, SqliteVectorStore, VectorMatch};
    use crate::db::Database;
    use async_trait::async_trait;

    fn store() -> Arc<SqliteStore> {
        Arc::new(SqliteStore::new(Arc::new(Database::open_in_memory().unwrap())))
    }

    fn detector(store: &Arc<SqliteStore>, rule: ConvergenceRule) -> ConvergenceDetector {
        ConvergenceDetector::new(
            store.clone(),
            store.clone(),
            ConvergenceConfig {
                rule,
                ..ConvergenceConfig::default()
            },
        )
    }

    /// Vector backend returning one canned match
    struct CannedVectors(VectorMatch);

    #[async_trait]
    impl VectorBackend for CannedVectors {
        async fn store(&self, _owner_id: &str, _record_id: &str, _text: &str) -> Result<()> {
            Ok(())
        }

        async fn nearest(&self, _owner_id: &str, _text: &str, _k: usize) -> Result<Vec<VectorMatch>> {
            Ok(vec![self.0.clone()])
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Detection
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_exact_keep_forever_match_converges_when_only_evidence_counts() {
        let store = store();
        let marked = store
            .create(NewMemoryRecord::new("ci-1", "The deploy key lives in the vault").keep_forever())
            .await
            .unwrap();

        let detector = detector(&store, ConvergenceRule::EvidencedOnly);
        let signal = detector
            .detect("ci-1", "The deploy key lives in the vault")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(signal.record_id, marked.id);
        assert!(signal.fts_match && signal.explicit_marker);
        assert!(!signal.semantic_match && !signal.graph_hub);
        assert!(signal.conscious_strength >= 0.7 - 1e-9);
        assert_eq!(signal.subconscious_strength, 0.0);
        assert!((signal.combined_score - 0.7).abs() < 1e-9);
        assert_eq!(detector.stats().convergences_detected, 1);
    }

    #[tokio::test]
    async fn test_mean_rule_needs_both_channels() {
        let store = store();
        store
            .create(NewMemoryRecord::new("ci-1", "The deploy key lives in the vault").keep_forever())
            .await
            .unwrap();

        let detector = detector(&store, ConvergenceRule::Mean);
        let signal = detector
            .detect("ci-1", "The deploy key lives in the vault")
            .await
            .unwrap();
        assert!(signal.is_none());
        assert_eq!(detector.stats().convergences_detected, 0);
    }

    #[tokio::test]
    async fn test_both_channels_converge_under_mean() {
        let store = store();
        let record = store
            .create(NewMemoryRecord::new("ci-1", "Staging database password rotated").keep_forever())
            .await
            .unwrap();
        store
            .update_metadata(
                &record.id,
                &MetadataUpdate {
                    centrality: Some(0.8),
                    ..MetadataUpdate::default()
                },
            )
            .await
            .unwrap();

        let vectors = Arc::new(CannedVectors(VectorMatch {
            record_id: record.id.clone(),
            similarity: 0.9,
        }));
        // With default weights the mean tops out at 0.65.
        let detector = ConvergenceDetector::new(
            store.clone(),
            store.clone(),
            ConvergenceConfig {
                threshold: 0.6,
                ..ConvergenceConfig::default()
            },
        )
        .with_vectors(vectors);
        let signal = detector
            .detect("ci-1", "staging database password")
            .await
            .unwrap()
            .unwrap();

        assert!(signal.graph_hub && signal.semantic_match);
        assert!((signal.subconscious_strength - 0.6).abs() < 1e-9);
        assert!((signal.combined_score - 0.65).abs() < 1e-9);
        assert_eq!(signal.record_id, record.id);
    }

    #[tokio::test]
    async fn test_no_evidence_is_not_found() {
        let store = store();
        let detector = detector(&store, ConvergenceRule::EvidencedOnly);
        assert!(detector.detect("ci-1", "nothing stored yet").await.unwrap().is_none());
        assert!(detector.detect("ci-1", "   ").await.unwrap().is_none());
        assert!(detector.detect("", "text").await.unwrap_err().is_invalid_input());
    }

    #[tokio::test]
    async fn test_low_importance_hits_are_ignored() {
        let store = store();
        store
            .create(
                NewMemoryRecord::new("ci-1", "minor note about the vault")
                    .with_importance(0.2)
                    .keep_forever(),
            )
            .await
            .unwrap();

        let detector = detector(&store, ConvergenceRule::EvidencedOnly);
        assert!(detector.detect("ci-1", "vault").await.unwrap().is_none());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Formation
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_store_automatic_memory_strengthens_on_convergence() {
        let store = store();
        let marked = store
            .create(NewMemoryRecord::new("ci-1", "We will use Postgres for billing").keep_forever())
            .await
            .unwrap();
        let detector = detector(&store, ConvergenceRule::EvidencedOnly);

        let candidate =
            AutoMemoryCandidate::from_text("We will use Postgres for billing", MemoryType::Experience)
                .unwrap();
        let outcome = detector.store_automatic_memory("ci-1", candidate).await.unwrap();
        assert!(outcome.converged());
        assert_eq!(outcome.record_id(), marked.id);

        let boosted = RecordStore::get(store.as_ref(), &marked.id).await.unwrap().unwrap();
        assert!((boosted.importance - 0.7).abs() < 1e-9);
        assert_eq!(detector.stats().memories_strengthened, 1);
    }

    #[tokio::test]
    async fn test_store_automatic_memory_creates_on_miss() {
        let store = store();
        let vectors = Arc::new(SqliteVectorStore::with_hashing(store.database().clone()));
        let detector = detector(&store, ConvergenceRule::Mean).with_vectors(vectors.clone());

        let candidate =
            AutoMemoryCandidate::from_text("I learned the cache TTL is ten minutes", MemoryType::Experience)
                .unwrap();
        let outcome = detector.store_automatic_memory("ci-1", candidate).await.unwrap();
        let AutoMemoryOutcome::Created { record_id } = &outcome else {
            panic!("expected a new record, got {outcome:?}");
        };

        let created = RecordStore::get(store.as_ref(), record_id).await.unwrap().unwrap();
        assert!((created.importance - 0.55).abs() < 1e-9);
        let matches = vectors.nearest("ci-1", "cache TTL", 5).await.unwrap();
        assert_eq!(&matches[0].record_id, record_id);

        let stats = detector.stats();
        assert_eq!(stats.subconscious_memories, 1);
        assert_eq!(stats.boost_ratio, 0.0);
    }

    #[tokio::test]
    async fn test_strengthen_caps_and_reports_missing() {
        let store = store();
        let record = store
            .create(NewMemoryRecord::new("ci-1", "critical incident").with_importance(0.95))
            .await
            .unwrap();
        let detector = detector(&store, ConvergenceRule::Mean);

        let mut signal = ConvergenceSignal {
            record_id: record.id.clone(),
            conscious_strength: 0.7,
            subconscious_strength: 0.0,
            combined_score: 0.7,
            explicit_marker: true,
            graph_hub: false,
            semantic_match: false,
            fts_match: true,
            detected_at: Utc::now(),
        };
        assert_eq!(detector.strengthen(&signal).await.unwrap(), 1.0);

        signal.record_id = "missing".into();
        assert!(detector.strengthen(&signal).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_stats_boost_ratio() {
        let store = store();
        let detector = detector(&store, ConvergenceRule::EvidencedOnly);

        for content in ["first explicit", "second explicit"] {
            let record = store
                .create(NewMemoryRecord::new("ci-1", content).keep_forever())
                .await
                .unwrap();
            detector.record_conscious(&record).await.unwrap();
        }
        let candidate =
            AutoMemoryCandidate::from_text("we decide: first explicit", MemoryType::Experience).unwrap();
        detector.store_automatic_memory("ci-1", candidate).await.unwrap();

        let stats = detector.stats();
        assert_eq!(stats.conscious_memories, 2);
        assert_eq!(stats.memories_strengthened, 1);
        assert!((stats.boost_ratio - 0.5).abs() < 1e-9);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Conversation Analysis
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_analyze_conversation() {
        let candidates = analyze_conversation(
            "Why does the build fail on ARM?",
            "I discovered the linker flag was missing, so I chose to pin the toolchain.",
        );
        assert_eq!(candidates.len(), 2);

        let user = &candidates[0];
        assert_eq!(user.memory_type, MemoryType::Experience);
        assert!(user.question_asked && !user.decision_made);
        assert!((user.importance - 0.45).abs() < 1e-9);
        assert_eq!(user.rationale, "Question asked");

        let ci = &candidates[1];
        assert_eq!(ci.memory_type, MemoryType::Reflection);
        assert!(ci.decision_made && ci.knowledge_shared);
        assert!((ci.importance - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_analyze_conversation_skips_unremarkable_turns() {
        assert!(analyze_conversation("ok", "Sure, sounds good.").is_empty());

        // A CI question alone is not worth keeping.
        let candidates = analyze_conversation("thanks", "Anything else I can help with?");
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_importance_is_capped() {
        let candidate = AutoMemoryCandidate {
            content: "x".into(),
            memory_type: MemoryType::Experience,
            decision_made: true,
            question_asked: true,
            knowledge_shared: true,
            pattern_detected: true,
            rationale: String::new(),
            importance: 0.0,
        };
        assert_eq!(candidate.computed_importance(), 1.0);
    }
}
