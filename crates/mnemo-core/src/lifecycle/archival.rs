//! Hot-tier to digest archival.
//!
//! One pass scores every unarchived record for an owner, lets centrality
//! rescue well-connected records, keeps pattern outliers, and folds the
//! remainder into one weekly digest per ISO week before flagging them
//! archived.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use sha2::{Digest as _, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::centrality::CentralityCalculator;
use super::patterns::{PatternDetector, PatternSummary};
use super::scorer::{Decision, PreservationScorer, PreserveReason};
use crate::backends::{GraphBackend, RecordStore, RelationalIndex, SummaryTier};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::keywords;
use crate::types::{MemoryRecord, MetadataUpdate, NewDigest, PeriodType, RecordQuery};

const PREVIEW_CHARS: usize = 100;
const DIGEST_THEMES: usize = 3;
const DIGEST_KEYWORDS: usize = 10;

/// Result of one archival pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveReport {
    /// Records flagged archived by this pass
    pub archived: usize,
    /// Unarchived records examined
    pub evaluated: usize,
    pub digest_ids: Vec<String>,
    /// Pattern outliers kept in the hot tier
    pub preserved_outliers: Vec<String>,
    /// Candidates rescued by their centrality
    pub preserved_by_centrality: Vec<String>,
    pub patterns: Vec<PatternSummary>,
    /// False when the centrality stage was skipped after a failure
    pub centrality_applied: bool,
}

/// A record the next pass would archive
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AtRiskRecord {
    pub record_id: String,
    pub preview: String,
    pub score: f64,
    pub age_days: f64,
}

/// Archival pipeline over the storage traits
pub struct ArchivalPipeline {
    records: Arc<dyn RecordStore>,
    index: Arc<dyn RelationalIndex>,
    graph: Arc<dyn GraphBackend>,
    summaries: Arc<dyn SummaryTier>,
    scorer: PreservationScorer,
    patterns: PatternDetector,
    centrality: CentralityCalculator,
}

impl ArchivalPipeline {
    pub fn new(
        records: Arc<dyn RecordStore>,
        index: Arc<dyn RelationalIndex>,
        graph: Arc<dyn GraphBackend>,
        summaries: Arc<dyn SummaryTier>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            records,
            index,
            graph,
            summaries,
            scorer: PreservationScorer::new(config.scoring.clone()),
            patterns: PatternDetector::new(config.patterns.clone()),
            centrality: CentralityCalculator::new(config.centrality.clone()),
        }
    }

    pub fn scorer(&self) -> &PreservationScorer {
        &self.scorer
    }

    /// Run one archival pass for `owner_id`.
    ///
    /// Records younger than `max_age_days` are kept unless they carry
    /// `okay_to_forget`.
    pub async fn archive(&self, owner_id: &str, max_age_days: f64) -> Result<ArchiveReport> {
        validate_request(owner_id, max_age_days)?;
        let now = Utc::now();
        let hot = self.records.query(&RecordQuery::hot(owner_id)).await?;

        let mut report = ArchiveReport {
            evaluated: hot.len(),
            ..ArchiveReport::default()
        };

        // Stage 1: score
        let mut consented = Vec::new();
        let mut candidates = Vec::new();
        for record in hot {
            match self.scorer.evaluate(&record, now, max_age_days) {
                Decision::Archive { .. } if record.okay_to_forget => consented.push(record),
                Decision::Archive { score } => {
                    tracing::debug!(record_id = %record.id, score, "archive candidate");
                    candidates.push(record);
                }
                Decision::Preserve(PreserveReason::ConflictingConsent) => {
                    tracing::warn!(
                        record_id = %record.id,
                        owner = %owner_id,
                        "record has both keep_forever and okay_to_forget; preserving"
                    );
                }
                decision => {
                    tracing::debug!(record_id = %record.id, ?decision, "record preserved");
                }
            }
        }

        // Stage 2: centrality
        if !candidates.is_empty() {
            self.apply_centrality(&mut candidates, now, &mut report).await?;
        }

        // Stage 3: patterns
        let patterns = self.patterns.detect_patterns(&mut candidates);
        for pattern in &patterns {
            for member in &pattern.members {
                self.records
                    .update_pattern(member, &pattern.assignment_for(member))
                    .await?;
            }
            report.preserved_outliers.extend(pattern.outliers.iter().cloned());
        }
        report.patterns = patterns;

        let mut archivable = PatternDetector::filter_pattern_outliers(candidates);
        archivable.extend(consented);

        // Stages 4 and 5: digest per week, then flag
        for (week, members) in group_by_week(archivable) {
            let digest = build_digest(owner_id, &week, &members);
            let ids = sorted_ids(&members);
            let digest_id = self.summaries.store_digest(&digest, &ids).await?;

            match self.index.mark_archived(&ids).await {
                Ok(changed) => report.archived += changed,
                Err(e) => {
                    tracing::error!(
                        digest_id = %digest_id,
                        owner = %owner_id,
                        week = %week,
                        error = %e,
                        "digest stored but records not flagged archived"
                    );
                    return Err(Error::consistency_risk(digest_id, e.to_string()));
                }
            }
            report.digest_ids.push(digest_id);
        }

        tracing::info!(
            owner = %owner_id,
            evaluated = report.evaluated,
            archived = report.archived,
            digests = report.digest_ids.len(),
            outliers = report.preserved_outliers.len(),
            "archival pass complete"
        );
        Ok(report)
    }

    async fn apply_centrality(
        &self,
        candidates: &mut Vec<MemoryRecord>,
        now: DateTime<Utc>,
        report: &mut ArchiveReport,
    ) -> Result<()> {
        let ids: Vec<String> = candidates.iter().map(|r| r.id.clone()).collect();
        let explicit_edges = match self.graph.edges_within(&ids).await {
            Ok(edges) => edges,
            Err(e) => {
                tracing::warn!(error = %e, "graph edges unavailable; using keyword edges only");
                Vec::new()
            }
        };

        let previous: Vec<f64> = candidates.iter().map(|r| r.graph_centrality).collect();
        let centrality = match self.centrality.calculate(candidates, &explicit_edges) {
            Ok(centrality) => centrality,
            Err(e) => {
                tracing::warn!(error = %e, "centrality skipped");
                return Ok(());
            }
        };

        let mut persisted = true;
        for record in candidates.iter().filter(|r| centrality.changed.contains(&r.id)) {
            let update = MetadataUpdate {
                centrality: Some(record.graph_centrality),
                ..MetadataUpdate::default()
            };
            if let Err(e) = self.index.update_metadata(&record.id, &update).await {
                tracing::warn!(
                    record_id = %record.id,
                    error = %e,
                    "centrality not persisted; continuing without centrality"
                );
                persisted = false;
                break;
            }
        }
        if !persisted {
            for (record, value) in candidates.iter_mut().zip(previous) {
                record.graph_centrality = value;
            }
            return Ok(());
        }
        report.centrality_applied = true;

        let threshold = self.scorer.config().archive_threshold;
        candidates.retain(|record| {
            let score = self.scorer.score(record, now);
            if score >= threshold {
                tracing::debug!(record_id = %record.id, score, "preserved by centrality");
                report.preserved_by_centrality.push(record.id.clone());
                false
            } else {
                true
            }
        });
        Ok(())
    }

    /// Dry run of the scoring stage, lowest score first
    pub async fn at_risk(&self, owner_id: &str, max_age_days: f64) -> Result<Vec<AtRiskRecord>> {
        validate_request(owner_id, max_age_days)?;
        let now = Utc::now();
        let hot = self.records.query(&RecordQuery::hot(owner_id)).await?;

        let mut at_risk: Vec<AtRiskRecord> = hot
            .iter()
            .filter_map(|record| match self.scorer.evaluate(record, now, max_age_days) {
                Decision::Archive { score } => Some(AtRiskRecord {
                    record_id: record.id.clone(),
                    preview: record.preview(PREVIEW_CHARS),
                    score,
                    age_days: record.age_days(now),
                }),
                _ => None,
            })
            .collect();

        at_risk.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(at_risk)
    }
}

fn validate_request(owner_id: &str, max_age_days: f64) -> Result<()> {
    if owner_id.trim().is_empty() {
        return Err(Error::invalid_input("owner_id is required"));
    }
    if !max_age_days.is_finite() || max_age_days < 0.0 {
        return Err(Error::invalid_input(format!(
            "max_age_days must be a non-negative number, got {max_age_days}"
        )));
    }
    Ok(())
}

/// ISO week identifier such as `2025-W07`
pub fn iso_week_id(at: DateTime<Utc>) -> String {
    let week = at.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// `sha256(owner | week | sorted ids)` as hex
pub fn idempotency_key(owner_id: &str, period_id: &str, sorted_ids: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(owner_id.as_bytes());
    hasher.update(b"|");
    hasher.update(period_id.as_bytes());
    hasher.update(b"|");
    hasher.update(sorted_ids.join(",").as_bytes());
    hex::encode(hasher.finalize())
}

fn group_by_week(records: Vec<MemoryRecord>) -> BTreeMap<String, Vec<MemoryRecord>> {
    let mut weeks: BTreeMap<String, Vec<MemoryRecord>> = BTreeMap::new();
    for record in records {
        weeks.entry(iso_week_id(record.created_at)).or_default().push(record);
    }
    weeks
}

fn sorted_ids(records: &[MemoryRecord]) -> Vec<String> {
    let mut ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
    ids.sort();
    ids
}

fn build_digest(owner_id: &str, week: &str, members: &[MemoryRecord]) -> NewDigest {
    let contents = || members.iter().map(|r| r.content.as_str());
    let questions_asked = members.iter().filter(|r| r.content.contains('?')).count();
    let themes = keywords::top_keywords(contents(), keywords::MIN_KEYWORD_LENGTH, DIGEST_THEMES);
    let digest_keywords =
        keywords::top_keywords(contents(), keywords::MIN_KEYWORD_LENGTH, DIGEST_KEYWORDS);

    let mut summary = format!(
        "Weekly digest for {week}: {} interactions archived",
        members.len()
    );
    if questions_asked > 0 {
        summary.push_str(&format!(". Questions asked: {questions_asked}"));
    }
    if !themes.is_empty() {
        summary.push_str(&format!(". Themes: {}", themes.join(", ")));
    }

    NewDigest {
        owner_id: owner_id.to_string(),
        period_type: PeriodType::Weekly,
        period_id: week.to_string(),
        source_record_count: members.len(),
        summary,
        themes,
        keywords: digest_keywords,
        questions_asked,
        idempotency_key: idempotency_key(owner_id, week, &sorted_ids(members)),
    }
}
