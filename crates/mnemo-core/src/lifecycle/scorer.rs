//! Preservation scoring.
//!
//! Each hot-tier record gets a continuous "keep" score from five weighted
//! terms (recency of access, emotional salience, graph centrality,
//! pattern-outlier status, base importance) minus an age penalty. Consent
//! and curation flags override the score entirely.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ScoringConfig;
use crate::types::{EmotionKind, MemoryRecord};

/// Score returned for `keep_forever` records
pub const MAX_SCORE: f64 = f64::MAX;

/// Score returned for `okay_to_forget` records
pub const MIN_SCORE: f64 = f64::MIN;

/// Per-term contributions to a preservation score
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub recency: f64,
    pub emotion: f64,
    pub centrality: f64,
    pub outlier: f64,
    pub importance: f64,
    pub age_penalty: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.recency + self.emotion + self.centrality + self.outlier + self.importance
            - self.age_penalty
    }
}

/// Why a record survives an archival pass
#[derive(Debug, Clone, PartialEq)]
pub enum PreserveReason {
    Personal,
    DoNotArchive,
    KeepForever,
    /// Both voluntary flags set; never archived until someone fixes the record
    ConflictingConsent,
    /// Score at or above the archive threshold
    Score(f64),
}

/// Outcome of evaluating one record
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Preserve(PreserveReason),
    /// Below threshold but younger than the age cutoff
    TooYoung { score: f64 },
    Archive { score: f64 },
}

impl Decision {
    pub fn is_archive(&self) -> bool {
        matches!(self, Decision::Archive { .. })
    }
}

/// Multi-factor preservation scorer
#[derive(Debug, Clone, Default)]
pub struct PreservationScorer {
    config: ScoringConfig,
}

impl PreservationScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Preservation score at `now`.
    ///
    /// `okay_to_forget` is checked before `keep_forever`, so a record with
    /// both flags scores the minimum.
    pub fn score(&self, record: &MemoryRecord, now: DateTime<Utc>) -> f64 {
        if record.okay_to_forget {
            return MIN_SCORE;
        }
        if record.keep_forever {
            return MAX_SCORE;
        }
        self.breakdown(record, now).total()
    }

    /// Weighted terms without the consent overrides
    pub fn breakdown(&self, record: &MemoryRecord, now: DateTime<Utc>) -> ScoreBreakdown {
        let c = &self.config;

        let recency = match record.days_since_access(now) {
            Some(days) => {
                let window = (c.base_recency_window_days
                    + c.window_days_per_access * record.access_count as f64)
                    .min(c.max_recency_window_days);
                c.recency_weight * (1.0 - days / window).max(0.0)
            }
            None => 0.0,
        };

        let multiplier = match &record.emotion {
            Some(EmotionKind::Surprise) => c.surprise_multiplier,
            Some(EmotionKind::Fear) => c.fear_multiplier,
            Some(EmotionKind::Satisfaction) => c.satisfaction_multiplier,
            Some(EmotionKind::Other(_)) | None => 1.0,
        };
        let emotion = c.emotion_weight * (record.emotion_intensity.max(0.0) * multiplier).min(1.0);

        let centrality = c.centrality_weight * record.graph_centrality.clamp(0.0, 1.0);
        let outlier = if record.is_pattern_outlier {
            c.outlier_bonus
        } else {
            0.0
        };
        let importance = c.importance_weight * record.importance.clamp(0.0, 1.0);
        let age_penalty = (record.age_days(now) - c.age_grace_days).max(0.0) * c.age_penalty_per_day;

        ScoreBreakdown {
            recency,
            emotion,
            centrality,
            outlier,
            importance,
            age_penalty,
        }
    }

    /// Classify a record for an archival pass with the given age cutoff
    pub fn evaluate(&self, record: &MemoryRecord, now: DateTime<Utc>, max_age_days: f64) -> Decision {
        if record.personal {
            return Decision::Preserve(PreserveReason::Personal);
        }
        if record.do_not_archive {
            return Decision::Preserve(PreserveReason::DoNotArchive);
        }
        if record.keep_forever && record.okay_to_forget {
            return Decision::Preserve(PreserveReason::ConflictingConsent);
        }
        if record.okay_to_forget {
            return Decision::Archive { score: MIN_SCORE };
        }
        if record.keep_forever {
            return Decision::Preserve(PreserveReason::KeepForever);
        }

        let score = self.score(record, now);
        if score >= self.config.archive_threshold {
            return Decision::Preserve(PreserveReason::Score(score));
        }
        if record.age_days(now) < max_age_days {
            return Decision::TooYoung { score };
        }
        Decision::Archive { score }
    }

    /// Records whose decision is `Archive`
    pub fn filter_archivable(
        &self,
        records: Vec<MemoryRecord>,
        now: DateTime<Utc>,
        max_age_days: f64,
    ) -> Vec<MemoryRecord> {
        records
            .into_iter()
            .filter(|r| self.evaluate(r, now, max_age_days).is_archive())
            .collect()
    }
}
