//! Memory record types shared by the lifecycle and recall components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Discrete importance levels used by automatic analysis
pub mod importance {
    pub const TRIVIAL: f64 = 0.0;
    pub const LOW: f64 = 0.25;
    pub const MEDIUM: f64 = 0.5;
    pub const HIGH: f64 = 0.75;
    pub const CRITICAL: f64 = 1.0;
}

/// Kind of memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    #[default]
    Experience,
    Knowledge,
    Reflection,
    Pattern,
    Goal,
    Decision,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Experience => "experience",
            MemoryType::Knowledge => "knowledge",
            MemoryType::Reflection => "reflection",
            MemoryType::Pattern => "pattern",
            MemoryType::Goal => "goal",
            MemoryType::Decision => "decision",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "experience" => Ok(MemoryType::Experience),
            "knowledge" => Ok(MemoryType::Knowledge),
            "reflection" => Ok(MemoryType::Reflection),
            "pattern" => Ok(MemoryType::Pattern),
            "goal" => Ok(MemoryType::Goal),
            "decision" => Ok(MemoryType::Decision),
            other => Err(Error::invalid_input(format!("unknown memory type: {other}"))),
        }
    }
}

/// Emotion label attached to a record.
///
/// Labels outside the three weighted kinds are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EmotionKind {
    Surprise,
    Fear,
    Satisfaction,
    Other(String),
}

impl EmotionKind {
    pub fn as_str(&self) -> &str {
        match self {
            EmotionKind::Surprise => "surprise",
            EmotionKind::Fear => "fear",
            EmotionKind::Satisfaction => "satisfaction",
            EmotionKind::Other(label) => label,
        }
    }
}

impl From<String> for EmotionKind {
    fn from(label: String) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "surprise" => EmotionKind::Surprise,
            "fear" => EmotionKind::Fear,
            "satisfaction" => EmotionKind::Satisfaction,
            _ => EmotionKind::Other(label),
        }
    }
}

impl From<&str> for EmotionKind {
    fn from(label: &str) -> Self {
        EmotionKind::from(label.to_string())
    }
}

impl From<EmotionKind> for String {
    fn from(kind: EmotionKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A stored memory record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub owner_id: String,
    pub session_id: Option<String>,
    pub memory_type: MemoryType,
    pub content: String,
    /// Base importance, 0..=1
    pub importance: f64,
    /// Emotional intensity, 0..=1
    pub emotion_intensity: f64,
    pub emotion: Option<EmotionKind>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: Option<DateTime<Utc>>,
    pub access_count: u32,

    // Voluntary flags (mutually exclusive)
    pub keep_forever: bool,
    pub okay_to_forget: bool,

    // Curation flags
    pub personal: bool,
    pub do_not_archive: bool,

    pub graph_centrality: f64,
    pub pattern_id: Option<String>,
    pub pattern_frequency: u32,
    pub is_pattern_outlier: bool,

    pub archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
}

impl MemoryRecord {
    /// Age in fractional days at `now`
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        days_between(self.created_at, now)
    }

    /// Fractional days since the last access, if the record was ever accessed
    pub fn days_since_access(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_accessed.map(|at| days_between(at, now))
    }

    /// Personal-collection or do-not-archive
    pub fn is_curated(&self) -> bool {
        self.personal || self.do_not_archive
    }

    /// First `max_chars` characters, with an ellipsis when truncated
    pub fn preview(&self, max_chars: usize) -> String {
        if self.content.chars().count() <= max_chars {
            return self.content.clone();
        }
        let head: String = self.content.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds().max(0) as f64 / 86_400.0
}

/// Data for ingesting a new record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMemoryRecord {
    pub owner_id: String,
    pub session_id: Option<String>,
    pub memory_type: MemoryType,
    pub content: String,
    pub importance: f64,
    pub emotion_intensity: f64,
    pub emotion: Option<EmotionKind>,
    pub keep_forever: bool,
    pub okay_to_forget: bool,
    pub personal: bool,
    pub do_not_archive: bool,
    /// Backdated creation time for imports; `None` means now
    pub created_at: Option<DateTime<Utc>>,
}

impl NewMemoryRecord {
    pub fn new(owner_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            content: content.into(),
            importance: importance::MEDIUM,
            ..Default::default()
        }
    }

    pub fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = memory_type;
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_emotion(mut self, emotion: impl Into<EmotionKind>, intensity: f64) -> Self {
        self.emotion = Some(emotion.into());
        self.emotion_intensity = intensity;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn keep_forever(mut self) -> Self {
        self.keep_forever = true;
        self
    }

    pub fn okay_to_forget(mut self) -> Self {
        self.okay_to_forget = true;
        self
    }

    pub fn personal(mut self) -> Self {
        self.personal = true;
        self
    }

    pub fn do_not_archive(mut self) -> Self {
        self.do_not_archive = true;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Reject records that would violate stored-record invariants
    pub fn validate(&self) -> Result<()> {
        if self.owner_id.trim().is_empty() {
            return Err(Error::invalid_input("owner_id is required"));
        }
        if self.content.trim().is_empty() {
            return Err(Error::invalid_input("content is required"));
        }
        if !(0.0..=1.0).contains(&self.importance) {
            return Err(Error::invalid_input("importance must be between 0 and 1"));
        }
        if !(0.0..=1.0).contains(&self.emotion_intensity) {
            return Err(Error::invalid_input(
                "emotion_intensity must be between 0 and 1",
            ));
        }
        if self.keep_forever && self.okay_to_forget {
            return Err(Error::invalid_input(
                "keep_forever and okay_to_forget are mutually exclusive",
            ));
        }
        Ok(())
    }
}

/// Filter for record store queries
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub owner_id: String,
    /// `Some(false)` selects the hot tier only
    pub archived: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub memory_type: Option<MemoryType>,
    pub limit: Option<usize>,
}

impl RecordQuery {
    /// Every unarchived record for an owner
    pub fn hot(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            archived: Some(false),
            ..Default::default()
        }
    }
}

/// Pattern fields written back after detection
#[derive(Debug, Clone, PartialEq)]
pub struct PatternAssignment {
    pub pattern_id: String,
    pub frequency: u32,
    pub is_outlier: bool,
}

/// Partial metadata update through the relational index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataUpdate {
    pub importance: Option<f64>,
    pub access_count: Option<u32>,
    pub centrality: Option<f64>,
}

/// Summary period granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    #[default]
    Weekly,
    Monthly,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Weekly => "weekly",
            PeriodType::Monthly => "monthly",
        }
    }
}

impl FromStr for PeriodType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "weekly" => Ok(PeriodType::Weekly),
            "monthly" => Ok(PeriodType::Monthly),
            other => Err(Error::invalid_input(format!("unknown period type: {other}"))),
        }
    }
}

/// Digest to be written to the summary tier
#[derive(Debug, Clone, PartialEq)]
pub struct NewDigest {
    pub owner_id: String,
    pub period_type: PeriodType,
    /// ISO week identifier, e.g. `2025-W07`
    pub period_id: String,
    pub source_record_count: usize,
    pub summary: String,
    pub themes: Vec<String>,
    pub keywords: Vec<String>,
    pub questions_asked: usize,
    /// Same key means same digest; stores are idempotent on it
    pub idempotency_key: String,
}

/// A stored digest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Digest {
    pub id: String,
    pub owner_id: String,
    pub period_type: PeriodType,
    pub period_id: String,
    pub source_record_count: usize,
    pub summary: String,
    pub themes: Vec<String>,
    pub keywords: Vec<String>,
    pub questions_asked: usize,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_memory_type_round_trip_names() {
        for t in [
            MemoryType::Experience,
            MemoryType::Knowledge,
            MemoryType::Reflection,
            MemoryType::Pattern,
            MemoryType::Goal,
            MemoryType::Decision,
        ] {
            assert_eq!(t.as_str().parse::<MemoryType>().unwrap(), t);
        }
        assert!("feeling".parse::<MemoryType>().is_err());
    }

    #[test]
    fn test_emotion_labels() {
        assert_eq!(EmotionKind::from("Surprise"), EmotionKind::Surprise);
        assert_eq!(
            EmotionKind::from("joy"),
            EmotionKind::Other("joy".to_string())
        );
        assert_eq!(String::from(EmotionKind::Fear), "fear");
    }

    #[test]
    fn test_validate_rejects_conflicting_consent() {
        let record = NewMemoryRecord::new("ci-1", "remember this")
            .keep_forever()
            .okay_to_forget();
        let err = record.validate().unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_validate_required_fields() {
        assert!(NewMemoryRecord::new("", "content").validate().is_err());
        assert!(NewMemoryRecord::new("ci-1", "  ").validate().is_err());
        assert!(
            NewMemoryRecord::new("ci-1", "content")
                .with_importance(1.2)
                .validate()
                .is_err()
        );
        assert!(NewMemoryRecord::new("ci-1", "content").validate().is_ok());
    }

    #[test]
    fn test_age_and_preview() {
        let now = Utc::now();
        let record = MemoryRecord {
            id: "r1".into(),
            owner_id: "ci-1".into(),
            session_id: None,
            memory_type: MemoryType::Experience,
            content: "x".repeat(120),
            importance: 0.5,
            emotion_intensity: 0.0,
            emotion: None,
            created_at: now - Duration::days(3),
            last_accessed: None,
            access_count: 0,
            keep_forever: false,
            okay_to_forget: false,
            personal: false,
            do_not_archive: false,
            graph_centrality: 0.0,
            pattern_id: None,
            pattern_frequency: 0,
            is_pattern_outlier: false,
            archived: false,
            archived_at: None,
        };

        assert!((record.age_days(now) - 3.0).abs() < 1e-9);
        assert_eq!(record.days_since_access(now), None);

        let preview = record.preview(100);
        assert_eq!(preview.len(), 103);
        assert!(preview.ends_with("..."));
    }
}
