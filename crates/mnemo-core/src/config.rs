//! Engine Configuration
//!
//! Tunables for the lifecycle scorer, pattern detection, centrality,
//! convergence, synthesis, and the attention cache. Every section has
//! defaults so a partial TOML table is enough.

use serde::{Deserialize, Serialize};

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Preservation scorer weights and windows
    pub scoring: ScoringConfig,

    /// Pattern detector thresholds
    pub patterns: PatternConfig,

    /// Graph-centrality calculator settings
    pub centrality: CentralityConfig,

    /// Convergence detector settings
    pub convergence: ConvergenceConfig,

    /// Synthesis engine settings
    pub synthesis: SynthesisConfig,

    /// Short-term attention cache settings
    pub attention: AttentionConfig,
}

/// Preservation scorer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Points for a just-accessed record (default: 30)
    pub recency_weight: f64,

    /// Points for maximal emotional salience (default: 25)
    pub emotion_weight: f64,

    /// Points for maximal graph centrality (default: 20)
    pub centrality_weight: f64,

    /// Flat bonus for pattern outliers (default: 15)
    pub outlier_bonus: f64,

    /// Points for maximal base importance (default: 10)
    pub importance_weight: f64,

    /// Recency window for a never-revisited record, in days (default: 7)
    pub base_recency_window_days: f64,

    /// Days added to the recency window per access (default: 2)
    pub window_days_per_access: f64,

    /// Upper bound on the recency window, in days (default: 21)
    pub max_recency_window_days: f64,

    /// Age after which the age penalty applies, in days (default: 14)
    pub age_grace_days: f64,

    /// Points subtracted per day beyond the grace period (default: 1)
    pub age_penalty_per_day: f64,

    /// Records scoring below this are archivable (default: 25)
    pub archive_threshold: f64,

    /// Emotion multiplier for surprise (default: 1.3)
    pub surprise_multiplier: f64,

    /// Emotion multiplier for fear (default: 1.5)
    pub fear_multiplier: f64,

    /// Emotion multiplier for satisfaction (default: 0.8)
    pub satisfaction_multiplier: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            recency_weight: 30.0,
            emotion_weight: 25.0,
            centrality_weight: 20.0,
            outlier_bonus: 15.0,
            importance_weight: 10.0,
            base_recency_window_days: 7.0,
            window_days_per_access: 2.0,
            max_recency_window_days: 21.0,
            age_grace_days: 14.0,
            age_penalty_per_day: 1.0,
            archive_threshold: 25.0,
            surprise_multiplier: 1.3,
            fear_multiplier: 1.5,
            satisfaction_multiplier: 0.8,
        }
    }
}

/// Pattern detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Minimum shared-keyword ratio to join a cluster (default: 0.4)
    pub similarity_threshold: f64,

    /// Minimum cluster size to count as a pattern (default: 3)
    pub min_pattern_size: usize,

    /// Keywords shorter than this are ignored (default: 4)
    pub min_keyword_length: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.4,
            min_pattern_size: 3,
            min_keyword_length: 4,
        }
    }
}

/// Graph-centrality calculator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CentralityConfig {
    /// Shared keywords required for an edge (default: 2)
    pub min_shared_keywords: usize,

    /// Lower bound on the degree normaliser (default: 1, i.e. max observed degree)
    pub normalization_floor: usize,

    /// Largest batch the calculator accepts (default: 5000)
    pub max_batch_size: usize,

    /// Keywords shorter than this are ignored (default: 4)
    pub min_keyword_length: usize,
}

impl Default for CentralityConfig {
    fn default() -> Self {
        Self {
            min_shared_keywords: 2,
            normalization_floor: 1,
            max_batch_size: 5000,
            min_keyword_length: 4,
        }
    }
}

/// How conscious and subconscious strengths combine into one score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceRule {
    /// Plain mean of both channels, even when one has no evidence
    #[default]
    Mean,
    /// Mean over channels that produced any evidence
    EvidencedOnly,
}

/// Convergence detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceConfig {
    /// Combined score required to declare convergence (default: 0.7)
    pub threshold: f64,

    /// Importance added to a strengthened record (default: 0.2)
    pub boost: f64,

    /// Look-back window for relational evidence, in hours (default: 24)
    pub window_hours: i64,

    /// Minimum importance of relational hits (default: 0.5)
    pub importance_floor: f64,

    /// Vector similarity counted as semantic evidence (default: 0.6)
    pub min_semantic_similarity: f64,

    /// Centrality counted as graph-hub evidence (default: 0.4)
    pub min_hub_centrality: f64,

    /// Nearest neighbours requested from the vector backend (default: 5)
    pub vector_k: usize,

    /// Strength combination rule (default: mean)
    pub rule: ConvergenceRule,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            boost: 0.2,
            window_hours: 24,
            importance_floor: 0.5,
            min_semantic_similarity: 0.6,
            min_hub_centrality: 0.4,
            vector_k: 5,
            rule: ConvergenceRule::Mean,
        }
    }
}

/// Synthesis engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Per-backend timeout in milliseconds (default: 2000)
    pub backend_timeout_ms: u64,

    /// Backends queried at once (default: 4)
    pub max_concurrency: usize,

    /// Graph traversal depth from each seed (default: 2)
    pub graph_max_depth: usize,

    /// Full-text hits used as graph traversal seeds (default: 5)
    pub graph_seed_count: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            backend_timeout_ms: 2000,
            max_concurrency: 4,
            graph_max_depth: 2,
            graph_seed_count: 5,
        }
    }
}

/// Attention cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttentionConfig {
    /// Entries held per owner (default: 7)
    pub capacity: usize,

    /// Multiplier applied to existing attention on every insert (default: 0.9)
    pub decay_factor: f64,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            capacity: 7,
            decay_factor: 0.9,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigValidationError> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| ConfigValidationError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set scoring configuration
    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    /// Set pattern configuration
    pub fn with_patterns(mut self, patterns: PatternConfig) -> Self {
        self.patterns = patterns;
        self
    }

    /// Set centrality configuration
    pub fn with_centrality(mut self, centrality: CentralityConfig) -> Self {
        self.centrality = centrality;
        self
    }

    /// Set convergence configuration
    pub fn with_convergence(mut self, convergence: ConvergenceConfig) -> Self {
        self.convergence = convergence;
        self
    }

    /// Set synthesis configuration
    pub fn with_synthesis(mut self, synthesis: SynthesisConfig) -> Self {
        self.synthesis = synthesis;
        self
    }

    /// Set attention configuration
    pub fn with_attention(mut self, attention: AttentionConfig) -> Self {
        self.attention = attention;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        fn unit(field: &str, value: f64) -> Result<(), ConfigValidationError> {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigValidationError::InvalidValue {
                    field: field.into(),
                    message: "must be between 0 and 1".into(),
                });
            }
            Ok(())
        }

        if self.scoring.max_recency_window_days < self.scoring.base_recency_window_days {
            return Err(ConfigValidationError::InvalidValue {
                field: "scoring.max_recency_window_days".into(),
                message: "must not be smaller than base_recency_window_days".into(),
            });
        }

        if self.scoring.base_recency_window_days <= 0.0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "scoring.base_recency_window_days".into(),
                message: "must be greater than 0".into(),
            });
        }

        unit("patterns.similarity_threshold", self.patterns.similarity_threshold)?;
        if self.patterns.min_pattern_size < 2 {
            return Err(ConfigValidationError::InvalidValue {
                field: "patterns.min_pattern_size".into(),
                message: "must be at least 2".into(),
            });
        }

        if self.centrality.normalization_floor == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "centrality.normalization_floor".into(),
                message: "must be greater than 0".into(),
            });
        }

        unit("convergence.threshold", self.convergence.threshold)?;
        unit("convergence.boost", self.convergence.boost)?;
        unit("convergence.importance_floor", self.convergence.importance_floor)?;
        unit(
            "convergence.min_semantic_similarity",
            self.convergence.min_semantic_similarity,
        )?;
        unit("convergence.min_hub_centrality", self.convergence.min_hub_centrality)?;

        if self.synthesis.max_concurrency == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "synthesis.max_concurrency".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.attention.capacity == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "attention.capacity".into(),
                message: "must be greater than 0".into(),
            });
        }
        unit("attention.decay_factor", self.attention.decay_factor)?;

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.scoring.archive_threshold, 25.0);
        assert_eq!(config.patterns.min_pattern_size, 3);
        assert_eq!(config.convergence.rule, ConvergenceRule::Mean);
        assert_eq!(config.attention.capacity, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            [convergence]
            threshold = 0.6
            rule = "evidenced_only"

            [synthesis]
            backend_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.convergence.threshold, 0.6);
        assert_eq!(config.convergence.rule, ConvergenceRule::EvidencedOnly);
        assert_eq!(config.convergence.boost, 0.2);
        assert_eq!(config.synthesis.backend_timeout_ms, 250);
        assert_eq!(config.scoring.recency_weight, 30.0);
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        config.convergence.threshold = 1.5;
        assert!(config.validate().is_err());

        let config = EngineConfig::default().with_attention(AttentionConfig {
            capacity: 0,
            decay_factor: 0.9,
        });
        assert!(config.validate().is_err());

        assert!(EngineConfig::from_toml_str("[patterns]\nmin_pattern_size = 1").is_err());
        assert!(EngineConfig::from_toml_str("not = [valid").is_err());
    }
}
