//! Memory lifecycle: scoring, pattern and centrality analysis, archival.

pub mod archival;
pub mod centrality;
pub mod patterns;
pub mod scorer;

pub use archival::{ArchivalPipeline, ArchiveReport, AtRiskRecord};
pub use centrality::{CentralityCalculator, CentralityReport};
pub use patterns::{PatternDetector, PatternSummary};
pub use scorer::{Decision, PreservationScorer, PreserveReason, ScoreBreakdown};
