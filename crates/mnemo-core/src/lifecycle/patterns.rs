//! Repeated-memory detection.
//!
//! Records that say the same thing over and over are clustered by keyword
//! overlap. A cluster becomes a pattern once it reaches the minimum size;
//! its first, last, and most important members are kept as outliers while
//! the rest become archivable.

use serde::Serialize;
use std::collections::HashSet;

use crate::config::PatternConfig;
use crate::keywords;
use crate::types::{MemoryRecord, PatternAssignment};

/// A pattern found in one detection pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternSummary {
    pub pattern_id: String,
    /// Member record ids in batch order
    pub members: Vec<String>,
    /// Distinct outlier ids (one to three)
    pub outliers: Vec<String>,
}

impl PatternSummary {
    pub fn frequency(&self) -> usize {
        self.members.len()
    }

    /// Human-readable description
    pub fn describe(&self) -> String {
        format!(
            "Pattern: {} occurrences ({} archived, {} preserved as outliers)",
            self.members.len(),
            self.members.len() - self.outliers.len(),
            self.outliers.len()
        )
    }

    /// Pattern fields to persist for `record_id`
    pub fn assignment_for(&self, record_id: &str) -> PatternAssignment {
        PatternAssignment {
            pattern_id: self.pattern_id.clone(),
            frequency: self.members.len() as u32,
            is_outlier: self.outliers.iter().any(|id| id == record_id),
        }
    }
}

/// Keyword-overlap pattern detector
#[derive(Debug, Clone, Default)]
pub struct PatternDetector {
    config: PatternConfig,
}

impl PatternDetector {
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    /// Cluster unassigned records in place.
    ///
    /// Records that already carry a pattern id are neither seeds nor members.
    pub fn detect_patterns(&self, records: &mut [MemoryRecord]) -> Vec<PatternSummary> {
        let keyword_sets: Vec<HashSet<String>> = records
            .iter()
            .map(|r| keywords::keyword_set(&r.content, self.config.min_keyword_length))
            .collect();
        let mut assigned: Vec<bool> = records.iter().map(|r| r.pattern_id.is_some()).collect();
        let mut patterns = Vec::new();

        for i in 0..records.len() {
            if assigned[i] {
                continue;
            }

            let mut cluster = vec![i];
            for j in (i + 1)..records.len() {
                if assigned[j] {
                    continue;
                }
                let similarity = keywords::overlap_ratio(&keyword_sets[i], &keyword_sets[j]);
                if similarity >= self.config.similarity_threshold {
                    cluster.push(j);
                }
            }

            if cluster.len() < self.config.min_pattern_size {
                continue;
            }

            let pattern_id = format!("pattern-{}", uuid::Uuid::new_v4());
            let frequency = cluster.len() as u32;

            let first = cluster[0];
            let last = cluster[cluster.len() - 1];
            let mut most_important = first;
            for &idx in &cluster {
                if records[idx].importance > records[most_important].importance {
                    most_important = idx;
                }
            }

            let mut outlier_idx = vec![first];
            for idx in [last, most_important] {
                if !outlier_idx.contains(&idx) {
                    outlier_idx.push(idx);
                }
            }

            for &idx in &cluster {
                assigned[idx] = true;
                let record = &mut records[idx];
                record.pattern_id = Some(pattern_id.clone());
                record.pattern_frequency = frequency;
                record.is_pattern_outlier = outlier_idx.contains(&idx);
            }

            let summary = PatternSummary {
                pattern_id,
                members: cluster.iter().map(|&idx| records[idx].id.clone()).collect(),
                outliers: outlier_idx.iter().map(|&idx| records[idx].id.clone()).collect(),
            };
            tracing::debug!(
                pattern_id = %summary.pattern_id,
                frequency = summary.frequency(),
                outliers = summary.outliers.len(),
                "pattern detected"
            );
            patterns.push(summary);
        }

        patterns
    }

    /// Drop protected outliers; non-outlier members and non-pattern records pass through
    pub fn filter_pattern_outliers(records: Vec<MemoryRecord>) -> Vec<MemoryRecord> {
        records
            .into_iter()
            .filter(|r| !(r.pattern_id.is_some() && r.is_pattern_outlier))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::scorer::tests::record_aged;
    use chrono::Utc;

    fn batch(contents: &[&str]) -> Vec<MemoryRecord> {
        let now = Utc::now();
        contents
            .iter()
            .enumerate()
            .map(|(i, c)| record_aged(&format!("r{i}"), c, now, 30))
            .collect()
    }

    fn detector() -> PatternDetector {
        PatternDetector::default()
    }

    #[test]
    fn test_cluster_of_four_gets_pattern() {
        let mut records = batch(&[
            "checked build status pipeline green",
            "checked build status pipeline again",
            "grocery list apples bread",
            "checked build status pipeline still green",
            "checked build status pipeline before lunch",
        ]);

        let patterns = detector().detect_patterns(&mut records);
        assert_eq!(patterns.len(), 1);

        let pattern = &patterns[0];
        assert_eq!(pattern.members, vec!["r0", "r1", "r3", "r4"]);
        assert_eq!(pattern.frequency(), 4);
        assert!(records[2].pattern_id.is_none());
        for idx in [0, 1, 3, 4] {
            assert_eq!(records[idx].pattern_id.as_deref(), Some(pattern.pattern_id.as_str()));
            assert_eq!(records[idx].pattern_frequency, 4);
        }

        // All importances equal: first wins the tie, so first and last only.
        assert_eq!(pattern.outliers, vec!["r0", "r4"]);
        assert!(records[0].is_pattern_outlier);
        assert!(records[4].is_pattern_outlier);
        assert!(!records[1].is_pattern_outlier);
    }

    #[test]
    fn test_highest_importance_is_protected() {
        let mut records = batch(&[
            "daily standup notes backend team",
            "daily standup notes backend sync",
            "daily standup notes backend blockers",
            "daily standup notes backend demo",
        ]);
        records[2].importance = 0.9;

        let patterns = detector().detect_patterns(&mut records);
        assert_eq!(patterns[0].outliers, vec!["r0", "r3", "r2"]);
        assert!(records[2].is_pattern_outlier);
        assert!(!records[1].is_pattern_outlier);
        assert_eq!(patterns[0].describe(), "Pattern: 4 occurrences (1 archived, 3 preserved as outliers)");
    }

    #[test]
    fn test_outlier_count_bounds() {
        let contents = [
            "weekly report metrics dashboard review",
            "weekly report metrics dashboard export",
            "weekly report metrics dashboard shared",
        ];
        for top in 0..contents.len() {
            let mut records = batch(&contents);
            records[top].importance = 1.0;
            let patterns = detector().detect_patterns(&mut records);
            assert_eq!(patterns.len(), 1);

            let outliers = records.iter().filter(|r| r.is_pattern_outlier).count();
            assert!((1..=3).contains(&outliers), "outliers = {outliers}");
            assert_eq!(outliers, patterns[0].outliers.len());
        }
    }

    #[test]
    fn test_small_clusters_get_no_pattern() {
        let mut records = batch(&[
            "restart redis cache cluster",
            "restart redis cache cluster node",
            "unrelated vacation planning",
        ]);

        let patterns = detector().detect_patterns(&mut records);
        assert!(patterns.is_empty());
        assert!(records.iter().all(|r| r.pattern_id.is_none() && !r.is_pattern_outlier));
    }

    #[test]
    fn test_assigned_records_are_skipped() {
        let mut records = batch(&[
            "rotate api keys staging",
            "rotate api keys production",
            "rotate api keys sandbox",
        ]);
        records[0].pattern_id = Some("pattern-existing".into());

        let patterns = detector().detect_patterns(&mut records);
        assert!(patterns.is_empty());
        assert_eq!(records[0].pattern_id.as_deref(), Some("pattern-existing"));
    }

    #[test]
    fn test_filter_pattern_outliers() {
        let mut records = batch(&[
            "checked build status pipeline green",
            "checked build status pipeline again",
            "checked build status pipeline still green",
            "checked build status pipeline before lunch",
            "grocery list apples bread",
        ]);
        detector().detect_patterns(&mut records);

        let archivable = PatternDetector::filter_pattern_outliers(records);
        let ids: Vec<&str> = archivable.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2", "r4"]);
    }
}
