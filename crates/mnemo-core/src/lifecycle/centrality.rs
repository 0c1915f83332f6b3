//! Degree centrality over an implicit keyword graph.
//!
//! Two records are adjacent when they share enough keywords, or when an
//! explicit graph link joins them. Degree is normalized by the busiest
//! node (or the configured floor, whichever is larger).

use std::collections::{HashMap, HashSet};

use crate::config::CentralityConfig;
use crate::error::{Error, Result};
use crate::keywords;
use crate::types::MemoryRecord;

/// Outcome of one centrality pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CentralityReport {
    /// Distinct undirected edges in the batch
    pub edges: usize,
    pub max_degree: usize,
    /// Records whose centrality value changed
    pub changed: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CentralityCalculator {
    config: CentralityConfig,
}

impl CentralityCalculator {
    pub fn new(config: CentralityConfig) -> Self {
        Self { config }
    }

    /// Annotate `records` with normalized degree centrality.
    ///
    /// `explicit_edges` may name ids outside the batch; those are ignored.
    pub fn calculate(
        &self,
        records: &mut [MemoryRecord],
        explicit_edges: &[(String, String)],
    ) -> Result<CentralityReport> {
        if records.len() > self.config.max_batch_size {
            return Err(Error::resource_exhausted(format!(
                "centrality batch of {} records exceeds limit of {}",
                records.len(),
                self.config.max_batch_size
            )));
        }

        let keyword_sets: Vec<HashSet<String>> = records
            .iter()
            .map(|r| keywords::keyword_set(&r.content, self.config.min_keyword_length))
            .collect();
        let mut adjacency: Vec<HashSet<usize>> = vec![HashSet::new(); records.len()];

        for i in 0..records.len() {
            for j in (i + 1)..records.len() {
                if keywords::shared_count(&keyword_sets[i], &keyword_sets[j])
                    >= self.config.min_shared_keywords
                {
                    adjacency[i].insert(j);
                    adjacency[j].insert(i);
                }
            }
        }

        let positions: HashMap<&str, usize> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.as_str(), i))
            .collect();
        for (from, to) in explicit_edges {
            if let (Some(&a), Some(&b)) = (positions.get(from.as_str()), positions.get(to.as_str())) {
                if a != b {
                    adjacency[a].insert(b);
                    adjacency[b].insert(a);
                }
            }
        }

        let max_degree = adjacency.iter().map(HashSet::len).max().unwrap_or(0);
        let denominator = max_degree.max(self.config.normalization_floor).max(1) as f64;

        let mut changed = Vec::new();
        for (record, neighbours) in records.iter_mut().zip(&adjacency) {
            let centrality = (neighbours.len() as f64 / denominator).min(1.0);
            if (record.graph_centrality - centrality).abs() > f64::EPSILON {
                record.graph_centrality = centrality;
                changed.push(record.id.clone());
            }
        }

        let edges = adjacency.iter().map(HashSet::len).sum::<usize>() / 2;
        tracing::debug!(
            records = records.len(),
            edges,
            max_degree,
            changed = changed.len(),
            "centrality calculated"
        );

        Ok(CentralityReport {
            edges,
            max_degree,
            changed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::scorer::tests::record_aged;
    use chrono::Utc;

    fn star() -> Vec<MemoryRecord> {
        let now = Utc::now();
        vec![
            record_aged("hub", "kubernetes deploy rollback canary metrics", now, 30),
            record_aged("a", "kubernetes deploy pods", now, 30),
            record_aged("b", "rollback canary release", now, 30),
            record_aged("c", "metrics dashboard kubernetes", now, 30),
            record_aged("lonely", "lunch order", now, 30),
        ]
    }

    fn centrality_of(records: &[MemoryRecord], id: &str) -> f64 {
        records
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.graph_centrality)
            .unwrap()
    }

    #[test]
    fn test_star_normalized_by_max_degree() {
        let mut records = star();
        let report = CentralityCalculator::default()
            .calculate(&mut records, &[])
            .unwrap();

        assert_eq!(report.edges, 3);
        assert_eq!(report.max_degree, 3);
        assert!((centrality_of(&records, "hub") - 1.0).abs() < 1e-9);
        assert!((centrality_of(&records, "a") - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(centrality_of(&records, "lonely"), 0.0);
        assert!(!report.changed.contains(&"lonely".to_string()));
    }

    #[test]
    fn test_normalization_floor() {
        let mut records = star();
        let calculator = CentralityCalculator::new(CentralityConfig {
            normalization_floor: 5,
            ..CentralityConfig::default()
        });
        calculator.calculate(&mut records, &[]).unwrap();

        assert!((centrality_of(&records, "hub") - 0.6).abs() < 1e-9);
        assert!((centrality_of(&records, "b") - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_explicit_edges() {
        let mut records = star();
        let edges = vec![
            ("lonely".to_string(), "hub".to_string()),
            ("lonely".to_string(), "not-in-batch".to_string()),
            // Duplicate of a keyword edge
            ("a".to_string(), "hub".to_string()),
        ];
        let report = CentralityCalculator::default()
            .calculate(&mut records, &edges)
            .unwrap();

        assert_eq!(report.edges, 4);
        assert_eq!(report.max_degree, 4);
        assert!((centrality_of(&records, "lonely") - 0.25).abs() < 1e-9);
        assert!((centrality_of(&records, "hub") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_isolated_records_stay_zero() {
        let now = Utc::now();
        let mut records = vec![
            record_aged("x", "alpha bravo", now, 1),
            record_aged("y", "charlie delta", now, 1),
        ];
        let report = CentralityCalculator::default()
            .calculate(&mut records, &[])
            .unwrap();

        assert_eq!(report.edges, 0);
        assert!(records.iter().all(|r| r.graph_centrality == 0.0));
    }

    #[test]
    fn test_batch_limit() {
        let mut records = star();
        let calculator = CentralityCalculator::new(CentralityConfig {
            max_batch_size: 2,
            ..CentralityConfig::default()
        });
        let err = calculator.calculate(&mut records, &[]).unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted { .. }));
        assert!(records.iter().all(|r| r.graph_centrality == 0.0));
    }
}
