//! Recall sources: one adapter per backend, each scoring hits in 0..=1.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::Backend;
use crate::backends::{AttentionCache, GraphBackend, RecordStore, RelationalIndex, VectorBackend};
use crate::error::Result;
use crate::keywords;

/// Shortest query term the structured source scores on (matches full-text tokenization)
const QUERY_KEYWORD_LENGTH: usize = 3;

/// One scored candidate from a source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceHit {
    pub record_id: String,
    /// Raw backend score, 0..=1
    pub score: f64,
    /// Content when the source already has it
    pub content: Option<String>,
}

impl SourceHit {
    pub fn new(record_id: impl Into<String>, score: f64) -> Self {
        Self {
            record_id: record_id.into(),
            score,
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// A backend the synthesis engine can query
#[async_trait]
pub trait RecallSource: Send + Sync {
    fn backend(&self) -> Backend;

    /// Up to `limit` hits for `query`, in any order
    async fn recall(&self, owner_id: &str, query: &str, limit: usize) -> Result<Vec<SourceHit>>;
}

/// Semantic similarity through the vector backend
pub struct VectorSource {
    vectors: Arc<dyn VectorBackend>,
}

impl VectorSource {
    pub fn new(vectors: Arc<dyn VectorBackend>) -> Self {
        Self { vectors }
    }
}

#[async_trait]
impl RecallSource for VectorSource {
    fn backend(&self) -> Backend {
        Backend::Vector
    }

    async fn recall(&self, owner_id: &str, query: &str, limit: usize) -> Result<Vec<SourceHit>> {
        Ok(self
            .vectors
            .nearest(owner_id, query, limit)
            .await?
            .into_iter()
            .map(|m| SourceHit::new(m.record_id, m.similarity.clamp(0.0, 1.0)))
            .collect())
    }
}

/// Relationship traversal seeded by full-text hits.
///
/// A node reached at depth `d` scores `1 / d`; seeds themselves are not returned.
/// Archived or foreign nodes are traversed through but never returned.
pub struct GraphSource {
    index: Arc<dyn RelationalIndex>,
    graph: Arc<dyn GraphBackend>,
    records: Arc<dyn RecordStore>,
    seed_count: usize,
    max_depth: usize,
}

impl GraphSource {
    pub fn new(
        index: Arc<dyn RelationalIndex>,
        graph: Arc<dyn GraphBackend>,
        records: Arc<dyn RecordStore>,
        seed_count: usize,
        max_depth: usize,
    ) -> Self {
        Self {
            index,
            graph,
            records,
            seed_count,
            max_depth,
        }
    }
}

#[async_trait]
impl RecallSource for GraphSource {
    fn backend(&self) -> Backend {
        Backend::Graph
    }

    async fn recall(&self, owner_id: &str, query: &str, limit: usize) -> Result<Vec<SourceHit>> {
        let seeds = self.index.search(owner_id, query, self.seed_count).await?;
        let seed_ids: HashSet<&str> = seeds.iter().map(|s| s.record_id.as_str()).collect();

        let mut best: HashMap<String, f64> = HashMap::new();
        for seed in &seeds {
            for step in self.graph.traverse(&seed.record_id, self.max_depth).await? {
                if step.depth == 0 || seed_ids.contains(step.record_id.as_str()) {
                    continue;
                }
                let score = 1.0 / step.depth as f64;
                let entry = best.entry(step.record_id).or_insert(score);
                *entry = entry.max(score);
            }
        }

        let mut hits = Vec::with_capacity(best.len());
        for (id, score) in best {
            match self.records.get(&id).await? {
                Some(record) if record.owner_id == owner_id && !record.archived => {
                    hits.push(SourceHit::new(id, score).with_content(record.content));
                }
                _ => tracing::trace!(record_id = %id, "graph neighbour not recallable"),
            }
        }
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}

/// Full-text hits scored by query keyword coverage
pub struct StructuredSource {
    index: Arc<dyn RelationalIndex>,
    records: Arc<dyn RecordStore>,
}

impl StructuredSource {
    pub fn new(index: Arc<dyn RelationalIndex>, records: Arc<dyn RecordStore>) -> Self {
        Self { index, records }
    }
}

#[async_trait]
impl RecallSource for StructuredSource {
    fn backend(&self) -> Backend {
        Backend::Structured
    }

    async fn recall(&self, owner_id: &str, query: &str, limit: usize) -> Result<Vec<SourceHit>> {
        let query_keywords = keywords::keyword_set(query, QUERY_KEYWORD_LENGTH);
        let mut hits = Vec::new();

        for hit in self.index.search(owner_id, query, limit).await? {
            let Some(record) = self.records.get(&hit.record_id).await? else {
                continue;
            };
            let content_keywords = keywords::keyword_set(&record.content, QUERY_KEYWORD_LENGTH);
            let score = keywords::coverage(&query_keywords, &content_keywords);
            hits.push(SourceHit::new(record.id, score).with_content(record.content));
        }
        Ok(hits)
    }
}

/// Current working memory
pub struct AttentionSource {
    cache: Arc<AttentionCache>,
}

impl AttentionSource {
    pub fn new(cache: Arc<AttentionCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl RecallSource for AttentionSource {
    fn backend(&self) -> Backend {
        Backend::Attention
    }

    async fn recall(&self, owner_id: &str, query: &str, limit: usize) -> Result<Vec<SourceHit>> {
        let mut hits: Vec<SourceHit> = self
            .cache
            .search(owner_id, query)?
            .into_iter()
            .map(|(entry, score)| SourceHit::new(entry.record_id, score).with_content(entry.content))
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{SqliteStore, SqliteVectorStore};
    use crate::config::AttentionConfig;
    use crate::db::Database;
    use crate::types::NewMemoryRecord;

    fn store() -> Arc<SqliteStore> {
        Arc::new(SqliteStore::new(Arc::new(Database::open_in_memory().unwrap())))
    }

    async fn remember(store: &SqliteStore, content: &str) -> String {
        store
            .create(NewMemoryRecord::new("ci-1", content))
            .await
            .unwrap()
            .id
    }

    fn score_of(hits: &[SourceHit], id: &str) -> Option<f64> {
        hits.iter().find(|h| h.record_id == id).map(|h| h.score)
    }

    #[tokio::test]
    async fn test_structured_scores_keyword_coverage() {
        let store = store();
        let full = remember(&store, "redis cache eviction policy").await;
        let half = remember(&store, "redis cluster failover").await;

        let source = StructuredSource::new(store.clone(), store.clone());
        let hits = source.recall("ci-1", "redis eviction", 10).await.unwrap();

        assert_eq!(score_of(&hits, &full), Some(1.0));
        assert_eq!(score_of(&hits, &half), Some(0.5));
        assert!(hits.iter().all(|h| h.content.is_some()));
    }

    #[tokio::test]
    async fn test_graph_scores_by_depth_and_skips_seeds() {
        let store = store();
        let seed = remember(&store, "incident postmortem for checkout outage").await;
        let near = remember(&store, "payment gateway timeout").await;
        let far = remember(&store, "vendor contract renewal").await;
        store.link(&seed, &near, "caused_by", 1.0).await.unwrap();
        store.link(&near, &far, "related", 1.0).await.unwrap();

        let source = GraphSource::new(store.clone(), store.clone(), store.clone(), 5, 2);
        let hits = source.recall("ci-1", "checkout postmortem", 10).await.unwrap();

        assert_eq!(score_of(&hits, &seed), None);
        assert_eq!(score_of(&hits, &near), Some(1.0));
        assert_eq!(score_of(&hits, &far), Some(0.5));

        let shallow = GraphSource::new(store.clone(), store.clone(), store.clone(), 5, 1);
        let hits = shallow.recall("ci-1", "checkout postmortem", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_graph_skips_archived_neighbours() {
        let store = store();
        let seed = remember(&store, "incident postmortem for checkout outage").await;
        let stale = remember(&store, "payment gateway timeout").await;
        let live = remember(&store, "vendor contract renewal").await;
        store.link(&seed, &stale, "caused_by", 1.0).await.unwrap();
        store.link(&stale, &live, "related", 1.0).await.unwrap();
        store.mark_archived(&[stale.clone()]).await.unwrap();

        let source = GraphSource::new(store.clone(), store.clone(), store.clone(), 5, 2);
        let hits = source.recall("ci-1", "checkout postmortem", 10).await.unwrap();

        assert_eq!(score_of(&hits, &stale), None);
        assert_eq!(score_of(&hits, &live), Some(0.5));
        assert_eq!(hits[0].content.as_deref(), Some("vendor contract renewal"));
    }

    #[tokio::test]
    async fn test_vector_source_uses_similarity() {
        let store = store();
        let id = remember(&store, "terraform state lock stuck").await;
        let vectors = Arc::new(SqliteVectorStore::with_hashing(store.database().clone()));
        vectors.store("ci-1", &id, "terraform state lock stuck").await.unwrap();

        let hits = VectorSource::new(vectors).recall("ci-1", "terraform state lock stuck", 5).await.unwrap();
        assert_eq!(hits[0].record_id, id);
        assert!(hits[0].score > 0.99 && hits[0].score <= 1.0);
    }

    #[tokio::test]
    async fn test_attention_source() {
        let cache = Arc::new(AttentionCache::new(AttentionConfig::default()));
        cache.attend("ci-1", "r1", "reviewing flaky integration tests").unwrap();

        let source = AttentionSource::new(cache);
        assert_eq!(source.backend(), Backend::Attention);
        let hits = source.recall("ci-1", "flaky tests", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-9);
        assert!(source.recall("ci-1", "flaky tests", 0).await.unwrap().is_empty());
    }
}
