//! Storage and retrieval backends consumed by the lifecycle and recall engine.
//!
//! The engine only talks to these traits. `sqlite` implements the record
//! store, relational index, graph, and summary tier over one [`Database`];
//! `vector` layers embeddings on top of it; `attention` is the in-process
//! short-term working set.
//!
//! [`Database`]: crate::db::Database

pub mod attention;
pub mod sqlite;
pub mod vector;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{
    Digest, MemoryRecord, MetadataUpdate, NewDigest, NewMemoryRecord, PatternAssignment,
    RecordQuery,
};

pub use attention::{AttentionCache, AttentionEntry};
pub use sqlite::SqliteStore;
pub use vector::{Embedder, HashingEmbedder, SqliteVectorStore};

/// Restriction applied to relational similarity searches
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityWindow {
    /// Only records created at or after this instant
    pub since: Option<DateTime<Utc>>,
    /// Only records with at least this importance
    pub importance_floor: f64,
    pub limit: usize,
}

impl Default for SimilarityWindow {
    fn default() -> Self {
        Self {
            since: None,
            importance_floor: 0.0,
            limit: 20,
        }
    }
}

/// Candidate returned by the relational index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub record_id: String,
    /// Storage location of the record (SQLite rowid)
    pub location: i64,
}

/// Nearest-neighbour match from the vector backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub record_id: String,
    /// Cosine similarity
    pub similarity: f64,
}

/// One node reached by a graph traversal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    pub record_id: String,
    /// Hops from the start node (start itself is depth 0)
    pub depth: usize,
}

/// Persistent memory records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Validate and persist a new record.
    async fn create(&self, record: NewMemoryRecord) -> Result<MemoryRecord>;

    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>>;

    async fn query(&self, query: &RecordQuery) -> Result<Vec<MemoryRecord>>;

    async fn update_pattern(&self, id: &str, assignment: &PatternAssignment) -> Result<()>;

    /// Record an access (bumps access count and last-accessed time).
    async fn touch(&self, id: &str) -> Result<()>;
}

/// Fast lookup, full-text search, and flag updates.
#[async_trait]
pub trait RelationalIndex: Send + Sync {
    /// Full-text similarity search restricted to a window and importance floor.
    async fn find_similar(
        &self,
        owner_id: &str,
        text: &str,
        window: &SimilarityWindow,
    ) -> Result<Vec<IndexHit>>;

    /// Unwindowed full-text search.
    async fn search(&self, owner_id: &str, text: &str, limit: usize) -> Result<Vec<IndexHit>> {
        let window = SimilarityWindow {
            limit,
            ..SimilarityWindow::default()
        };
        self.find_similar(owner_id, text, &window).await
    }

    async fn update_metadata(&self, id: &str, update: &MetadataUpdate) -> Result<()>;

    /// Flag records archived; returns how many rows changed.
    async fn mark_archived(&self, ids: &[String]) -> Result<usize>;
}

/// Text embeddings and nearest-neighbour search.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    async fn store(&self, owner_id: &str, record_id: &str, text: &str) -> Result<()>;

    /// Up to `k` matches, most similar first.
    async fn nearest(&self, owner_id: &str, text: &str, k: usize) -> Result<Vec<VectorMatch>>;
}

/// Relationship graph over record ids.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    async fn link(&self, from_id: &str, to_id: &str, relation: &str, strength: f64) -> Result<()>;

    /// Edges whose endpoints both lie in `ids`.
    async fn edges_within(&self, ids: &[String]) -> Result<Vec<(String, String)>>;

    /// Breadth-first walk from `start_id`, excluding the start node.
    async fn traverse(&self, start_id: &str, max_depth: usize) -> Result<Vec<PathStep>>;
}

/// Compressed periodic summaries.
#[async_trait]
pub trait SummaryTier: Send + Sync {
    /// Store a digest, returning the existing id if its idempotency key is known.
    async fn store_digest(&self, digest: &NewDigest, source_ids: &[String]) -> Result<String>;

    async fn list_digests(&self, owner_id: &str) -> Result<Vec<Digest>>;
}
