//! SQLite-backed record store, relational index, graph, and summary tier.

use async_trait::async_trait;
use std::sync::Arc;

use super::{
    GraphBackend, IndexHit, PathStep, RecordStore, RelationalIndex, SimilarityWindow, SummaryTier,
};
use crate::db::Database;
use crate::error::Result;
use crate::types::{
    Digest, MemoryRecord, MetadataUpdate, NewDigest, NewMemoryRecord, PatternAssignment,
    RecordQuery,
};

/// Database-backed implementation of the record-level backends.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn create(&self, record: NewMemoryRecord) -> Result<MemoryRecord> {
        let created = self.db.insert_record(&record)?;
        tracing::debug!(
            record_id = %created.id,
            owner = %created.owner_id,
            memory_type = %created.memory_type,
            "memory record created"
        );
        Ok(created)
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>> {
        self.db.get_record(id)
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<MemoryRecord>> {
        self.db.list_records(query)
    }

    async fn update_pattern(&self, id: &str, assignment: &PatternAssignment) -> Result<()> {
        self.db.set_pattern(id, assignment)
    }

    async fn touch(&self, id: &str) -> Result<()> {
        self.db.touch_record(id)
    }
}

#[async_trait]
impl RelationalIndex for SqliteStore {
    async fn find_similar(
        &self,
        owner_id: &str,
        text: &str,
        window: &SimilarityWindow,
    ) -> Result<Vec<IndexHit>> {
        self.db.search_records(owner_id, text, window)
    }

    async fn update_metadata(&self, id: &str, update: &MetadataUpdate) -> Result<()> {
        self.db.update_metadata(id, update)
    }

    async fn mark_archived(&self, ids: &[String]) -> Result<usize> {
        self.db.mark_archived(ids)
    }
}

#[async_trait]
impl GraphBackend for SqliteStore {
    async fn link(&self, from_id: &str, to_id: &str, relation: &str, strength: f64) -> Result<()> {
        self.db.add_edge(from_id, to_id, relation, strength)
    }

    async fn edges_within(&self, ids: &[String]) -> Result<Vec<(String, String)>> {
        self.db.edges_within(ids)
    }

    async fn traverse(&self, start_id: &str, max_depth: usize) -> Result<Vec<PathStep>> {
        self.db.traverse(start_id, max_depth)
    }
}

#[async_trait]
impl SummaryTier for SqliteStore {
    async fn store_digest(&self, digest: &NewDigest, source_ids: &[String]) -> Result<String> {
        let id = self.db.insert_digest(digest)?;
        tracing::info!(
            digest_id = %id,
            owner = %digest.owner_id,
            period = %digest.period_id,
            sources = source_ids.len(),
            "digest stored"
        );
        Ok(id)
    }

    async fn list_digests(&self, owner_id: &str) -> Result<Vec<Digest>> {
        self.db.list_digests(owner_id)
    }
}
