//! Embeddings and vector search
//!
//! Vectors are persisted in the `memory_vector` table and searched by
//! cosine similarity. The default [`HashingEmbedder`] is deterministic
//! and dependency-free; with the `embeddings` feature, [`FastEmbedder`]
//! runs the all-MiniLM-L6-v2 model locally through `fastembed`.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

use super::{VectorBackend, VectorMatch};
use crate::db::Database;
use crate::error::Result;
use crate::keywords;

/// Dimensions produced by [`HashingEmbedder`] by default
pub const HASHING_DIMENSIONS: usize = 256;

/// Text to vector conversion
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimensions(&self) -> usize;
}

/// Compute cosine similarity between two vectors
///
/// Returns a value between -1.0 and 1.0; mismatched or zero vectors give 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Feature-hashing bag-of-keywords embedder.
///
/// Each keyword lands in a bucket chosen by its SHA-256 digest, with a
/// sign bit from the same digest; counts are log-scaled.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, keyword: &str) -> (usize, f32) {
        let digest = Sha256::digest(keyword.as_bytes());
        let mut index_bytes = [0u8; 8];
        index_bytes.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(index_bytes) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for token in text.split(|c: char| !c.is_alphanumeric()) {
            if token.chars().count() < 3 {
                continue;
            }
            *counts.entry(token.to_lowercase()).or_default() += 1;
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for (keyword, count) in counts {
            if keywords::is_stop_word(&keyword) {
                continue;
            }
            let (index, sign) = self.bucket(&keyword);
            vector[index] += sign * (1.0 + (count as f32).ln());
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(HASHING_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Embedding dimensions for all-MiniLM-L6-v2
#[cfg(feature = "embeddings")]
pub const MINILM_DIMENSIONS: usize = 384;

/// Local model embedder (lazy-loaded all-MiniLM-L6-v2)
#[cfg(feature = "embeddings")]
pub struct FastEmbedder {
    model: Arc<tokio::sync::RwLock<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "embeddings")]
impl Default for FastEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "embeddings")]
impl FastEmbedder {
    pub fn new() -> Self {
        Self {
            model: Arc::new(tokio::sync::RwLock::new(None)),
        }
    }

    async fn ensure_model(&self) -> Result<()> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        if self.model.read().await.is_some() {
            return Ok(());
        }

        let mut model_guard = self.model.write().await;
        if model_guard.is_some() {
            return Ok(());
        }

        tracing::info!("Loading embedding model: all-MiniLM-L6-v2");
        let start = std::time::Instant::now();

        let mut init_options = InitOptions::default();
        init_options.model_name = EmbeddingModel::AllMiniLML6V2;
        init_options.show_download_progress = false;

        let model = TextEmbedding::try_new(init_options).map_err(|e| {
            crate::Error::backend("vector", format!("failed to load embedding model: {e}"))
        })?;

        tracing::info!(elapsed = ?start.elapsed(), "embedding model loaded");
        *model_guard = Some(model);
        Ok(())
    }
}

#[cfg(feature = "embeddings")]
#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.ensure_model().await?;

        let model_guard = self.model.read().await;
        let model = model_guard
            .as_ref()
            .ok_or_else(|| crate::Error::backend("vector", "embedding model not initialized"))?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| crate::Error::backend("vector", format!("embedding failed: {e}")))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| crate::Error::backend("vector", "no embedding generated"))
    }

    fn dimensions(&self) -> usize {
        MINILM_DIMENSIONS
    }
}

/// Vector backend persisting embeddings next to the records they describe.
pub struct SqliteVectorStore {
    db: Arc<Database>,
    embedder: Arc<dyn Embedder>,
}

impl SqliteVectorStore {
    pub fn new(db: Arc<Database>, embedder: Arc<dyn Embedder>) -> Self {
        Self { db, embedder }
    }

    /// Store using the default hashing embedder
    pub fn with_hashing(db: Arc<Database>) -> Self {
        Self::new(db, Arc::new(HashingEmbedder::default()))
    }
}

#[async_trait]
impl VectorBackend for SqliteVectorStore {
    async fn store(&self, owner_id: &str, record_id: &str, text: &str) -> Result<()> {
        let vector = self.embedder.embed(text).await?;
        self.db.upsert_vector(owner_id, record_id, &vector)
    }

    async fn nearest(&self, owner_id: &str, text: &str, k: usize) -> Result<Vec<VectorMatch>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query = self.embedder.embed(text).await?;

        let mut matches: Vec<VectorMatch> = self
            .db
            .load_vectors(owner_id)?
            .into_iter()
            .map(|(record_id, vector)| VectorMatch {
                record_id,
                similarity: cosine_similarity(&query, &vector) as f64,
            })
            .filter(|m| m.similarity > 0.0)
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);
        Ok(matches)
    }
}
