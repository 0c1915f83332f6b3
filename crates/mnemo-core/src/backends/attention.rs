//! Short-term attention cache.
//!
//! A small per-owner working set of recently attended records. Every insert
//! decays the attention of what is already held; when the set is full the
//! least-attended entry is evicted.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::AttentionConfig;
use crate::error::{Error, Result};
use crate::keywords;

/// One record held in working memory
#[derive(Debug, Clone, PartialEq)]
pub struct AttentionEntry {
    pub record_id: String,
    pub content: String,
    /// Current attention, 0..=1
    pub attention: f64,
    pub attended_at: DateTime<Utc>,
}

/// Per-owner bounded working set
pub struct AttentionCache {
    config: AttentionConfig,
    entries: Mutex<HashMap<String, Vec<AttentionEntry>>>,
}

impl AttentionCache {
    pub fn new(config: AttentionConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Bring a record into focus with full attention
    pub fn attend(&self, owner_id: &str, record_id: &str, content: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| Error::LockPoisoned)?;
        let working_set = entries.entry(owner_id.to_string()).or_default();

        for entry in working_set.iter_mut() {
            entry.attention *= self.config.decay_factor;
        }
        working_set.retain(|e| e.record_id != record_id);

        if working_set.len() >= self.config.capacity {
            if let Some(weakest) = working_set
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    a.attention
                        .partial_cmp(&b.attention)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.attended_at.cmp(&b.attended_at))
                })
                .map(|(i, _)| i)
            {
                let evicted = working_set.remove(weakest);
                tracing::debug!(owner = %owner_id, record_id = %evicted.record_id, "attention evicted");
            }
        }

        working_set.push(AttentionEntry {
            record_id: record_id.to_string(),
            content: content.to_string(),
            attention: 1.0,
            attended_at: Utc::now(),
        });
        Ok(())
    }

    /// Entries sharing keywords with `query`, scored `attention × coverage`
    pub fn search(&self, owner_id: &str, query: &str) -> Result<Vec<(AttentionEntry, f64)>> {
        let query_keywords = keywords::keyword_set(query, keywords::MIN_KEYWORD_LENGTH);
        if query_keywords.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.entries.lock().map_err(|_| Error::LockPoisoned)?;
        let Some(working_set) = entries.get(owner_id) else {
            return Ok(Vec::new());
        };

        Ok(working_set
            .iter()
            .filter_map(|entry| {
                let content = keywords::keyword_set(&entry.content, keywords::MIN_KEYWORD_LENGTH);
                let coverage = keywords::coverage(&query_keywords, &content);
                (coverage > 0.0).then(|| (entry.clone(), entry.attention * coverage))
            })
            .collect())
    }

    /// Current working set, most attended first
    pub fn snapshot(&self, owner_id: &str) -> Result<Vec<AttentionEntry>> {
        let entries = self.entries.lock().map_err(|_| Error::LockPoisoned)?;
        let mut working_set = entries.get(owner_id).cloned().unwrap_or_default();
        working_set.sort_by(|a, b| {
            b.attention
                .partial_cmp(&a.attention)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(working_set)
    }
}

impl Default for AttentionCache {
    fn default() -> Self {
        Self::new(AttentionConfig::default())
    }
}
