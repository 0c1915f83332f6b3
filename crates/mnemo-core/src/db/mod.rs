//! Direct SQLite access for memory records, edges, vectors, and digests.
//!
//! Timestamps are stored as Unix milliseconds.

pub mod migrations;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use crate::backends::{IndexHit, PathStep, SimilarityWindow};
use crate::error::{Error, Result};
use crate::keywords;
use crate::types::{
    Digest, EmotionKind, MemoryRecord, MemoryType, MetadataUpdate, NewDigest, NewMemoryRecord,
    PatternAssignment, PeriodType, RecordQuery,
};

const RECORD_COLUMNS: &str = "id, owner_id, session_id, memory_type, content, importance,
     emotion_intensity, emotion, created_at, last_accessed_at, access_count,
     keep_forever, okay_to_forget, personal, do_not_archive, graph_centrality,
     pattern_id, pattern_frequency, is_pattern_outlier, archived, archived_at";

const DIGEST_COLUMNS: &str = "id, owner_id, period_type, period_id, source_record_count, summary,
     themes_json, keywords_json, questions_asked, idempotency_key, created_at";

/// Per-owner record counts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordCounts {
    pub total: usize,
    pub archived: usize,
    pub keep_forever: usize,
    pub curated: usize,
    pub pattern_outliers: usize,
    pub digests: usize,
}

/// Database connection wrapper.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database file and run migrations
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Record Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a validated record
    pub fn insert_record(&self, record: &NewMemoryRecord) -> Result<MemoryRecord> {
        record.validate()?;

        let id = uuid::Uuid::new_v4().to_string();
        let created_at = record.created_at.unwrap_or_else(Utc::now);

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO memory_record
             (id, owner_id, session_id, memory_type, content, importance,
              emotion_intensity, emotion, created_at, keep_forever, okay_to_forget,
              personal, do_not_archive)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                id,
                record.owner_id,
                record.session_id,
                record.memory_type.as_str(),
                record.content,
                record.importance,
                record.emotion_intensity,
                record.emotion.as_ref().map(|e| e.as_str().to_string()),
                created_at.timestamp_millis(),
                record.keep_forever,
                record.okay_to_forget,
                record.personal,
                record.do_not_archive,
            ],
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM memory_record WHERE id = ?1"
        ))?;
        Ok(stmt.query_row(params![id], Self::map_record)?)
    }

    /// Get record by ID
    pub fn get_record(&self, id: &str) -> Result<Option<MemoryRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM memory_record WHERE id = ?1"
        ))?;
        Ok(stmt.query_row(params![id], Self::map_record).optional()?)
    }

    /// List records matching a filter, oldest first
    pub fn list_records(&self, query: &RecordQuery) -> Result<Vec<MemoryRecord>> {
        let mut sql = format!("SELECT {RECORD_COLUMNS} FROM memory_record WHERE owner_id = ?");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(query.owner_id.clone())];

        if let Some(archived) = query.archived {
            sql.push_str(" AND archived = ?");
            params_vec.push(Box::new(archived));
        }

        if let Some(after) = query.created_after {
            sql.push_str(" AND created_at >= ?");
            params_vec.push(Box::new(after.timestamp_millis()));
        }

        if let Some(before) = query.created_before {
            sql.push_str(" AND created_at < ?");
            params_vec.push(Box::new(before.timestamp_millis()));
        }

        if let Some(memory_type) = query.memory_type {
            sql.push_str(" AND memory_type = ?");
            params_vec.push(Box::new(memory_type.as_str()));
        }

        sql.push_str(" ORDER BY created_at ASC, rowid ASC");

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let conn = self.lock()?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(param_refs.as_slice(), Self::map_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Write pattern fields
    pub fn set_pattern(&self, id: &str, assignment: &PatternAssignment) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE memory_record
             SET pattern_id = ?1, pattern_frequency = ?2, is_pattern_outlier = ?3
             WHERE id = ?4",
            params![
                assignment.pattern_id,
                assignment.frequency,
                assignment.is_outlier,
                id
            ],
        )?;
        if changed == 0 {
            return Err(Error::not_found("record", id));
        }
        Ok(())
    }

    /// Bump access count and last-accessed time
    pub fn touch_record(&self, id: &str) -> Result<()> {
        let conn = self.lock()?;
        let now = Utc::now().timestamp_millis();
        let changed = conn.execute(
            "UPDATE memory_record
             SET access_count = access_count + 1, last_accessed_at = ?1
             WHERE id = ?2",
            params![now, id],
        )?;
        if changed == 0 {
            return Err(Error::not_found("record", id));
        }
        Ok(())
    }

    /// Apply a partial metadata update
    pub fn update_metadata(&self, id: &str, update: &MetadataUpdate) -> Result<()> {
        let mut sets = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(importance) = update.importance {
            sets.push("importance = ?");
            params_vec.push(Box::new(importance.clamp(0.0, 1.0)));
        }
        if let Some(access_count) = update.access_count {
            sets.push("access_count = ?");
            params_vec.push(Box::new(access_count));
        }
        if let Some(centrality) = update.centrality {
            sets.push("graph_centrality = ?");
            params_vec.push(Box::new(centrality.clamp(0.0, 1.0)));
        }

        if sets.is_empty() {
            return Ok(());
        }

        let sql = format!("UPDATE memory_record SET {} WHERE id = ?", sets.join(", "));
        params_vec.push(Box::new(id.to_string()));

        let conn = self.lock()?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let changed = conn.execute(&sql, param_refs.as_slice())?;
        if changed == 0 {
            return Err(Error::not_found("record", id));
        }
        Ok(())
    }

    /// Flag records archived in one transaction; already-archived rows are left alone
    pub fn mark_archived(&self, ids: &[String]) -> Result<usize> {
        let mut conn = self.lock()?;
        let now = Utc::now().timestamp_millis();
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE memory_record SET archived = 1, archived_at = ?1
                 WHERE id = ?2 AND archived = 0",
            )?;
            for id in ids {
                changed += stmt.execute(params![now, id])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    /// Full-text search over unarchived records, best match first
    pub fn search_records(
        &self,
        owner_id: &str,
        text: &str,
        window: &SimilarityWindow,
    ) -> Result<Vec<IndexHit>> {
        let Some(fts_query) = Self::fts_query(text) else {
            return Ok(Vec::new());
        };

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.rowid
             FROM memory_record_fts f
             JOIN memory_record r ON r.rowid = f.rowid
             WHERE memory_record_fts MATCH ?1
               AND r.owner_id = ?2
               AND r.archived = 0
               AND r.created_at >= ?3
               AND r.importance >= ?4
             ORDER BY bm25(memory_record_fts), r.created_at DESC
             LIMIT ?5",
        )?;

        let since = window.since.map(|s| s.timestamp_millis()).unwrap_or(i64::MIN);
        let hits = stmt
            .query_map(
                params![
                    fts_query,
                    owner_id,
                    since,
                    window.importance_floor,
                    window.limit as i64
                ],
                |row| {
                    Ok(IndexHit {
                        record_id: row.get(0)?,
                        location: row.get(1)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    /// Quote each keyword so FTS5 operators in user text are inert
    fn fts_query(text: &str) -> Option<String> {
        let terms = keywords::extract_keywords(text, 3);
        if terms.is_empty() {
            return None;
        }
        Some(
            terms
                .iter()
                .map(|t| format!("\"{}\"", t.replace('"', "")))
                .collect::<Vec<_>>()
                .join(" OR "),
        )
    }

    /// Per-owner counts for diagnostics
    pub fn record_counts(&self, owner_id: &str) -> Result<RecordCounts> {
        let conn = self.lock()?;
        let (total, archived, keep_forever, curated, pattern_outliers): (i64, i64, i64, i64, i64) =
            conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(archived), 0),
                        COALESCE(SUM(keep_forever), 0),
                        COALESCE(SUM(CASE WHEN personal = 1 OR do_not_archive = 1 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(is_pattern_outlier), 0)
                 FROM memory_record WHERE owner_id = ?1",
                params![owner_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )?;
        let digests: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memory_digest WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )?;

        Ok(RecordCounts {
            total: total as usize,
            archived: archived as usize,
            keep_forever: keep_forever as usize,
            curated: curated as usize,
            pattern_outliers: pattern_outliers as usize,
            digests: digests as usize,
        })
    }

    fn map_record(row: &rusqlite::Row) -> rusqlite::Result<MemoryRecord> {
        let memory_type: String = row.get(3)?;
        let memory_type = memory_type.parse::<MemoryType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(MemoryRecord {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            session_id: row.get(2)?,
            memory_type,
            content: row.get(4)?,
            importance: row.get(5)?,
            emotion_intensity: row.get(6)?,
            emotion: row.get::<_, Option<String>>(7)?.map(EmotionKind::from),
            created_at: from_millis(row.get(8)?),
            last_accessed: row.get::<_, Option<i64>>(9)?.map(from_millis),
            access_count: row.get(10)?,
            keep_forever: row.get(11)?,
            okay_to_forget: row.get(12)?,
            personal: row.get(13)?,
            do_not_archive: row.get(14)?,
            graph_centrality: row.get(15)?,
            pattern_id: row.get(16)?,
            pattern_frequency: row.get(17)?,
            is_pattern_outlier: row.get(18)?,
            archived: row.get(19)?,
            archived_at: row.get::<_, Option<i64>>(20)?.map(from_millis),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Edge Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create or refresh an edge
    pub fn add_edge(&self, from_id: &str, to_id: &str, relation: &str, strength: f64) -> Result<()> {
        if from_id == to_id {
            return Err(Error::invalid_input("cannot link a record to itself"));
        }
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO memory_edge (from_id, to_id, relation, strength, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (from_id, to_id, relation) DO UPDATE SET strength = excluded.strength",
            params![
                from_id,
                to_id,
                relation,
                strength.clamp(0.0, 1.0),
                Utc::now().timestamp_millis()
            ],
        )?;
        Ok(())
    }

    /// Neighbours of a node in either direction
    pub fn neighbors(&self, id: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT to_id FROM memory_edge WHERE from_id = ?1
             UNION
             SELECT from_id FROM memory_edge WHERE to_id = ?1",
        )?;
        let ids = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Edges with both endpoints in `ids`
    pub fn edges_within(&self, ids: &[String]) -> Result<Vec<(String, String)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();

        let conn = self.lock()?;
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT DISTINCT from_id, to_id FROM memory_edge WHERE from_id IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql)?;
        let edges = stmt
            .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(edges
            .into_iter()
            .filter(|(_, to)| wanted.contains(to.as_str()))
            .collect())
    }

    /// Breadth-first traversal, each node reported at its shortest depth
    pub fn traverse(&self, start_id: &str, max_depth: usize) -> Result<Vec<PathStep>> {
        let mut visited: HashMap<String, usize> = HashMap::new();
        visited.insert(start_id.to_string(), 0);

        let mut queue = VecDeque::from([(start_id.to_string(), 0usize)]);
        let mut path = Vec::new();

        while let Some((id, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for next in self.neighbors(&id)? {
                if visited.contains_key(&next) {
                    continue;
                }
                visited.insert(next.clone(), depth + 1);
                path.push(PathStep {
                    record_id: next.clone(),
                    depth: depth + 1,
                });
                queue.push_back((next, depth + 1));
            }
        }

        Ok(path)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Vector Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Store or replace a record's embedding
    pub fn upsert_vector(&self, owner_id: &str, record_id: &str, vector: &[f32]) -> Result<()> {
        let blob: Vec<u8> = vector.iter().flat_map(|v| v.to_le_bytes()).collect();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO memory_vector (record_id, owner_id, dimensions, vector, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (record_id) DO UPDATE SET
                dimensions = excluded.dimensions,
                vector = excluded.vector,
                updated_at = excluded.updated_at",
            params![
                record_id,
                owner_id,
                vector.len() as i64,
                blob,
                Utc::now().timestamp_millis()
            ],
        )?;
        Ok(())
    }

    /// Embeddings of an owner's unarchived records
    pub fn load_vectors(&self, owner_id: &str) -> Result<Vec<(String, Vec<f32>)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT v.record_id, v.vector
             FROM memory_vector v
             JOIN memory_record r ON r.id = v.record_id
             WHERE v.owner_id = ?1 AND r.archived = 0",
        )?;
        let rows = stmt
            .query_map(params![owner_id], |row| {
                let id: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((id, blob))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .map(|(id, blob)| {
                let vector = blob
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                (id, vector)
            })
            .collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Digest Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a digest unless its idempotency key already exists; returns the digest id
    pub fn insert_digest(&self, digest: &NewDigest) -> Result<String> {
        let conn = self.lock()?;

        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM memory_digest WHERE idempotency_key = ?1",
                params![digest.idempotency_key],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }

        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO memory_digest
             (id, owner_id, period_type, period_id, source_record_count, summary,
              themes_json, keywords_json, questions_asked, idempotency_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                digest.owner_id,
                digest.period_type.as_str(),
                digest.period_id,
                digest.source_record_count as i64,
                digest.summary,
                serde_json::to_string(&digest.themes)?,
                serde_json::to_string(&digest.keywords)?,
                digest.questions_asked as i64,
                digest.idempotency_key,
                Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(id)
    }

    /// Digests for an owner, newest period first
    pub fn list_digests(&self, owner_id: &str) -> Result<Vec<Digest>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DIGEST_COLUMNS} FROM memory_digest
             WHERE owner_id = ?1 ORDER BY period_id DESC, created_at DESC"
        ))?;
        let digests = stmt
            .query_map(params![owner_id], Self::map_digest)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(digests)
    }

    fn map_digest(row: &rusqlite::Row) -> rusqlite::Result<Digest> {
        let period_type: String = row.get(2)?;
        let period_type = period_type.parse::<PeriodType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let themes: String = row.get(6)?;
        let keywords: String = row.get(7)?;

        Ok(Digest {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            period_type,
            period_id: row.get(3)?,
            source_record_count: row.get::<_, i64>(4)? as usize,
            summary: row.get(5)?,
            themes: parse_json_list(6, &themes)?,
            keywords: parse_json_list(7, &keywords)?,
            questions_asked: row.get::<_, i64>(8)? as usize,
            idempotency_key: row.get(9)?,
            created_at: from_millis(row.get(10)?),
        })
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn parse_json_list(idx: usize, raw: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn digest(owner: &str, key: &str) -> NewDigest {
        NewDigest {
            owner_id: owner.into(),
            period_type: PeriodType::Weekly,
            period_id: "2025-W07".into(),
            source_record_count: 3,
            summary: "Weekly digest".into(),
            themes: vec!["deploy".into()],
            keywords: vec!["deploy".into(), "staging".into()],
            questions_asked: 1,
            idempotency_key: key.into(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Records
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_insert_and_get_record() {
        let db = db();
        let created = db
            .insert_record(
                &NewMemoryRecord::new("ci-1", "Learned the deploy pipeline")
                    .with_type(MemoryType::Knowledge)
                    .with_emotion("surprise", 0.6)
                    .keep_forever(),
            )
            .unwrap();

        let fetched = db.get_record(&created.id).unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.memory_type, MemoryType::Knowledge);
        assert_eq!(fetched.emotion, Some(EmotionKind::Surprise));
        assert!(fetched.keep_forever);
        assert!(!fetched.archived);
        assert!(db.get_record("missing").unwrap().is_none());
    }

    #[test]
    fn test_insert_rejects_conflicting_flags() {
        let db = db();
        let result = db.insert_record(
            &NewMemoryRecord::new("ci-1", "content")
                .keep_forever()
                .okay_to_forget(),
        );
        assert!(result.unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_list_records_filters() {
        let db = db();
        let now = Utc::now();
        let old = db
            .insert_record(&NewMemoryRecord::new("ci-1", "old").created_at(now - Duration::days(30)))
            .unwrap();
        let recent = db.insert_record(&NewMemoryRecord::new("ci-1", "recent")).unwrap();
        db.insert_record(&NewMemoryRecord::new("ci-2", "other owner")).unwrap();

        let all = db.list_records(&RecordQuery::hot("ci-1")).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, old.id);

        let before = db
            .list_records(&RecordQuery {
                created_before: Some(now - Duration::days(7)),
                ..RecordQuery::hot("ci-1")
            })
            .unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].id, old.id);

        db.mark_archived(&[recent.id.clone()]).unwrap();
        let hot = db.list_records(&RecordQuery::hot("ci-1")).unwrap();
        assert_eq!(hot.len(), 1);
    }

    #[test]
    fn test_metadata_update_and_touch() {
        let db = db();
        let record = db.insert_record(&NewMemoryRecord::new("ci-1", "content")).unwrap();

        db.update_metadata(
            &record.id,
            &MetadataUpdate {
                importance: Some(1.4),
                centrality: Some(0.5),
                ..Default::default()
            },
        )
        .unwrap();
        db.touch_record(&record.id).unwrap();

        let updated = db.get_record(&record.id).unwrap().unwrap();
        assert_eq!(updated.importance, 1.0);
        assert_eq!(updated.graph_centrality, 0.5);
        assert_eq!(updated.access_count, 1);
        assert!(updated.last_accessed.is_some());

        let err = db
            .update_metadata("missing", &MetadataUpdate {
                importance: Some(0.1),
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_mark_archived_is_idempotent() {
        let db = db();
        let a = db.insert_record(&NewMemoryRecord::new("ci-1", "a")).unwrap();
        let b = db.insert_record(&NewMemoryRecord::new("ci-1", "b")).unwrap();

        let ids = vec![a.id.clone(), b.id.clone()];
        assert_eq!(db.mark_archived(&ids).unwrap(), 2);
        assert_eq!(db.mark_archived(&ids).unwrap(), 0);
        assert!(db.get_record(&a.id).unwrap().unwrap().archived_at.is_some());
    }

    #[test]
    fn test_set_pattern() {
        let db = db();
        let record = db.insert_record(&NewMemoryRecord::new("ci-1", "content")).unwrap();
        db.set_pattern(
            &record.id,
            &PatternAssignment {
                pattern_id: "pattern-1".into(),
                frequency: 4,
                is_outlier: true,
            },
        )
        .unwrap();

        let updated = db.get_record(&record.id).unwrap().unwrap();
        assert_eq!(updated.pattern_id.as_deref(), Some("pattern-1"));
        assert_eq!(updated.pattern_frequency, 4);
        assert!(updated.is_pattern_outlier);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Full-text search
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_search_records_window_and_floor() {
        let db = db();
        let now = Utc::now();
        let fresh = db
            .insert_record(
                &NewMemoryRecord::new("ci-1", "Deploy the staging server").with_importance(0.75),
            )
            .unwrap();
        db.insert_record(
            &NewMemoryRecord::new("ci-1", "Deploy the staging server again")
                .with_importance(0.25),
        )
        .unwrap();
        db.insert_record(
            &NewMemoryRecord::new("ci-1", "Deploy staging last month")
                .with_importance(0.75)
                .created_at(now - Duration::days(30)),
        )
        .unwrap();

        let hits = db
            .search_records(
                "ci-1",
                "staging deploy",
                &SimilarityWindow {
                    since: Some(now - Duration::hours(24)),
                    importance_floor: 0.5,
                    limit: 10,
                },
            )
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record_id, fresh.id);
    }

    #[test]
    fn test_search_ignores_fts_syntax() {
        let db = db();
        db.insert_record(&NewMemoryRecord::new("ci-1", "quoted \"NEAR\" text")).unwrap();

        let hits = db
            .search_records("ci-1", "\"NEAR\" AND OR (", &SimilarityWindow::default())
            .unwrap();
        assert_eq!(hits.len(), 1);

        let none = db.search_records("ci-1", "?? !!", &SimilarityWindow::default()).unwrap();
        assert!(none.is_empty());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Edges, vectors, digests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_traverse_breadth_first() {
        let db = db();
        db.add_edge("a", "b", "related", 1.0).unwrap();
        db.add_edge("b", "c", "related", 1.0).unwrap();
        db.add_edge("c", "d", "related", 1.0).unwrap();
        db.add_edge("e", "a", "related", 1.0).unwrap();

        let path = db.traverse("a", 2).unwrap();
        let mut found: Vec<(String, usize)> =
            path.into_iter().map(|s| (s.record_id, s.depth)).collect();
        found.sort();
        assert_eq!(
            found,
            vec![("b".into(), 1), ("c".into(), 2), ("e".into(), 1)]
        );

        assert!(db.add_edge("a", "a", "related", 1.0).is_err());
    }

    #[test]
    fn test_edges_within() {
        let db = db();
        db.add_edge("a", "b", "related", 1.0).unwrap();
        db.add_edge("a", "z", "related", 1.0).unwrap();

        let edges = db.edges_within(&["a".into(), "b".into()]).unwrap();
        assert_eq!(edges, vec![("a".to_string(), "b".to_string())]);
    }

    #[test]
    fn test_vectors_round_trip_and_skip_archived() {
        let db = db();
        let record = db.insert_record(&NewMemoryRecord::new("ci-1", "vector me")).unwrap();
        db.upsert_vector("ci-1", &record.id, &[0.5, -1.25, 3.0]).unwrap();

        let vectors = db.load_vectors("ci-1").unwrap();
        assert_eq!(vectors, vec![(record.id.clone(), vec![0.5, -1.25, 3.0])]);

        db.mark_archived(&[record.id]).unwrap();
        assert!(db.load_vectors("ci-1").unwrap().is_empty());
    }

    #[test]
    fn test_insert_digest_idempotent() {
        let db = db();
        let first = db.insert_digest(&digest("ci-1", "key-1")).unwrap();
        let again = db.insert_digest(&digest("ci-1", "key-1")).unwrap();
        assert_eq!(first, again);

        db.insert_digest(&digest("ci-1", "key-2")).unwrap();
        let digests = db.list_digests("ci-1").unwrap();
        assert_eq!(digests.len(), 2);
        assert_eq!(digests[0].keywords, vec!["deploy", "staging"]);
        assert_eq!(db.record_counts("ci-1").unwrap().digests, 2);
    }

    #[test]
    fn test_open_file_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mnemo.db");

        let id = {
            let db = Database::open(&path).unwrap();
            db.insert_record(&NewMemoryRecord::new("ci-1", "persisted")).unwrap().id
        };

        let db = Database::open(&path).unwrap();
        assert!(db.get_record(&id).unwrap().is_some());
    }
}
