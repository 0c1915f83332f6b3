//! mnemo-core - Long-term memory engine for conversational agents
//!
//! This crate owns the memory lifecycle and recall synthesis:
//!
//! - **db**: SQLite persistence (records, full-text index, graph, vectors, digests)
//! - **backends**: Storage traits and their SQLite / in-process implementations
//! - **lifecycle**: Preservation scoring, pattern and centrality analysis, archival
//! - **convergence**: Automatic memory formation and strengthening
//! - **synthesis**: Concurrent multi-backend recall
//! - **engine**: Facade tying everything together

pub mod backends;
pub mod config;
pub mod convergence;
pub mod db;
pub mod engine;
pub mod error;
pub mod keywords;
pub mod lifecycle;
pub mod synthesis;
pub mod types;

// Re-export commonly used types
pub use config::EngineConfig;
pub use db::Database;
pub use engine::{EngineStats, MemoryEngine};
pub use error::{Error, Result};
pub use lifecycle::{ArchiveReport, AtRiskRecord};
pub use synthesis::{Algorithm, Backend, RecallOptions, SynthesisResult, SynthesisResultSet};
pub use types::{Digest, EmotionKind, MemoryRecord, MemoryType, NewMemoryRecord};
