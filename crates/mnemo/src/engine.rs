//! Engine handle for CLI commands.
//!
//! The engine is opened once per process over the configured SQLite file.

use anyhow::{anyhow, bail, Context, Result};
use mnemo_core::backends::{Embedder, HashingEmbedder};
use mnemo_core::{Database, MemoryEngine};
use std::sync::{Arc, OnceLock};

use crate::config::Config;

/// Global engine (lazy initialized)
static ENGINE: OnceLock<MemoryEngine> = OnceLock::new();

/// Get or open the engine.
pub fn get_engine(config: &Config) -> Result<&'static MemoryEngine> {
    if let Some(engine) = ENGINE.get() {
        return Ok(engine);
    }

    config.ensure_dirs()?;
    let db = Database::open(&config.storage.database_path).with_context(|| {
        format!(
            "Failed to open database {}",
            config.storage.database_path.display()
        )
    })?;
    let engine = MemoryEngine::with_embedder(
        Arc::new(db),
        config.engine.clone(),
        embedder(&config.storage.embedder)?,
    )
    .context("Failed to start memory engine")?;

    tracing::debug!(path = %config.storage.database_path.display(), "engine opened");

    // Another thread may have won the race; either engine is fine
    let _ = ENGINE.set(engine);
    ENGINE.get().ok_or_else(|| anyhow!("memory engine not initialized"))
}

fn embedder(name: &str) -> Result<Arc<dyn Embedder>> {
    match name {
        "hashing" => Ok(Arc::new(HashingEmbedder::default())),
        #[cfg(feature = "embeddings")]
        "minilm" => Ok(Arc::new(mnemo_core::backends::vector::FastEmbedder::new())),
        #[cfg(not(feature = "embeddings"))]
        "minilm" => bail!("The minilm embedder requires building with --features embeddings"),
        other => bail!("Unknown embedder: {}. Use: hashing or minilm", other),
    }
}
