//! Recall commands: synthesized recall, related memories, topic summary.

use anyhow::{Context, Result};
use colored::Colorize;
use mnemo_core::{Algorithm, Backend, MemoryEngine, RecallOptions, SynthesisResult, SynthesisResultSet};

use crate::config::Config;
use crate::engine::get_engine;

/// Overrides on top of a preset
#[derive(Debug, Default)]
pub struct RecallArgs {
    pub preset: Option<String>,
    pub algorithm: Option<String>,
    pub backends: Vec<String>,
    pub limit: Option<usize>,
    pub threshold: Option<f64>,
}

/// Resolve a preset and apply command-line overrides.
pub fn build_options(engine: &MemoryEngine, args: RecallArgs, config: &Config) -> Result<RecallOptions> {
    let preset = args
        .preset
        .unwrap_or_else(|| config.lifecycle.recall_preset.clone());
    let mut options = engine.recall_options(&preset)?;

    if let Some(algorithm) = args.algorithm {
        options = options.with_algorithm(algorithm.parse::<Algorithm>()?);
    }
    if !args.backends.is_empty() {
        let backends = args
            .backends
            .iter()
            .map(|b| b.parse::<Backend>())
            .collect::<mnemo_core::Result<Vec<_>>>()?;
        options = options.with_backends(backends);
    }
    if let Some(limit) = args.limit {
        options = options.with_max_results(limit);
    }
    if let Some(threshold) = args.threshold {
        options = options.with_threshold(threshold);
    }

    Ok(options)
}

/// Synthesized recall for a query.
pub async fn recall(owner: &str, query: &str, args: RecallArgs, json: bool, config: &Config) -> Result<()> {
    let engine = get_engine(config)?;
    let options = build_options(engine, args, config)?;
    let set = engine
        .recall(owner, query, &options)
        .await
        .context("Recall failed")?;
    print_results(&set, json)
}

/// Memories related to an existing one.
pub async fn related(
    owner: &str,
    record_id: &str,
    preset: Option<String>,
    json: bool,
    config: &Config,
) -> Result<()> {
    let engine = get_engine(config)?;
    let options = build_options(
        engine,
        RecallArgs {
            preset,
            ..RecallArgs::default()
        },
        config,
    )?;
    let set = engine
        .related(owner, record_id, &options)
        .await
        .context("Related recall failed")?;
    print_results(&set, json)
}

/// Everything known about a topic.
pub async fn know(owner: &str, topic: &str, json: bool, config: &Config) -> Result<()> {
    let engine = get_engine(config)?;
    let set = engine
        .what_do_i_know(owner, topic)
        .await
        .context("Recall failed")?;
    print_results(&set, json)
}

fn print_results(set: &SynthesisResultSet, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(set)?);
        return Ok(());
    }

    if !set.failed_backends.is_empty() {
        let failed: Vec<&str> = set.failed_backends.iter().map(|b| b.as_str()).collect();
        println!("{} Unavailable: {}", "⚠".yellow(), failed.join(", "));
    }
    if !set.skipped_backends.is_empty() {
        let skipped: Vec<&str> = set.skipped_backends.iter().map(|b| b.as_str()).collect();
        println!("{}", format!("Not queried: {}", skipped.join(", ")).dimmed());
    }

    if set.is_empty() {
        println!("{}", "Nothing recalled.".dimmed());
        return Ok(());
    }

    for (i, result) in set.results.iter().enumerate() {
        println!(
            "{}. {} {}",
            i + 1,
            format!("[{:.2}]", result.score).cyan(),
            result.content
        );
        println!(
            "   {}  {}  {}",
            result.record_id.dimmed(),
            result.timestamp.format("%Y-%m-%d").to_string().dimmed(),
            found_by(result).dimmed()
        );
    }

    Ok(())
}

fn found_by(result: &SynthesisResult) -> String {
    Backend::PRIORITY
        .iter()
        .filter(|b| result.found_by.get(**b))
        .map(|b| format!("{}:{:.2}", b.as_str(), result.scores.get(*b)))
        .collect::<Vec<_>>()
        .join(" ")
}
