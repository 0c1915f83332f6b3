//! Lifecycle commands: archive, at-risk preview, digest listing.

use anyhow::{Context, Result};
use colored::Colorize;
use mnemo_core::Error as CoreError;

use crate::config::Config;
use crate::engine::get_engine;

/// Run one archival pass.
pub async fn archive(owner: &str, max_age_days: Option<f64>, config: &Config) -> Result<()> {
    let max_age_days = max_age_days.unwrap_or(config.lifecycle.max_age_days);
    let engine = get_engine(config)?;

    let report = match engine.archive(owner, max_age_days).await {
        Ok(report) => report,
        Err(CoreError::ConsistencyRisk { digest_id, message }) => {
            eprintln!(
                "{} Digest {} was stored but its records are still hot: {}",
                "!".red().bold(),
                digest_id,
                message
            );
            eprintln!("  Re-run `mnemo archive`; the digest will be reused.");
            anyhow::bail!("Archival left digest {} unapplied", digest_id);
        }
        Err(e) => return Err(e).context("Archival failed"),
    };

    if report.archived == 0 {
        println!(
            "{} Nothing to archive ({} memories evaluated)",
            "✓".green(),
            report.evaluated
        );
        return Ok(());
    }

    println!(
        "{} Archived {} of {} memories into {} digest(s)",
        "✓".green(),
        report.archived.to_string().bold(),
        report.evaluated,
        report.digest_ids.len()
    );
    for pattern in &report.patterns {
        println!("  {}", pattern.describe().dimmed());
    }
    if !report.preserved_outliers.is_empty() {
        println!(
            "  Preserved as outliers: {}",
            report.preserved_outliers.len().to_string().yellow()
        );
    }
    if !report.preserved_by_centrality.is_empty() {
        println!(
            "  Preserved by centrality: {}",
            report.preserved_by_centrality.len().to_string().yellow()
        );
    }
    if !report.centrality_applied {
        println!("  {}", "Centrality stage skipped".yellow());
    }

    Ok(())
}

/// Preview records the next pass would archive.
pub async fn at_risk(
    owner: &str,
    max_age_days: Option<f64>,
    limit: usize,
    json: bool,
    config: &Config,
) -> Result<()> {
    let max_age_days = max_age_days.unwrap_or(config.lifecycle.max_age_days);
    let engine = get_engine(config)?;
    let mut records = engine
        .at_risk(owner, max_age_days)
        .await
        .context("Failed to score memories")?;
    let total = records.len();
    records.truncate(limit);

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{}", "No memories at risk.".green());
        return Ok(());
    }

    println!("{} {} memories at risk", "⚠".yellow(), total.to_string().bold());
    println!();
    for record in &records {
        println!(
            "  {} {:>6.1}  {:>5.0}d  {}",
            record.record_id[..8.min(record.record_id.len())].dimmed(),
            record.score,
            record.age_days,
            record.preview
        );
    }
    if total > records.len() {
        println!("  {}", format!("... and {} more", total - records.len()).dimmed());
    }

    Ok(())
}

/// List weekly digests.
pub async fn digests(owner: &str, json: bool, config: &Config) -> Result<()> {
    let engine = get_engine(config)?;
    let digests = engine
        .digests(owner)
        .await
        .context("Failed to list digests")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&digests)?);
        return Ok(());
    }

    if digests.is_empty() {
        println!("{}", "No digests yet.".dimmed());
        return Ok(());
    }

    for digest in &digests {
        println!(
            "{} {} ({} memories)",
            digest.period_id.cyan().bold(),
            digest.period_type.as_str(),
            digest.source_record_count
        );
        println!("  {}", digest.summary);
        if !digest.keywords.is_empty() {
            println!("  Keywords: {}", digest.keywords.join(", ").dimmed());
        }
        println!();
    }

    Ok(())
}
