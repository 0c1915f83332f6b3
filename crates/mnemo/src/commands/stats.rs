//! Memory statistics.

use anyhow::{Context, Result};
use colored::Colorize;

use crate::config::Config;
use crate::engine::get_engine;

/// Show counts for one owner.
pub async fn execute(owner: &str, json: bool, config: &Config) -> Result<()> {
    let engine = get_engine(config)?;
    let stats = engine
        .stats(owner)
        .context("Failed to get memory stats")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{} Memory Statistics for {}", "📊".cyan(), owner.bold());
    println!();
    println!("  Total memories: {}", stats.total.to_string().bold());
    println!("    Hot:      {}", stats.hot().to_string().green());
    println!("    Archived: {}", stats.archived.to_string().dimmed());
    println!("  Digests: {}", stats.digests);
    println!();
    println!("  Protected:");
    println!("    Keep forever:     {}", stats.keep_forever.to_string().yellow());
    println!("    Curated:          {}", stats.curated.to_string().yellow());
    println!("    Pattern outliers: {}", stats.pattern_outliers.to_string().yellow());
    println!();
    println!("  This session:");
    println!("    Working memory:      {}", stats.working_memory);
    println!(
        "    Formed (conscious):  {}",
        stats.convergence.conscious_memories
    );
    println!(
        "    Formed (automatic):  {}",
        stats.convergence.subconscious_memories
    );
    println!(
        "    Strengthened:        {} ({:.0}% boost ratio)",
        stats.convergence.memories_strengthened,
        stats.convergence.boost_ratio * 100.0
    );

    Ok(())
}
