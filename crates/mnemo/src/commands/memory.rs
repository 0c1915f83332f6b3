//! Memory formation commands: remember, observe, link.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use mnemo_core::convergence::AutoMemoryOutcome;
use mnemo_core::{MemoryType, NewMemoryRecord};

use crate::config::Config;
use crate::engine::get_engine;

/// Fields of `mnemo remember`
#[derive(Debug, Default)]
pub struct RememberArgs {
    pub content: String,
    pub memory_type: String,
    pub importance: Option<f64>,
    pub emotion: Option<String>,
    pub intensity: f64,
    pub session: Option<String>,
    pub keep_forever: bool,
    pub okay_to_forget: bool,
    pub personal: bool,
    pub do_not_archive: bool,
}

/// Build the record to store from command-line arguments.
pub fn build_record(owner: &str, args: RememberArgs) -> Result<NewMemoryRecord> {
    let memory_type: MemoryType = args.memory_type.parse()?;
    let mut record = NewMemoryRecord::new(owner, args.content).with_type(memory_type);

    if let Some(importance) = args.importance {
        record = record.with_importance(importance);
    }
    if let Some(emotion) = args.emotion {
        record = record.with_emotion(emotion, args.intensity);
    }
    if let Some(session) = args.session {
        record = record.with_session(session);
    }
    if args.keep_forever {
        record = record.keep_forever();
    }
    if args.okay_to_forget {
        record = record.okay_to_forget();
    }
    if args.personal {
        record = record.personal();
    }
    if args.do_not_archive {
        record = record.do_not_archive();
    }

    record.validate()?;
    Ok(record)
}

/// Store an explicit memory.
pub async fn remember(owner: &str, args: RememberArgs, config: &Config) -> Result<()> {
    let record = build_record(owner, args)?;
    let engine = get_engine(config)?;
    let stored = engine
        .remember(record)
        .await
        .context("Failed to store memory")?;

    println!(
        "{} Remembered {} for {}",
        "✓".green(),
        stored.memory_type.to_string().cyan(),
        owner.bold()
    );
    println!("  ID: {}", stored.id);
    println!("  Importance: {:.2}", stored.importance);
    if stored.keep_forever {
        println!("  {}", "Kept forever".yellow());
    }
    if stored.okay_to_forget {
        println!("  {}", "Okay to forget".dimmed());
    }

    Ok(())
}

/// Analyze one exchange for automatic memories.
pub async fn observe(owner: &str, user_input: &str, ci_response: &str, config: &Config) -> Result<()> {
    if user_input.trim().is_empty() && ci_response.trim().is_empty() {
        bail!("Nothing to observe: both turns are empty");
    }

    let engine = get_engine(config)?;
    let outcomes = engine
        .observe(owner, user_input, ci_response)
        .await
        .context("Failed to observe conversation")?;

    if outcomes.is_empty() {
        println!("{}", "Nothing memorable in this exchange.".dimmed());
        return Ok(());
    }

    for outcome in &outcomes {
        match outcome {
            AutoMemoryOutcome::Strengthened { record_id, signal } => {
                println!(
                    "{} Strengthened {} (convergence {:.2})",
                    "↑".yellow(),
                    record_id,
                    signal.combined_score
                );
            }
            AutoMemoryOutcome::Created { record_id } => {
                println!("{} Formed {}", "+".green(), record_id);
            }
        }
    }

    Ok(())
}

/// Relate two memories.
pub async fn link(from: &str, to: &str, relation: &str, strength: f64, config: &Config) -> Result<()> {
    let engine = get_engine(config)?;
    engine
        .link(from, to, relation, strength)
        .await
        .context("Failed to link memories")?;

    println!(
        "{} {} {} {}",
        "✓".green(),
        from,
        format!("-[{}]->", relation).cyan(),
        to
    );
    Ok(())
}
