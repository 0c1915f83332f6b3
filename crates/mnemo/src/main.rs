//! mnemo - Long-term memory CLI
//!
//! Remember, archive, and recall memories for long-lived conversational agents.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;
mod config;
mod engine;

use cli::{Cli, Commands};
use commands::memory::RememberArgs;
use commands::recall::RecallArgs;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("mnemo=info".parse()?))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::load()?;
    let owner = config.resolve_owner(cli.owner.as_deref());

    // Execute command
    match cli.command {
        Commands::Remember {
            content,
            memory_type,
            importance,
            emotion,
            intensity,
            session,
            keep_forever,
            okay_to_forget,
            personal,
            do_not_archive,
        } => {
            let args = RememberArgs {
                content,
                memory_type,
                importance,
                emotion,
                intensity,
                session,
                keep_forever,
                okay_to_forget,
                personal,
                do_not_archive,
            };
            commands::memory::remember(&owner, args, &config).await
        }
        Commands::Observe {
            user_input,
            ci_response,
        } => commands::memory::observe(&owner, &user_input, &ci_response, &config).await,
        Commands::Link {
            from,
            to,
            relation,
            strength,
        } => commands::memory::link(&from, &to, &relation, strength, &config).await,
        Commands::Archive { max_age_days } => {
            commands::lifecycle::archive(&owner, max_age_days, &config).await
        }
        Commands::AtRisk {
            max_age_days,
            limit,
            json,
        } => commands::lifecycle::at_risk(&owner, max_age_days, limit, json, &config).await,
        Commands::Digests { json } => commands::lifecycle::digests(&owner, json, &config).await,
        Commands::Recall {
            query,
            preset,
            algorithm,
            backends,
            limit,
            threshold,
            json,
        } => {
            let args = RecallArgs {
                preset,
                algorithm,
                backends,
                limit,
                threshold,
            };
            commands::recall::recall(&owner, &query, args, json, &config).await
        }
        Commands::Related {
            record_id,
            preset,
            json,
        } => commands::recall::related(&owner, &record_id, preset, json, &config).await,
        Commands::Know { topic, json } => commands::recall::know(&owner, &topic, json, &config).await,
        Commands::Stats { json } => commands::stats::execute(&owner, json, &config).await,
        Commands::Version => {
            println!("mnemo {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
