//! CLI argument definitions using clap derive macros.

use clap::{Parser, Subcommand};

/// Long-term memory for conversational agents
///
/// Remember, archive, and recall memories kept in a local SQLite database.
#[derive(Parser, Debug)]
#[command(name = "mnemo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Owner (CI identity) whose memory is used
    #[arg(short, long, global = true, env = "MNEMO_OWNER")]
    pub owner: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Explicitly remember something
    Remember {
        /// Memory content
        content: String,

        /// Memory type (experience, knowledge, reflection, pattern, goal, decision)
        #[arg(short = 't', long = "type", default_value = "experience")]
        memory_type: String,

        /// Importance between 0 and 1
        #[arg(short, long)]
        importance: Option<f64>,

        /// Emotion label (surprise, fear, satisfaction, or any other)
        #[arg(short, long)]
        emotion: Option<String>,

        /// Emotional intensity between 0 and 1
        #[arg(long, default_value = "0.5", requires = "emotion")]
        intensity: f64,

        /// Session the memory belongs to
        #[arg(short, long)]
        session: Option<String>,

        /// Never archive this memory
        #[arg(long, conflicts_with = "okay_to_forget")]
        keep_forever: bool,

        /// Allow archiving regardless of score and age
        #[arg(long)]
        okay_to_forget: bool,

        /// Personal memory, never archived
        #[arg(long)]
        personal: bool,

        /// Exclude from archival
        #[arg(long)]
        do_not_archive: bool,
    },

    /// Analyze one exchange and form automatic memories
    Observe {
        /// What the user said
        user_input: String,

        /// What the CI answered
        #[arg(default_value = "")]
        ci_response: String,
    },

    /// Archive stale memories into weekly digests
    Archive {
        /// Only records older than this many days are considered
        #[arg(short, long)]
        max_age_days: Option<f64>,
    },

    /// Preview what the next archival pass would take
    AtRisk {
        /// Only records older than this many days are considered
        #[arg(short, long)]
        max_age_days: Option<f64>,

        /// Maximum records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Synthesized recall across every backend
    Recall {
        /// What to recall
        query: String,

        /// Preset (comprehensive, semantic, relationships, fast)
        #[arg(short, long)]
        preset: Option<String>,

        /// Merge algorithm (union, intersection, weighted, hierarchical)
        #[arg(short, long)]
        algorithm: Option<String>,

        /// Restrict to these backends (vector, graph, structured, attention)
        #[arg(short, long, value_delimiter = ',')]
        backends: Vec<String>,

        /// Maximum results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Drop backend scores below this
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Memories related to an existing memory
    Related {
        /// Memory ID
        record_id: String,

        /// Preset (comprehensive, semantic, relationships, fast)
        #[arg(short, long)]
        preset: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Everything every backend knows about a topic
    Know {
        /// Topic
        topic: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Relate two memories
    Link {
        /// Source memory ID
        from: String,

        /// Target memory ID
        to: String,

        /// Relation label
        #[arg(short, long, default_value = "related")]
        relation: String,

        /// Relation strength between 0 and 1
        #[arg(short, long, default_value = "1.0")]
        strength: f64,
    },

    /// List weekly digests
    Digests {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show memory statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_recall_backends_are_comma_separated() {
        let cli = Cli::try_parse_from(["mnemo", "recall", "flaky tests", "-b", "vector,graph"]).unwrap();
        match cli.command {
            Commands::Recall { query, backends, .. } => {
                assert_eq!(query, "flaky tests");
                assert_eq!(backends, vec!["vector", "graph"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_consent_flags_conflict() {
        let result = Cli::try_parse_from([
            "mnemo",
            "remember",
            "x",
            "--keep-forever",
            "--okay-to-forget",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_owner_flag() {
        let cli = Cli::try_parse_from(["mnemo", "stats", "--owner", "ci-7"]).unwrap();
        assert_eq!(cli.owner.as_deref(), Some("ci-7"));
    }
}
