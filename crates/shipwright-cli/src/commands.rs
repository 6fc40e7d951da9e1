//! CLI command definitions.

use clap::{Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new pipeline
    Init,

    /// Validate pipeline configuration
    Validate {
        /// Path to pipeline file
        #[arg(default_value = "shipwright.yaml")]
        path: String,
    },

    /// Show the job graph for a pipeline
    Graph {
        /// Path to pipeline file
        #[arg(default_value = "shipwright.yaml")]
        path: String,
    },

    /// Execute a run for an event
    Run {
        /// Path to pipeline file
        #[arg(short, long)]
        file: Option<String>,

        /// Triggering event kind
        #[arg(long, value_enum, default_value_t = EventKind::Push)]
        event: EventKind,

        /// Git ref: branch name, or tag name with --tag
        #[arg(long = "ref", default_value = "main")]
        git_ref: String,

        /// The ref is a tag
        #[arg(long)]
        tag: bool,

        /// Extra variables as KEY=VALUE
        #[arg(long = "var")]
        vars: Vec<String>,

        /// Destination package index directory
        #[arg(long)]
        index: Option<PathBuf>,

        /// Workspace directory (defaults to the current directory)
        #[arg(long)]
        workspace: Option<PathBuf>,

        /// Keep the run's artifact store on disk
        #[arg(long)]
        keep_artifacts: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EventKind {
    Push,
    PullRequest,
    Manual,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set configuration value
    Set {
        /// Key
        key: String,

        /// Value
        value: String,
    },
}
