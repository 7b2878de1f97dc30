//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

/// Personal task tree: find, create and finish nodes with path queries
#[derive(Parser, Debug)]
#[command(name = "lifetree")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Turn debugging information on (-d info, -dd debug, -ddd trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub debug: u8,

    /// Outline file (default: data_file from config)
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub file: Option<PathBuf>,

    /// Config file replacing the global one
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the tree, or the subtrees a query matches
    Show {
        /// Query selecting the subtrees to show
        query: Option<String>,
        /// Indented `type: text` lines instead of a drawn tree
        #[arg(long)]
        outline: bool,
    },

    /// List nodes matching a query
    Find {
        /// Query text, e.g. "** > task: write report"
        query: String,
        /// Evaluate from the active node instead of the root
        #[arg(short, long)]
        active: bool,
    },

    /// Find a node or create it where the query points
    Create {
        /// Query text ending in a `type: text` segment
        query: String,
        /// Create even when a match exists
        #[arg(long)]
        new: bool,
        /// Evaluate from the active node instead of the root
        #[arg(short, long)]
        active: bool,
    },

    /// Make the matched node active, starting it and its parents
    Activate {
        query: String,
        /// Unfinish a finished node first
        #[arg(long)]
        force: bool,
    },

    /// Finish the matched node
    Finish { query: String },

    /// Reopen the matched node
    Unfinish { query: String },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Print a config template
    Template,

    /// Show config paths
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn given_repeated_debug_flag_when_parsing_then_counts_verbosity() {
        let cli = Cli::parse_from(["lifetree", "-dd", "find", "> task"]);
        assert_eq!(cli.debug, 2);
        assert!(matches!(cli.command, Some(Commands::Find { active: false, .. })));
    }
}
