//! CLI argument definitions using clap
//!
//! Commands:
//! - shardplan plan --catalog <path> [--config <path>]
//! - shardplan explain --catalog <path> [--config <path>]
//! - shardplan check-catalog --catalog <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// shardplan - ORDER BY and merge planning for partitioned SQL
#[derive(Parser, Debug)]
#[command(name = "shardplan")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log planner decisions to stderr
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Plan one resolved query read from stdin
    Plan {
        /// Path to catalog snapshot
        #[arg(long, default_value = "./catalog.json")]
        catalog: PathBuf,

        /// Path to planner configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Pretty-print the plan
        #[arg(long)]
        pretty: bool,
    },

    /// Explain the plan of one resolved query read from stdin
    Explain {
        /// Path to catalog snapshot
        #[arg(long, default_value = "./catalog.json")]
        catalog: PathBuf,

        /// Path to planner configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Load and validate a catalog snapshot
    CheckCatalog {
        /// Path to catalog snapshot
        #[arg(long, default_value = "./catalog.json")]
        catalog: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan() {
        let cli = Cli::try_parse_from(["shardplan", "plan", "--catalog", "c.json", "--verbose"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Plan { catalog, config, pretty } => {
                assert_eq!(catalog, PathBuf::from("c.json"));
                assert!(config.is_none());
                assert!(!pretty);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_check_catalog_default_path() {
        let cli = Cli::try_parse_from(["shardplan", "check-catalog"]).unwrap();
        assert!(matches!(cli.command, Command::CheckCatalog { .. }));
    }
}
