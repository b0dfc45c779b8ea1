//! CLI module for shardplan
//!
//! Provides command-line interface for:
//! - plan: Compile one resolved query read from stdin
//! - explain: Render the plan (or rejection) of one query
//! - check-catalog: Load and validate a catalog snapshot

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check_catalog, explain, plan, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{parse_request, read_request, write_error, write_response};
