//! Command-line interface for repolens
//!
//! The `run` function parses arguments with clap and routes to one of three commands:
//!
//! - **prs**: resolve configuration, read local commits, collect pull requests from Azure
//!   DevOps through the cache, link each one to commits, and print or save the result
//! - **cache**: show statistics for the pull request cache, clean it up, or clear it
//! - **init**: write a default `repolens.toml`
//!
//! Output goes through a [`Host`] so the commands can be driven from tests.

mod cache;
mod common;
mod host;
mod init;
mod progress_reporter;
mod prs;
mod run;

pub use cache::{CacheAction, CacheArgs, manage_cache};
pub use common::{ColorMode, CommonArgs, LogLevel};
pub use host::Host;
#[cfg(test)]
pub use host::TestHost;
pub use init::{InitArgs, init_config};
pub use progress_reporter::ProgressReporter;
pub use prs::{PrsArgs, process_pull_requests};
pub use run::run;
