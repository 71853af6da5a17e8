//! Command dispatch logic for repolens

use super::{CacheArgs, InitArgs, PrsArgs, init_config, manage_cache, process_pull_requests};
use crate::{Host, Result};
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "repolens", version, author, long_about = None)]
#[command(about = "Link Azure DevOps pull requests to the commits in a local repository")]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch pull requests and link them to local commits
    Prs(Box<PrsArgs>),
    /// Inspect or maintain the pull request cache
    Cache(CacheArgs),
    /// Generate a default configuration file
    Init(InitArgs),
}

/// Dispatch command-line arguments to the appropriate handler
///
/// # Errors
///
/// Returns an error if the executed command fails
pub async fn run<I, T, H>(host: &mut H, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    H: Host,
{
    match &Cli::parse_from(args).command {
        Command::Prs(prs_args) => process_pull_requests(host, prs_args).await,
        Command::Cache(cache_args) => manage_cache(host, cache_args).await,
        Command::Init(init_args) => init_config(host, init_args),
    }
}
