use super::Host;
use super::ProgressReporter;
use super::common::{CommonArgs, init_logging};
use crate::Result;
use crate::api::{PullRequestFilters, StatusFilter};
use crate::collector::{CollectRequest, CollectionOutcome, Collector, Progress};
use crate::config::{PartialConfig, Settings};
use crate::git::{self, LogOptions};
use crate::linking::TEMPORAL_WINDOW;
use crate::model::{ItemFailure, ProcessedPullRequest, PullRequestStatus};
use camino::Utf8PathBuf;
use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use ohno::{IntoAppError, bail};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::sync::Arc;

/// Shortest prefix of a commit hash shown on the console.
const SHORT_HASH_LEN: usize = 10;

#[derive(Parser, Debug)]
pub struct PrsArgs {
    /// Azure DevOps organization
    #[arg(long, value_name = "NAME")]
    pub organization: Option<String>,

    /// Azure DevOps project
    #[arg(long, value_name = "NAME")]
    pub project: Option<String>,

    /// Repository within the project (default is every repository in the project)
    #[arg(long, value_name = "NAME")]
    pub repository: Option<String>,

    /// Personal access token (prefer the `AZURE_DEVOPS_PAT` environment variable)
    #[arg(long, value_name = "TOKEN")]
    pub pat: Option<String>,

    /// Base URL of the Azure DevOps service
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Only pull requests with this status
    #[arg(long, value_enum, default_value = "all", help_heading = "Filters")]
    pub status: StatusFilter,

    /// Only pull requests created at or after this date (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_name = "DATE", value_parser = parse_date, help_heading = "Filters")]
    pub since: Option<DateTime<Utc>>,

    /// Only pull requests created before this date (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_name = "DATE", value_parser = parse_date, help_heading = "Filters")]
    pub until: Option<DateTime<Utc>>,

    /// Only pull requests from this source branch
    #[arg(long, value_name = "BRANCH", help_heading = "Filters")]
    pub source_branch: Option<String>,

    /// Only pull requests into this target branch
    #[arg(long, value_name = "BRANCH", help_heading = "Filters")]
    pub target_branch: Option<String>,

    /// Read commits from every ref instead of only HEAD
    #[arg(long)]
    pub all_refs: bool,

    /// Read at most this many commits
    #[arg(long, value_name = "COUNT")]
    pub max_commits: Option<usize>,

    /// Ignore cached results and fetch everything fresh
    #[arg(long)]
    pub refresh: bool,

    /// Disable the cache for this run
    #[arg(long, conflicts_with = "refresh")]
    pub no_cache: bool,

    /// Write the full report as JSON to PATH (`-` for standard output)
    #[arg(long, value_name = "PATH", help_heading = "Report Output")]
    pub json: Option<Utf8PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl PrsArgs {
    fn cli_layer(&self) -> PartialConfig {
        let mut layer = self.common.cli_layer();
        layer.organization.clone_from(&self.organization);
        layer.project.clone_from(&self.project);
        layer.repository.clone_from(&self.repository);
        layer.personal_access_token.clone_from(&self.pat);
        layer.api.base_url.clone_from(&self.base_url);
        if self.no_cache {
            layer.cache.enabled = Some(false);
        }
        layer
    }

    fn filters(&self) -> PullRequestFilters {
        PullRequestFilters {
            status: self.status,
            created_after: self.since,
            created_before: self.until,
            source_ref: self.source_branch.clone(),
            target_ref: self.target_branch.clone(),
        }
    }

    /// Commits that could link to the selected pull requests, with room for the temporal window.
    fn log_options(&self) -> LogOptions {
        LogOptions {
            since: self.since.and_then(|t| t.checked_sub_signed(TEMPORAL_WINDOW)),
            until: self.until.and_then(|t| t.checked_add_signed(TEMPORAL_WINDOW)),
            max_count: self.max_commits,
            all_refs: self.all_refs,
        }
    }
}

fn parse_date(value: &str) -> core::result::Result<DateTime<Utc>, String> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| format!("'{value}' is not a date (expected YYYY-MM-DD or RFC 3339)"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    organization: &'a str,
    project: &'a str,
    repository: Option<&'a str>,
    generated_at: DateTime<Utc>,
    #[serde(flatten)]
    outcome: &'a CollectionOutcome,
}

pub async fn process_pull_requests<H: Host>(host: &mut H, args: &PrsArgs) -> Result<()> {
    init_logging(args.common.log_level);

    let layers = vec![
        PartialConfig::defaults(),
        args.common.file_layer()?,
        PartialConfig::from_env(),
        args.common.detected_layer().await,
        args.cli_layer(),
    ];

    let commits = match git::read_commits(&args.common.repo, &args.log_options()).await {
        Ok(commits) => commits,
        Err(e) => {
            let _ = writeln!(host.error(), "warning: no commits to link against: {e:#}");
            Vec::new()
        }
    };

    let progress = Arc::new(ProgressReporter::new(args.common.log_level.progress_delay(), args.common.color.for_stderr()));
    let mut collector = Collector::new(layers, commits, Arc::clone(&progress) as Arc<dyn Progress>);

    let result = collect(&mut collector, args).await;
    collector.shutdown().await;
    progress.done();
    let (settings, outcome) = result?;

    if let Some(path) = &args.json {
        let report = Report {
            organization: &settings.organization,
            project: &settings.project,
            repository: settings.repository.as_deref(),
            generated_at: Utc::now(),
            outcome: &outcome,
        };
        let json = serde_json::to_string_pretty(&report).into_app_err("serializing report")?;
        if path == "-" {
            let _ = writeln!(host.output(), "{json}");
            return Ok(());
        }
        fs::write(path, json).into_app_err_with(|| format!("writing report to '{path}'"))?;
    }

    let mut console = String::new();
    render_console(&outcome, args.common.color.for_stdout(), &mut console);
    let _ = write!(host.output(), "{console}");
    Ok(())
}

async fn collect(collector: &mut Collector, args: &PrsArgs) -> Result<(Settings, CollectionOutcome)> {
    collector.initialize().await.into_app_err("could not start the pull request collector")?;
    let Some(settings) = collector.settings().cloned() else {
        bail!("collector has no settings after initialization");
    };

    let request = CollectRequest {
        filters: args.filters(),
        refresh: args.refresh,
    };
    let outcome = collector
        .collect_pull_request_data(&request)
        .await
        .into_app_err("could not collect pull requests")?;
    Ok((settings, outcome))
}

fn render_console(outcome: &CollectionOutcome, use_colors: bool, out: &mut String) {
    use core::fmt::Write;

    for record in &outcome.records {
        let _ = writeln!(out, "{}", headline(record, use_colors));
        for association in &record.associations {
            let hash = association.commit_hash.get(..SHORT_HASH_LEN).unwrap_or(&association.commit_hash);
            let _ = writeln!(out, "    {hash}  {:<14} {:.2}", association.method.as_str(), association.confidence);
        }
    }

    for ItemFailure { pull_request_id, title, reason } in &outcome.failures {
        let id = pull_request_id.map_or_else(|| "?".to_string(), |id| id.to_string());
        let line = format!("!{id} {title}: {reason}");
        let _ = writeln!(out, "{}", if use_colors { line.red().to_string() } else { line });
    }

    let linked = outcome.records.iter().filter(|r| !r.associations.is_empty()).count();
    let source = outcome.from_cache.map_or("Azure DevOps", |_| "cache");
    let _ = writeln!(
        out,
        "\n{} pull requests from {source}, {linked} linked to commits, {} failed; cache hit rate {:.0}%",
        outcome.records.len(),
        outcome.failures.len(),
        outcome.stats.hit_rate * 100.0
    );
}

fn headline(record: &ProcessedPullRequest, use_colors: bool) -> String {
    let pr = &record.pull_request;
    let status = match pr.status {
        PullRequestStatus::Active => "active",
        PullRequestStatus::Completed => "completed",
        PullRequestStatus::Abandoned => "abandoned",
        PullRequestStatus::Unknown => "unknown",
    };
    let status = format!("{status:<9}");

    if !use_colors {
        return format!("#{} {status} {}", pr.id, pr.title);
    }

    let status = match pr.status {
        PullRequestStatus::Completed => status.green().to_string(),
        PullRequestStatus::Abandoned => status.red().to_string(),
        PullRequestStatus::Active | PullRequestStatus::Unknown => status.yellow().to_string(),
    };
    format!("{} {status} {}", format!("#{}", pr.id).bold(), pr.title)
}
