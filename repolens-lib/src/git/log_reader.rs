use crate::Result;
use crate::model::CommitRecord;
use camino::Utf8Path;
use chrono::{DateTime, SecondsFormat, Utc};
use core::time::Duration;
use ohno::{IntoAppError, bail};
use tokio::process::Command;

/// Log target for git access
const LOG_TARGET: &str = "       git";

const GIT_TIMEOUT: Duration = Duration::from_mins(2);

const FIELD_SEPARATOR: char = '\u{1f}';
const RECORD_SEPARATOR: char = '\u{1e}';

/// hash, author name, author email, author date (ISO 8601), parent hashes, raw body
const LOG_FORMAT: &str = "--format=%H%x1f%an%x1f%ae%x1f%aI%x1f%P%x1f%B%x1e";

/// Which commits to read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub max_count: Option<usize>,

    /// Read every ref instead of only `HEAD`.
    pub all_refs: bool,
}

/// Reads commits from the repository at `repo`.
pub async fn read_commits(repo: &Utf8Path, options: &LogOptions) -> Result<Vec<CommitRecord>> {
    let mut args: Vec<String> = vec!["-C".into(), repo.to_string(), "log".into(), LOG_FORMAT.into()];
    if options.all_refs {
        args.push("--all".into());
    }
    if let Some(since) = options.since {
        args.push(format!("--since={}", since.to_rfc3339_opts(SecondsFormat::Secs, true)));
    }
    if let Some(until) = options.until {
        args.push(format!("--until={}", until.to_rfc3339_opts(SecondsFormat::Secs, true)));
    }
    if let Some(max_count) = options.max_count {
        args.push(format!("--max-count={max_count}"));
    }

    let start_time = std::time::Instant::now();
    let output = run_git_with_timeout(&args).await?;
    check_git_output(&output, "git log")?;

    let commits = parse_log(&String::from_utf8_lossy(&output.stdout));
    log::debug!(
        target: LOG_TARGET,
        "Read {} commits from '{repo}' in {:.3}s",
        commits.len(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(commits)
}

/// The URL of the `origin` remote, if the repository has one.
pub async fn remote_url(repo: &Utf8Path) -> Result<Option<String>> {
    let args = ["-C".to_string(), repo.to_string(), "remote".into(), "get-url".into(), "origin".into()];
    let output = run_git_with_timeout(&args).await?;
    if !output.status.success() {
        log::debug!(target: LOG_TARGET, "No origin remote in '{repo}': {}", String::from_utf8_lossy(&output.stderr).trim());
        return Ok(None);
    }

    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok((!url.is_empty()).then_some(url))
}

/// Parses `git log` output produced with the reader's format string.
///
/// Malformed records are skipped.
#[must_use]
pub fn parse_log(output: &str) -> Vec<CommitRecord> {
    output
        .split(RECORD_SEPARATOR)
        .map(|record| record.trim_start_matches(['\n', '\r']))
        .filter(|record| !record.trim().is_empty())
        .filter_map(|record| {
            let commit = parse_record(record);
            if commit.is_none() {
                log::warn!(target: LOG_TARGET, "Skipping malformed git log record: {:.60}", record.trim());
            }
            commit
        })
        .collect()
}

fn parse_record(record: &str) -> Option<CommitRecord> {
    let mut fields = record.splitn(6, FIELD_SEPARATOR);
    let hash = fields.next()?.trim();
    let author = fields.next()?.trim();
    let author_email = fields.next()?.trim();
    let date = DateTime::parse_from_rfc3339(fields.next()?.trim()).ok()?.with_timezone(&Utc);
    let parents = fields.next()?;
    let message = fields.next()?.trim_end();

    if hash.is_empty() {
        return None;
    }

    Some(CommitRecord {
        hash: hash.to_string(),
        author: author.to_string(),
        author_email: author_email.to_string(),
        date,
        message: message.to_string(),
        is_merge: parents.split_whitespace().count() > 1,
    })
}

fn check_git_output(output: &std::process::Output, operation: &str) -> Result<()> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{operation} failed: {}", stderr.trim());
    }
    Ok(())
}

async fn run_git_with_timeout(args: &[String]) -> Result<std::process::Output> {
    let child = Command::new("git")
        .args(args)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .into_app_err("could not spawn git command")?;

    match tokio::time::timeout(GIT_TIMEOUT, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(e).into_app_err_with(|| format!("'git {}' failed to run", args.join(" "))),
        Err(_) => {
            bail!("'git {}' timed out after {} seconds", args.join(" "), GIT_TIMEOUT.as_secs());
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(hash: &str, date: &str, parents: &str, body: &str) -> String {
        format!("{hash}\u{1f}Ada Lovelace\u{1f}ada@contoso.com\u{1f}{date}\u{1f}{parents}\u{1f}{body}\u{1e}\n")
    }

    #[test]
    fn test_parse_records() {
        let output = [
            record("aaa", "2024-05-01T12:00:00+02:00", "p1", "Add parser\n\nWith a body\n"),
            record("bbb", "2024-05-02T08:30:00Z", "p1 p2", "Merged PR 42: Fix bug\n"),
        ]
        .concat();

        let commits = parse_log(&output);
        assert_eq!(commits.len(), 2);

        assert_eq!(commits[0].hash, "aaa");
        assert_eq!(commits[0].author, "Ada Lovelace");
        assert_eq!(commits[0].author_email, "ada@contoso.com");
        assert_eq!(commits[0].date, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        assert_eq!(commits[0].message, "Add parser\n\nWith a body");
        assert!(!commits[0].is_merge);

        assert_eq!(commits[1].title(), "Merged PR 42: Fix bug");
        assert!(commits[1].is_merge);
    }

    #[test]
    fn test_root_commit_has_no_parents() {
        let commits = parse_log(&record("aaa", "2024-05-01T12:00:00Z", "", "Initial commit"));
        assert_eq!(commits.len(), 1);
        assert!(!commits[0].is_merge);
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let output = [
            "garbage\u{1e}\n".to_string(),
            record("bad", "yesterday", "p1", "msg"),
            record("good", "2024-05-01T12:00:00Z", "p1", "msg"),
        ]
        .concat();

        let commits = parse_log(&output);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].hash, "good");
    }

    #[test]
    fn test_empty_output() {
        assert!(parse_log("").is_empty());
        assert!(parse_log("\n").is_empty());
    }
}
