use super::{LinkStrategy, commits_near};
use crate::model::{Association, CommitRecord, LinkMethod, PullRequest};
use chrono::TimeDelta;
use regex::{Regex, RegexBuilder};

/// Log target for merge-commit linkage
const LOG_TARGET: &str = "     merge";

pub const MERGE_COMMIT_CONFIDENCE: f64 = 0.95;
pub const MERGE_COMMIT_WINDOW: TimeDelta = TimeDelta::days(3);

/// Links commits whose message is a merge message naming the pull request or its source branch.
///
/// Recognizes `Merged PR {id}`, `Merge pull request #{id}`, `Merged in {branch}`, and
/// `Merge branch '{branch}'`, for commits dated near the pull request's close date.
#[derive(Debug, Default, Clone, Copy)]
pub struct MergeCommitStrategy;

impl MergeCommitStrategy {
    fn patterns(pull_request: &PullRequest) -> Vec<(&'static str, Regex)> {
        let id = regex::escape(&pull_request.id.to_string());
        let mut sources = vec![
            ("merged-pr", format!(r"\bMerged PR {id}(?:[^0-9]|$)")),
            ("merge-pull-request", format!(r"\bMerge pull request #{id}(?:[^0-9]|$)")),
        ];

        let branch = pull_request.source_branch().trim();
        if !branch.is_empty() {
            let branch = regex::escape(branch);
            sources.push(("merged-in", format!(r"\bMerged in {branch}(?:[\s:),]|$)")));
            sources.push(("merge-branch", format!(r"\bMerge branch '{branch}'")));
        }

        sources
            .into_iter()
            .filter_map(|(name, source)| match RegexBuilder::new(&source).case_insensitive(true).build() {
                Ok(regex) => Some((name, regex)),
                Err(e) => {
                    log::debug!(target: LOG_TARGET, "Skipping {name} pattern for pull request {}: {e}", pull_request.id);
                    None
                }
            })
            .collect()
    }
}

impl LinkStrategy for MergeCommitStrategy {
    fn method(&self) -> LinkMethod {
        LinkMethod::MergeCommit
    }

    fn try_associate(&self, pull_request: &PullRequest, commits: &[CommitRecord]) -> Vec<Association> {
        let candidates = commits_near(commits, pull_request.anchor_date(), MERGE_COMMIT_WINDOW);
        if candidates.is_empty() {
            return Vec::new();
        }

        let patterns = Self::patterns(pull_request);
        candidates
            .iter()
            .filter_map(|commit| {
                patterns.iter().find(|(_, regex)| regex.is_match(&commit.message)).map(|(name, _)| {
                    Association::new(&commit.hash, MERGE_COMMIT_CONFIDENCE, LinkMethod::MergeCommit).with_evidence("pattern", name)
                })
            })
            .collect()
    }
}
