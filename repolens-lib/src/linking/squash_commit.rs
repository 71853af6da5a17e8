use super::merge_commit::MERGE_COMMIT_WINDOW;
use super::similarity::{authors_match, text_similarity};
use super::{LinkStrategy, commits_near, sort_by_confidence};
use crate::model::{Association, CommitRecord, LinkMethod, PullRequest};
use regex::Regex;

/// Added when the commit title is close to the pull request title.
pub const SQUASH_TITLE_WEIGHT: f64 = 0.7;

/// Title similarity needed for [`SQUASH_TITLE_WEIGHT`].
pub const SQUASH_TITLE_THRESHOLD: f64 = 0.8;

/// Added when the commit message mentions the pull request id.
pub const SQUASH_ID_WEIGHT: f64 = 0.8;

pub const SQUASH_AUTHOR_WEIGHT: f64 = 0.2;
pub const SQUASH_NON_MERGE_WEIGHT: f64 = 0.1;

/// Scores at or below this are rejected.
pub const SQUASH_ACCEPT_THRESHOLD: f64 = 0.6;

/// Scores single commits that look like a squashed pull request.
///
/// The confidence is the raw weighted sum and can exceed 1.
#[derive(Debug, Default, Clone, Copy)]
pub struct SquashCommitStrategy;

impl SquashCommitStrategy {
    fn id_reference(pull_request: &PullRequest) -> Option<Regex> {
        let id = regex::escape(&pull_request.id.to_string());
        Regex::new(&format!(r"(?i)(?:#|\bPR\s?){id}(?:[^0-9]|$)")).ok()
    }

    fn score(pull_request: &PullRequest, commit: &CommitRecord, id_reference: Option<&Regex>) -> f64 {
        let mut score = 0.0;
        if text_similarity(&pull_request.title, commit.title()) > SQUASH_TITLE_THRESHOLD {
            score += SQUASH_TITLE_WEIGHT;
        }
        if id_reference.is_some_and(|regex| regex.is_match(&commit.message)) {
            score += SQUASH_ID_WEIGHT;
        }
        if authors_match(commit, &pull_request.creator) {
            score += SQUASH_AUTHOR_WEIGHT;
        }
        if !commit.is_merge {
            score += SQUASH_NON_MERGE_WEIGHT;
        }
        score
    }
}

impl LinkStrategy for SquashCommitStrategy {
    fn method(&self) -> LinkMethod {
        LinkMethod::SquashCommit
    }

    fn try_associate(&self, pull_request: &PullRequest, commits: &[CommitRecord]) -> Vec<Association> {
        let id_reference = Self::id_reference(pull_request);
        let mut found: Vec<Association> = commits_near(commits, pull_request.anchor_date(), MERGE_COMMIT_WINDOW)
            .iter()
            .filter_map(|commit| {
                let score = Self::score(pull_request, commit, id_reference.as_ref());
                (score > SQUASH_ACCEPT_THRESHOLD).then(|| {
                    Association::new(&commit.hash, score, LinkMethod::SquashCommit)
                        .with_evidence("titleSimilarity", format!("{:.2}", text_similarity(&pull_request.title, commit.title())))
                })
            })
            .collect();

        sort_by_confidence(&mut found);
        found
    }
}
