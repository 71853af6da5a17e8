//! Pull request to commit record linkage.
//!
//! [`RecordLinker`] runs a fixed chain of [`LinkStrategy`] implementations against a date-sorted
//! commit list. The primary strategies run in order and the first one that finds anything wins;
//! the temporal fallback runs only when none of them matched.

mod branch_analysis;
mod linker;
mod merge_commit;
mod similarity;
mod squash_commit;
mod temporal;

pub use branch_analysis::BranchAnalysisStrategy;
pub use linker::RecordLinker;
pub use merge_commit::{MERGE_COMMIT_CONFIDENCE, MERGE_COMMIT_WINDOW, MergeCommitStrategy};
pub use similarity::{authors_match, text_similarity};
pub use squash_commit::{
    SQUASH_ACCEPT_THRESHOLD, SQUASH_AUTHOR_WEIGHT, SQUASH_ID_WEIGHT, SQUASH_NON_MERGE_WEIGHT, SQUASH_TITLE_THRESHOLD,
    SQUASH_TITLE_WEIGHT, SquashCommitStrategy,
};
pub use temporal::{
    TEMPORAL_ACCEPT_THRESHOLD, TEMPORAL_BASE_WEIGHT, TEMPORAL_MAX_RESULTS, TEMPORAL_PROXIMITY_WEIGHT, TEMPORAL_TEXT_WEIGHT,
    TEMPORAL_WINDOW, TemporalStrategy,
};

use crate::model::{Association, CommitRecord, LinkMethod, PullRequest};
use chrono::{DateTime, TimeDelta, Utc};
use core::fmt::Debug;

/// One way of linking a pull request to commits.
pub trait LinkStrategy: Send + Sync + Debug {
    fn method(&self) -> LinkMethod;

    /// Returns the associations this strategy finds, best first.
    ///
    /// `commits` is sorted by ascending date.
    fn try_associate(&self, pull_request: &PullRequest, commits: &[CommitRecord]) -> Vec<Association>;
}

/// The commits dated within `radius` of `anchor`, inclusive.
///
/// `commits` must be sorted by ascending date.
pub(crate) fn commits_near(commits: &[CommitRecord], anchor: DateTime<Utc>, radius: TimeDelta) -> &[CommitRecord] {
    let from = anchor.checked_sub_signed(radius).unwrap_or(DateTime::<Utc>::MIN_UTC);
    let to = anchor.checked_add_signed(radius).unwrap_or(DateTime::<Utc>::MAX_UTC);
    let start = commits.partition_point(|c| c.date < from);
    let end = commits.partition_point(|c| c.date <= to);
    &commits[start..end.max(start)]
}

/// Descending by confidence; ties keep their date order.
pub(crate) fn sort_by_confidence(associations: &mut [Association]) {
    associations.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
pub(crate) mod test_support {
    use crate::model::{CommitRecord, Identity, PullRequest, PullRequestStatus};
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    pub fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    pub fn pull_request(id: u64, title: &str, creator: &str, email: &str) -> PullRequest {
        PullRequest {
            id,
            title: title.into(),
            description: None,
            creator: Identity {
                display_name: creator.into(),
                unique_name: email.into(),
            },
            status: PullRequestStatus::Completed,
            creation_date: base_time(),
            closed_date: Some(base_time() + TimeDelta::days(1)),
            source_ref_name: "refs/heads/feature/login".into(),
            target_ref_name: "refs/heads/main".into(),
            reviewers: Vec::new(),
            completion_options: None,
            is_draft: false,
            merge_status: None,
            last_merge_commit: None,
        }
    }

    pub fn commit(hash: &str, message: &str, author: &str, email: &str, date: DateTime<Utc>) -> CommitRecord {
        CommitRecord {
            hash: hash.into(),
            author: author.into(),
            author_email: email.into(),
            date,
            message: message.into(),
            is_merge: false,
        }
    }
}
