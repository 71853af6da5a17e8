use super::{PullRequest, PullRequestStatus, ReviewerVote};
use crate::errors::ItemError;
use serde::{Deserialize, Serialize};

/// Figures derived from a single pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestMetrics {
    /// Hours from creation to close, absent while the pull request is open.
    pub cycle_time_hours: Option<f64>,
    pub reviewer_count: usize,
    pub approval_count: usize,
    pub rejection_count: usize,
    pub waiting_for_author_count: usize,
    pub merged: bool,
    pub deletes_source_branch: bool,
}

impl PullRequestMetrics {
    /// Computes metrics for a pull request.
    ///
    /// Fails when the record closes before it was created.
    pub fn compute(pr: &PullRequest) -> Result<Self, ItemError> {
        let cycle_time_hours = match pr.closed_date {
            Some(closed) if closed < pr.creation_date => {
                return Err(ItemError::ClosedBeforeCreated {
                    id: pr.id,
                    created: pr.creation_date,
                    closed,
                });
            }
            #[expect(clippy::cast_precision_loss, reason = "cycle times are far below 2^52 seconds")]
            Some(closed) => Some((closed - pr.creation_date).num_seconds() as f64 / 3600.0),
            None => None,
        };

        let count = |wanted: &[ReviewerVote]| pr.reviewers.iter().filter(|r| wanted.contains(&r.vote())).count();

        Ok(Self {
            cycle_time_hours,
            reviewer_count: pr.reviewers.len(),
            approval_count: count(&[ReviewerVote::Approved, ReviewerVote::ApprovedWithSuggestions]),
            rejection_count: count(&[ReviewerVote::Rejected]),
            waiting_for_author_count: count(&[ReviewerVote::WaitingForAuthor]),
            merged: pr.status == PullRequestStatus::Completed,
            deletes_source_branch: pr.completion_options.as_ref().is_some_and(|o| o.delete_source_branch),
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::model::{CompletionOptions, Identity, Reviewer};
    use chrono::{TimeZone, Utc};

    fn reviewer(vote: i32) -> Reviewer {
        Reviewer {
            display_name: format!("reviewer {vote}"),
            unique_name: String::new(),
            vote,
            is_required: false,
        }
    }

    fn pull_request() -> PullRequest {
        PullRequest {
            id: 7,
            title: "Add caching".into(),
            description: None,
            creator: Identity::default(),
            status: PullRequestStatus::Completed,
            creation_date: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            closed_date: Some(Utc.with_ymd_and_hms(2024, 5, 2, 20, 0, 0).unwrap()),
            source_ref_name: "refs/heads/cache".into(),
            target_ref_name: "refs/heads/main".into(),
            reviewers: vec![reviewer(10), reviewer(5), reviewer(-10), reviewer(-5), reviewer(0)],
            completion_options: Some(CompletionOptions {
                merge_strategy: None,
                delete_source_branch: true,
            }),
            is_draft: false,
            merge_status: None,
            last_merge_commit: None,
        }
    }

    #[test]
    fn test_compute_counts_votes() {
        let metrics = PullRequestMetrics::compute(&pull_request()).unwrap();
        assert_eq!(metrics.cycle_time_hours, Some(36.0));
        assert_eq!(metrics.reviewer_count, 5);
        assert_eq!(metrics.approval_count, 2);
        assert_eq!(metrics.rejection_count, 1);
        assert_eq!(metrics.waiting_for_author_count, 1);
        assert!(metrics.merged);
        assert!(metrics.deletes_source_branch);
    }

    #[test]
    fn test_open_pull_request_has_no_cycle_time() {
        let mut pr = pull_request();
        pr.closed_date = None;
        pr.status = PullRequestStatus::Active;
        let metrics = PullRequestMetrics::compute(&pr).unwrap();
        assert!(metrics.cycle_time_hours.is_none());
        assert!(!metrics.merged);
    }

    #[test]
    fn test_closed_before_created_is_rejected() {
        let mut pr = pull_request();
        pr.closed_date = Some(pr.creation_date - chrono::TimeDelta::hours(1));
        let err = PullRequestMetrics::compute(&pr).unwrap_err();
        assert!(matches!(err, ItemError::ClosedBeforeCreated { id: 7, .. }));
    }
}
