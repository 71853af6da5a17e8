use super::similarity::{authors_match, text_similarity};
use super::{LinkStrategy, commits_near, sort_by_confidence};
use crate::model::{Association, CommitRecord, LinkMethod, PullRequest};
use chrono::TimeDelta;

pub const TEMPORAL_WINDOW: TimeDelta = TimeDelta::days(7);
pub const TEMPORAL_PROXIMITY_WEIGHT: f64 = 0.5;
pub const TEMPORAL_TEXT_WEIGHT: f64 = 0.3;
pub const TEMPORAL_BASE_WEIGHT: f64 = 0.1;
pub const TEMPORAL_ACCEPT_THRESHOLD: f64 = 0.3;
pub const TEMPORAL_MAX_RESULTS: usize = 5;

/// Fallback linkage: commits by the pull request's creator made around the time it was opened.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemporalStrategy;

impl TemporalStrategy {
    fn score(pull_request: &PullRequest, commit: &CommitRecord) -> f64 {
        #[expect(clippy::cast_precision_loss, reason = "second counts within a week fit exactly in f64")]
        let distance = (commit.date - pull_request.creation_date).num_seconds().abs() as f64;
        #[expect(clippy::cast_precision_loss, reason = "constant")]
        let window = TEMPORAL_WINDOW.num_seconds() as f64;
        let proximity = (1.0 - distance / window).max(0.0);

        let text = text_similarity(&pull_request.title, commit.title()).max(text_similarity(pull_request.description(), &commit.message));

        TEMPORAL_PROXIMITY_WEIGHT * proximity + TEMPORAL_TEXT_WEIGHT * text + TEMPORAL_BASE_WEIGHT
    }
}

impl LinkStrategy for TemporalStrategy {
    fn method(&self) -> LinkMethod {
        LinkMethod::ManualLink
    }

    fn try_associate(&self, pull_request: &PullRequest, commits: &[CommitRecord]) -> Vec<Association> {
        let mut found: Vec<Association> = commits_near(commits, pull_request.creation_date, TEMPORAL_WINDOW)
            .iter()
            .filter(|commit| authors_match(commit, &pull_request.creator))
            .filter_map(|commit| {
                let score = Self::score(pull_request, commit);
                (score > TEMPORAL_ACCEPT_THRESHOLD).then(|| Association::new(&commit.hash, score, LinkMethod::ManualLink))
            })
            .collect();

        sort_by_confidence(&mut found);
        found.truncate(TEMPORAL_MAX_RESULTS);
        found
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_score_components() {
        let pr = pull_request(1, "Add login page", "Ada Lovelace", "ada@contoso.com");

        let same_time_same_title = commit("a", "Add login page", "Ada Lovelace", "ada@contoso.com", base_time());
        assert!((TemporalStrategy::score(&pr, &same_time_same_title) - 0.9).abs() < 1e-9);

        let half_window = commit("b", "zzzz", "Ada Lovelace", "ada@contoso.com", base_time() + TimeDelta::hours(84));
        assert!((TemporalStrategy::score(&pr, &half_window) - 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_requires_matching_author() {
        let pr = pull_request(1, "Add login page", "Ada Lovelace", "ada@contoso.com");
        let commits = vec![commit("a", "Add login page", "Grace Hopper", "grace@navy.mil", base_time())];
        assert!(TemporalStrategy.try_associate(&pr, &commits).is_empty());
    }

    #[test]
    fn test_far_commits_fall_below_threshold() {
        let pr = pull_request(1, "Add login page", "Ada Lovelace", "ada@contoso.com");
        let commits = vec![commit("a", "zzzz", "Ada Lovelace", "ada@contoso.com", base_time() + TimeDelta::days(6))];
        assert!(TemporalStrategy.try_associate(&pr, &commits).is_empty());
    }

    #[test]
    fn test_at_most_five_best_first() {
        let pr = pull_request(1, "Add login page", "Ada Lovelace", "ada@contoso.com");
        let commits: Vec<CommitRecord> = (0..8)
            .map(|i| commit(&format!("c{i}"), "zzzz", "Ada Lovelace", "ada@contoso.com", base_time() + TimeDelta::hours(i * 6)))
            .collect();

        let found = TemporalStrategy.try_associate(&pr, &commits);
        assert_eq!(found.len(), TEMPORAL_MAX_RESULTS);
        assert_eq!(found[0].commit_hash, "c0");
        assert!(found.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        assert!(found.iter().all(|a| a.method == LinkMethod::ManualLink));
    }
}
