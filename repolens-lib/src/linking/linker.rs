use super::{BranchAnalysisStrategy, LinkStrategy, MergeCommitStrategy, SquashCommitStrategy, TemporalStrategy};
use crate::model::{Association, CommitRecord, PullRequest};

/// Log target for record linkage
const LOG_TARGET: &str = "    linker";

/// Associates pull requests with the commits that implement them.
#[derive(Debug)]
pub struct RecordLinker {
    commits: Vec<CommitRecord>,
    primary: Vec<Box<dyn LinkStrategy>>,
    fallback: Box<dyn LinkStrategy>,
}

impl RecordLinker {
    /// Creates a linker over `commits` with the standard strategy chain.
    #[must_use]
    pub fn new(commits: Vec<CommitRecord>) -> Self {
        Self::with_strategies(
            commits,
            vec![
                Box::new(MergeCommitStrategy),
                Box::new(SquashCommitStrategy),
                Box::new(BranchAnalysisStrategy),
            ],
            Box::new(TemporalStrategy),
        )
    }

    #[must_use]
    pub fn with_strategies(mut commits: Vec<CommitRecord>, primary: Vec<Box<dyn LinkStrategy>>, fallback: Box<dyn LinkStrategy>) -> Self {
        commits.sort_by_key(|c| c.date);
        Self { commits, primary, fallback }
    }

    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.len()
    }

    /// Finds the commits associated with `pull_request`.
    ///
    /// The primary strategies run in order and the first non-empty result is returned. The
    /// fallback runs only when every primary strategy came up empty.
    #[must_use]
    pub fn find_associated_commits(&self, pull_request: &PullRequest) -> Vec<Association> {
        for strategy in &self.primary {
            let found = strategy.try_associate(pull_request, &self.commits);
            if !found.is_empty() {
                log::trace!(
                    target: LOG_TARGET,
                    "Pull request {}: {} association(s) via {}",
                    pull_request.id,
                    found.len(),
                    strategy.method().as_str()
                );
                return found;
            }
        }

        let found = self.fallback.try_associate(pull_request, &self.commits);
        log::trace!(
            target: LOG_TARGET,
            "Pull request {}: {} association(s) via {}",
            pull_request.id,
            found.len(),
            self.fallback.method().as_str()
        );
        found
    }
}
