use super::LinkStrategy;
use crate::model::{Association, CommitRecord, LinkMethod, PullRequest};

/// Placeholder for linking through branch ancestry.
///
/// Never finds anything; it holds its place in the strategy order so ancestry analysis can slot in
/// without changing precedence.
#[derive(Debug, Default, Clone, Copy)]
pub struct BranchAnalysisStrategy;

impl LinkStrategy for BranchAnalysisStrategy {
    fn method(&self) -> LinkMethod {
        LinkMethod::BranchAnalysis
    }

    fn try_associate(&self, _pull_request: &PullRequest, _commits: &[CommitRecord]) -> Vec<Association> {
        Vec::new()
    }
}
