use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a commit was linked to a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkMethod {
    MergeCommit,
    SquashCommit,
    BranchAnalysis,

    /// Temporal and author proximity, used when nothing else matched.
    ManualLink,
}

impl LinkMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MergeCommit => "merge-commit",
            Self::SquashCommit => "squash-commit",
            Self::BranchAnalysis => "branch-analysis",
            Self::ManualLink => "manual-link",
        }
    }
}

/// A scored link between a pull request and a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    pub commit_hash: String,
    pub confidence: f64,
    pub method: LinkMethod,

    /// Evidence behind the match, for diagnostics.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Association {
    #[must_use]
    pub fn new(commit_hash: impl Into<String>, confidence: f64, method: LinkMethod) -> Self {
        Self {
            commit_hash: commit_hash.into(),
            confidence,
            method,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_evidence(mut self, name: &str, value: impl ToString) -> Self {
        let _ = self.metadata.insert(name.to_string(), value.to_string());
        self
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_method_serializes_kebab_case() {
        let json = serde_json::to_string(&LinkMethod::ManualLink).unwrap();
        assert_eq!(json, "\"manual-link\"");
        for method in [LinkMethod::MergeCommit, LinkMethod::SquashCommit, LinkMethod::BranchAnalysis, LinkMethod::ManualLink] {
            assert_eq!(serde_json::to_string(&method).unwrap(), format!("\"{}\"", method.as_str()));
        }
    }

    #[test]
    fn test_evidence_is_recorded() {
        let association = Association::new("abc", 0.95, LinkMethod::MergeCommit).with_evidence("pattern", "merged-pr");
        assert_eq!(association.metadata.get("pattern").map(String::as_str), Some("merged-pr"));
    }
}
