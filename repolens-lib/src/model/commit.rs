use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A commit read from the repository history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    pub hash: String,
    pub author: String,
    pub author_email: String,
    pub date: DateTime<Utc>,
    pub message: String,
    pub is_merge: bool,
}

impl CommitRecord {
    /// First line of the commit message.
    #[must_use]
    pub fn title(&self) -> &str {
        self.message.lines().next().unwrap_or_default().trim()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn commit(message: &str) -> CommitRecord {
        CommitRecord {
            hash: "abc123".into(),
            author: "Ada".into(),
            author_email: "ada@example.com".into(),
            date: Utc::now(),
            message: message.into(),
            is_merge: false,
        }
    }

    #[test]
    fn test_title_is_first_line() {
        assert_eq!(commit("  Add parser  \n\nLonger body").title(), "Add parser");
        assert_eq!(commit("").title(), "");
    }
}
