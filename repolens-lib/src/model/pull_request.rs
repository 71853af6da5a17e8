use super::ItemFailure;
use crate::errors::ItemError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A pull request as reported by the Azure DevOps REST API.
///
/// Field names follow the service's camelCase wire format so the same shape is used for the
/// HTTP response and for cached copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    #[serde(rename = "pullRequestId")]
    pub id: u64,

    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "createdBy", default)]
    pub creator: Identity,

    pub status: PullRequestStatus,

    pub creation_date: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub source_ref_name: String,

    #[serde(default)]
    pub target_ref_name: String,

    #[serde(default)]
    pub reviewers: Vec<Reviewer>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_options: Option<CompletionOptions>,

    #[serde(default)]
    pub is_draft: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_merge_commit: Option<CommitRef>,
}

impl PullRequest {
    /// The source branch without its `refs/heads/` prefix.
    #[must_use]
    pub fn source_branch(&self) -> &str {
        strip_ref(&self.source_ref_name)
    }

    /// The target branch without its `refs/heads/` prefix.
    #[must_use]
    pub fn target_branch(&self) -> &str {
        strip_ref(&self.target_ref_name)
    }

    /// The moment the pull request settled: its close date, or its creation date while still open.
    #[must_use]
    pub fn anchor_date(&self) -> DateTime<Utc> {
        self.closed_date.unwrap_or(self.creation_date)
    }

    #[must_use]
    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }
}

fn strip_ref(name: &str) -> &str {
    name.strip_prefix("refs/heads/").unwrap_or(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PullRequestStatus {
    Active,
    Completed,
    Abandoned,

    /// A status this client does not know about.
    #[serde(other)]
    Unknown,
}

/// A user identity as reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(default)]
    pub display_name: String,

    /// Usually the sign-in email address.
    #[serde(default)]
    pub unique_name: String,
}

impl Identity {
    /// The email address of this identity, if its unique name looks like one.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        let name = self.unique_name.trim();
        name.contains('@').then_some(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reviewer {
    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub unique_name: String,

    #[serde(default)]
    pub vote: i32,

    #[serde(default)]
    pub is_required: bool,
}

/// Interpretation of a reviewer's numeric vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewerVote {
    Approved,
    ApprovedWithSuggestions,
    NoVote,
    WaitingForAuthor,
    Rejected,
    Other(i32),
}

impl Reviewer {
    #[must_use]
    pub const fn vote(&self) -> ReviewerVote {
        match self.vote {
            10 => ReviewerVote::Approved,
            5 => ReviewerVote::ApprovedWithSuggestions,
            0 => ReviewerVote::NoVote,
            -5 => ReviewerVote::WaitingForAuthor,
            -10 => ReviewerVote::Rejected,
            other => ReviewerVote::Other(other),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_strategy: Option<MergeStrategy>,

    #[serde(default)]
    pub delete_source_branch: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeStrategy {
    NoFastForward,
    Squash,
    Rebase,
    RebaseMerge,

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRef {
    pub commit_id: String,
}

/// One page of the pull request listing endpoint.
///
/// Records stay raw until [`PullRequestPage::into_records`] so a single malformed record does
/// not fail the whole page.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestPage {
    #[serde(default)]
    pub value: Vec<Value>,

    #[serde(default)]
    pub count: Option<u64>,
}

impl PullRequestPage {
    /// Decodes each record on its own, reporting the ones that do not decode.
    #[must_use]
    pub fn into_records(self) -> (Vec<PullRequest>, Vec<ItemFailure>) {
        let mut records = Vec::with_capacity(self.value.len());
        let mut malformed = Vec::new();

        for raw in self.value {
            let id = raw.get("pullRequestId").and_then(Value::as_u64);
            let title = raw.get("title").and_then(Value::as_str).unwrap_or_default().to_string();
            match serde_json::from_value::<PullRequest>(raw) {
                Ok(pr) => records.push(pr),
                Err(source) => malformed.push(ItemFailure {
                    pull_request_id: id,
                    title,
                    reason: ItemError::Malformed { id, source }.to_string(),
                }),
            }
        }

        (records, malformed)
    }
}
