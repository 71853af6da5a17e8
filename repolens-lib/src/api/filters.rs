use super::pagination::TimeRange;
use chrono::{DateTime, SecondsFormat, SubsecRound, TimeDelta, Utc};
use clap::ValueEnum;
use core::time::Duration;
use sha2::{Digest, Sha256};

/// Pull request status to query for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StatusFilter {
    Active,
    Completed,
    Abandoned,
    #[default]
    All,
}

impl StatusFilter {
    /// The value of the `searchCriteria.status` query parameter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
            Self::All => "all",
        }
    }
}

/// Search criteria for the pull request listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequestFilters {
    pub status: StatusFilter,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub source_ref: Option<String>,
    pub target_ref: Option<String>,
}

impl PullRequestFilters {
    /// The same criteria restricted to one creation-date slice.
    #[must_use]
    pub fn within(&self, range: TimeRange) -> Self {
        Self {
            created_after: Some(range.start),
            created_before: Some(range.end),
            ..self.clone()
        }
    }

    /// The creation-date range these filters cover, filling open ends from `now` and `lookback`.
    ///
    /// Filled-in ends are whole seconds, the precision of the service's time criteria.
    #[must_use]
    pub fn time_range(&self, now: DateTime<Utc>, lookback: Duration) -> TimeRange {
        let end = self.created_before.unwrap_or_else(|| now.trunc_subsecs(0));
        let start = self.created_after.unwrap_or_else(|| {
            TimeDelta::from_std(lookback)
                .ok()
                .and_then(|delta| end.checked_sub_signed(delta))
                .map_or(DateTime::<Utc>::MIN_UTC, |start| start.trunc_subsecs(0))
        });
        TimeRange::new(start, end)
    }

    /// Whether the filters leave the start of the creation-date range open.
    #[must_use]
    pub const fn is_open_start(&self) -> bool {
        self.created_after.is_none()
    }

    /// Whether the filters leave the end of the creation-date range open.
    #[must_use]
    pub const fn is_open_end(&self) -> bool {
        self.created_before.is_none()
    }

    /// Short stable digest of the criteria, or `None` for the default query.
    ///
    /// Cached collections are keyed by it so differently filtered runs never share results.
    #[must_use]
    pub fn digest(&self) -> Option<String> {
        if *self == Self::default() {
            return None;
        }

        let mut hasher = Sha256::new();
        for (name, value) in self.query_params() {
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"&");
        }
        let digest = format!("{:x}", hasher.finalize());
        Some(digest[..12].to_string())
    }

    /// Query parameters understood by the listing endpoint.
    #[must_use]
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("searchCriteria.status", self.status.as_str().to_string())];

        if self.created_after.is_some() || self.created_before.is_some() {
            params.push(("searchCriteria.queryTimeRangeType", "created".to_string()));
        }
        if let Some(after) = self.created_after {
            params.push(("searchCriteria.minTime", after.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(before) = self.created_before {
            params.push(("searchCriteria.maxTime", before.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(source) = &self.source_ref {
            params.push(("searchCriteria.sourceRefName", qualify_ref(source)));
        }
        if let Some(target) = &self.target_ref {
            params.push(("searchCriteria.targetRefName", qualify_ref(target)));
        }

        params
    }
}

/// Accepts either a bare branch name or a full ref.
fn qualify_ref(name: &str) -> String {
    if name.starts_with("refs/") {
        name.to_string()
    } else {
        format!("refs/heads/{name}")
    }
}
