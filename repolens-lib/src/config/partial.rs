use core::time::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Copies every field that is present in `$src` over `$dst`.
macro_rules! overlay_fields {
    ($dst:expr, $src:expr; $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $src.$field {
                $dst.$field = Some(value);
            }
        )+
    };
}

/// One layer of configuration in which every setting is optional.
///
/// Layers are merged in order with [`PartialConfig::overlay`]; a field in a later layer replaces
/// the same field in an earlier one only when it is present.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    pub organization: Option<String>,
    pub project: Option<String>,
    pub repository: Option<String>,
    pub personal_access_token: Option<String>,

    #[serde(default)]
    pub api: PartialApiConfig,

    #[serde(default)]
    pub cache: PartialCacheConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PartialApiConfig {
    pub base_url: Option<String>,
    pub version: Option<String>,

    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    pub max_retries: Option<u32>,

    #[serde(default, with = "humantime_serde")]
    pub retry_base_delay: Option<Duration>,

    #[serde(default, with = "humantime_serde")]
    pub partition_delay: Option<Duration>,

    #[serde(default, with = "humantime_serde")]
    pub default_lookback: Option<Duration>,

    #[serde(default)]
    pub rate_limit: PartialRateLimitConfig,

    #[serde(default)]
    pub pagination: PartialPaginationConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PartialRateLimitConfig {
    pub enabled: Option<bool>,
    pub requests_per_minute: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PartialPaginationConfig {
    pub page_size: Option<u32>,
    pub max_page_size: Option<u32>,
    pub max_pages: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PartialCacheConfig {
    pub enabled: Option<bool>,
    pub directory: Option<PathBuf>,

    #[serde(default, with = "humantime_serde")]
    pub ttl: Option<Duration>,

    #[serde(default, with = "humantime_serde")]
    pub memory_ttl: Option<Duration>,

    pub memory_max_entries: Option<usize>,
    pub incremental: Option<bool>,
    pub max_size_mb: Option<u64>,

    #[serde(default, with = "humantime_serde")]
    pub cleanup_interval: Option<Duration>,

    pub cleanup_probability: Option<f64>,
}

impl PartialConfig {
    /// Applies `other` on top of `self`.
    pub fn overlay(&mut self, other: Self) {
        overlay_fields!(self, other; organization, project, repository, personal_access_token);
        self.api.overlay(other.api);
        self.cache.overlay(other.cache);
    }

    /// Merges layers in order, later layers taking precedence.
    #[must_use]
    pub fn merged(layers: impl IntoIterator<Item = Self>) -> Self {
        layers.into_iter().fold(Self::default(), |mut acc, layer| {
            acc.overlay(layer);
            acc
        })
    }
}

impl PartialApiConfig {
    fn overlay(&mut self, other: Self) {
        overlay_fields!(self, other; base_url, version, timeout, max_retries, retry_base_delay, partition_delay, default_lookback);
        overlay_fields!(self.rate_limit, other.rate_limit; enabled, requests_per_minute);
        overlay_fields!(self.pagination, other.pagination; page_size, max_page_size, max_pages);
    }
}

impl PartialCacheConfig {
    fn overlay(&mut self, other: Self) {
        overlay_fields!(
            self, other;
            enabled, directory, ttl, memory_ttl, memory_max_entries, incremental, max_size_mb, cleanup_interval, cleanup_probability
        );
    }
}
