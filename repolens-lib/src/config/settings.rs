use super::partial::PartialConfig;
use crate::errors::ConfigError;
use core::time::Duration;
use directories::BaseDirs;
use std::path::PathBuf;
use url::Url;

/// Fully resolved and validated configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub organization: String,
    pub project: String,
    pub repository: Option<String>,
    pub personal_access_token: Option<String>,
    pub api: ApiSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: Url,
    pub version: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub partition_delay: Duration,
    pub default_lookback: Duration,
    pub rate_limit: RateLimitSettings,
    pub pagination: PaginationSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub requests_per_minute: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationSettings {
    pub page_size: u32,
    pub max_page_size: u32,
    pub max_pages: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub enabled: bool,
    pub directory: PathBuf,
    pub ttl: Duration,
    pub memory_ttl: Duration,
    pub memory_max_entries: usize,
    pub incremental: bool,
    pub max_size_mb: u64,
    pub cleanup_interval: Duration,
    pub cleanup_probability: f64,
}

impl CacheSettings {
    #[must_use]
    pub const fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }

    /// Resolves only the cache section, for commands that never talk to the service.
    pub fn resolve(partial: &PartialConfig) -> Result<Self, ConfigError> {
        let cache = &partial.cache;
        let settings = Self {
            enabled: cache.enabled.unwrap_or(true),
            directory: cache.directory.clone().unwrap_or_else(default_cache_dir),
            ttl: required(cache.ttl, "cache.ttl")?,
            memory_ttl: required(cache.memory_ttl, "cache.memory_ttl")?,
            memory_max_entries: required(cache.memory_max_entries, "cache.memory_max_entries")?,
            incremental: cache.incremental.unwrap_or(false),
            max_size_mb: required(cache.max_size_mb, "cache.max_size_mb")?,
            cleanup_interval: required(cache.cleanup_interval, "cache.cleanup_interval")?,
            cleanup_probability: cache.cleanup_probability.unwrap_or(0.01),
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl.is_zero() {
            return Err(invalid("cache.ttl", "must be greater than zero"));
        }
        if self.memory_ttl.is_zero() {
            return Err(invalid("cache.memory_ttl", "must be greater than zero"));
        }
        if self.memory_max_entries == 0 {
            return Err(invalid("cache.memory_max_entries", "must be at least 1"));
        }
        if self.max_size_mb == 0 {
            return Err(invalid("cache.max_size_mb", "must be at least 1"));
        }
        if self.cleanup_interval.is_zero() {
            return Err(invalid("cache.cleanup_interval", "must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.cleanup_probability) {
            return Err(invalid("cache.cleanup_probability", "must be between 0 and 1"));
        }
        Ok(())
    }
}

impl Settings {
    /// Resolves a merged configuration, failing on the first missing or malformed setting.
    pub fn resolve(partial: &PartialConfig) -> Result<Self, ConfigError> {
        let organization = non_blank(partial.organization.as_deref()).ok_or(ConfigError::Missing("organization"))?;
        validate_organization(organization)?;

        let project = non_blank(partial.project.as_deref()).ok_or(ConfigError::Missing("project"))?;
        validate_segment("project", project)?;

        let repository = non_blank(partial.repository.as_deref());
        if let Some(repository) = repository {
            validate_segment("repository", repository)?;
        }

        let api = &partial.api;
        let raw_url = required(api.base_url.as_deref(), "api.base_url")?;
        let base_url = Url::parse(raw_url).map_err(|e| invalid("api.base_url", e.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(invalid("api.base_url", format!("'{raw_url}' is not an http(s) URL")));
        }

        let rate_limit = RateLimitSettings {
            enabled: api.rate_limit.enabled.unwrap_or(true),
            requests_per_minute: required(api.rate_limit.requests_per_minute, "api.rate_limit.requests_per_minute")?,
        };
        if rate_limit.requests_per_minute == 0 {
            return Err(invalid("api.rate_limit.requests_per_minute", "must be at least 1"));
        }

        let pagination = PaginationSettings {
            page_size: required(api.pagination.page_size, "api.pagination.page_size")?,
            max_page_size: required(api.pagination.max_page_size, "api.pagination.max_page_size")?,
            max_pages: required(api.pagination.max_pages, "api.pagination.max_pages")?,
        };
        if pagination.page_size == 0 {
            return Err(invalid("api.pagination.page_size", "must be at least 1"));
        }
        if pagination.max_page_size < pagination.page_size {
            return Err(invalid(
                "api.pagination.max_page_size",
                format!("{} is smaller than page_size {}", pagination.max_page_size, pagination.page_size),
            ));
        }
        if pagination.max_pages == 0 {
            return Err(invalid("api.pagination.max_pages", "must be at least 1"));
        }

        let timeout = required(api.timeout, "api.timeout")?;
        if timeout.is_zero() {
            return Err(invalid("api.timeout", "must be greater than zero"));
        }

        let version = required(api.version.as_deref(), "api.version")?;
        if version.trim().is_empty() {
            return Err(invalid("api.version", "must not be empty"));
        }

        Ok(Self {
            organization: organization.to_string(),
            project: project.to_string(),
            repository: repository.map(str::to_string),
            personal_access_token: non_blank(partial.personal_access_token.as_deref()).map(str::to_string),
            api: ApiSettings {
                base_url,
                version: version.trim().to_string(),
                timeout,
                max_retries: required(api.max_retries, "api.max_retries")?,
                retry_base_delay: required(api.retry_base_delay, "api.retry_base_delay")?,
                partition_delay: api.partition_delay.unwrap_or(Duration::ZERO),
                default_lookback: required(api.default_lookback, "api.default_lookback")?,
                rate_limit,
                pagination,
            },
            cache: CacheSettings::resolve(partial)?,
        })
    }
}

fn default_cache_dir() -> PathBuf {
    BaseDirs::new().map_or_else(|| PathBuf::from(".repolens-cache"), |dirs| dirs.cache_dir().join("repolens"))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, ConfigError> {
    value.ok_or(ConfigError::Missing(field))
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn validate_organization(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let starts_well = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    if !starts_well || !chars.all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid(
            "organization",
            format!("'{name}' must start with a letter or digit and contain only letters, digits, and '-'"),
        ));
    }
    Ok(())
}

fn validate_segment(field: &'static str, name: &str) -> Result<(), ConfigError> {
    if let Some(bad) = name.chars().find(|c| matches!(c, '/' | '\\' | '?' | '#') || c.is_control()) {
        return Err(invalid(field, format!("'{name}' contains the character {bad:?}")));
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn complete() -> PartialConfig {
        let mut partial = PartialConfig::defaults();
        partial.organization = Some("contoso".into());
        partial.project = Some("Fabrikam Fiber".into());
        partial
    }

    #[test]
    fn test_resolve_defaults() {
        let settings = Settings::resolve(&complete()).unwrap();
        assert_eq!(settings.organization, "contoso");
        assert_eq!(settings.project, "Fabrikam Fiber");
        assert!(settings.repository.is_none());
        assert_eq!(settings.api.base_url.as_str(), "https://dev.azure.com/");
        assert_eq!(settings.api.version, "7.1");
        assert_eq!(settings.api.timeout, Duration::from_secs(30));
        assert_eq!(settings.api.max_retries, 3);
        assert_eq!(settings.api.rate_limit.requests_per_minute, 60);
        assert_eq!(settings.api.pagination.page_size, 100);
        assert_eq!(settings.api.pagination.max_page_size, 1000);
        assert_eq!(settings.api.pagination.max_pages, 100);
        assert!(settings.cache.enabled);
        assert_eq!(settings.cache.ttl, Duration::from_hours(24));
        assert_eq!(settings.cache.cleanup_interval, Duration::from_mins(30));
        assert_eq!(settings.cache.max_size_bytes(), 100 * 1024 * 1024);
    }

    #[test]
    fn test_missing_organization() {
        let mut partial = complete();
        partial.organization = None;
        assert_eq!(Settings::resolve(&partial).unwrap_err(), ConfigError::Missing("organization"));

        partial.organization = Some("   ".into());
        assert_eq!(Settings::resolve(&partial).unwrap_err(), ConfigError::Missing("organization"));
    }

    #[test]
    fn test_missing_project() {
        let mut partial = complete();
        partial.project = None;
        assert_eq!(Settings::resolve(&partial).unwrap_err(), ConfigError::Missing("project"));
    }

    #[test]
    fn test_malformed_organization() {
        for bad in ["-leading", "has space", "slash/org", "dot.org"] {
            let mut partial = complete();
            partial.organization = Some(bad.into());
            assert!(
                matches!(Settings::resolve(&partial), Err(ConfigError::Invalid { field: "organization", .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_malformed_project_and_repository() {
        let mut partial = complete();
        partial.project = Some("a/b".into());
        assert!(matches!(Settings::resolve(&partial), Err(ConfigError::Invalid { field: "project", .. })));

        let mut partial = complete();
        partial.repository = Some("repo\\x".into());
        assert!(matches!(Settings::resolve(&partial), Err(ConfigError::Invalid { field: "repository", .. })));
    }

    #[test]
    fn test_bad_base_url() {
        let mut partial = complete();
        partial.api.base_url = Some("ftp://example.com".into());
        assert!(matches!(Settings::resolve(&partial), Err(ConfigError::Invalid { field: "api.base_url", .. })));

        partial.api.base_url = Some("not a url".into());
        assert!(matches!(Settings::resolve(&partial), Err(ConfigError::Invalid { field: "api.base_url", .. })));
    }

    #[test]
    fn test_pagination_bounds() {
        let mut partial = complete();
        partial.api.pagination.page_size = Some(500);
        partial.api.pagination.max_page_size = Some(100);
        assert!(matches!(
            Settings::resolve(&partial),
            Err(ConfigError::Invalid {
                field: "api.pagination.max_page_size",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let mut partial = complete();
        partial.api.rate_limit.requests_per_minute = Some(0);
        assert!(matches!(
            Settings::resolve(&partial),
            Err(ConfigError::Invalid {
                field: "api.rate_limit.requests_per_minute",
                ..
            })
        ));
    }

    #[test]
    fn test_cache_settings_without_service_fields() {
        let cache = CacheSettings::resolve(&PartialConfig::defaults()).unwrap();
        assert!(cache.enabled);
        assert!(!cache.incremental);
        assert_eq!(cache.memory_max_entries, 1000);
    }

    #[test]
    fn test_cache_probability_bounds() {
        let mut partial = PartialConfig::defaults();
        partial.cache.cleanup_probability = Some(1.5);
        assert!(matches!(
            CacheSettings::resolve(&partial),
            Err(ConfigError::Invalid {
                field: "cache.cleanup_probability",
                ..
            })
        ));
    }
}
