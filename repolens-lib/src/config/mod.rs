//! Layered configuration.
//!
//! Settings come from an ordered list of [`PartialConfig`] layers: built-in defaults, the
//! configuration file, environment variables, values detected from the git remote, and finally
//! command-line flags. Later layers win field by field, and the merged result is validated into
//! [`Settings`].

mod detect;
mod partial;
mod settings;

pub use detect::RemoteLocation;
pub use partial::{PartialApiConfig, PartialCacheConfig, PartialConfig, PartialPaginationConfig, PartialRateLimitConfig};
pub use settings::{ApiSettings, CacheSettings, PaginationSettings, RateLimitSettings, Settings};

use crate::Result;
use crate::errors::ConfigError;
use camino::Utf8Path;
use ohno::IntoAppError;
use std::fs;
use std::io;

/// Log target for configuration loading
const LOG_TARGET: &str = "    config";

/// The default configuration TOML content, embedded from `default_config.toml`
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../default_config.toml");

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "repolens.toml";

pub const ENV_ORGANIZATION: &str = "AZURE_DEVOPS_ORG";
pub const ENV_PROJECT: &str = "AZURE_DEVOPS_PROJECT";
pub const ENV_REPOSITORY: &str = "AZURE_DEVOPS_REPO";
pub const ENV_TOKEN: &str = "AZURE_DEVOPS_PAT";
pub const ENV_BASE_URL: &str = "AZURE_DEVOPS_BASE_URL";

impl PartialConfig {
    /// The built-in defaults.
    #[must_use]
    pub fn defaults() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("default_config.toml should be valid TOML that deserializes to PartialConfig")
    }

    /// Reads a configuration file.
    ///
    /// With `path` set, the file must exist. Otherwise `repolens.toml` in `dir` is used when
    /// present and an empty layer is returned when it is not.
    pub fn from_file(dir: &Utf8Path, path: Option<&Utf8Path>) -> Result<Self> {
        let (path, text) = if let Some(path) = path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading configuration file '{path}'"))?;
            (path.to_owned(), text)
        } else {
            let path = dir.join(CONFIG_FILE_NAME);
            match fs::read_to_string(&path) {
                Ok(text) => (path, text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
                Err(e) => return Err(e).into_app_err_with(|| format!("reading configuration file '{path}'")),
            }
        };

        log::debug!(target: LOG_TARGET, "Loaded configuration from '{path}'");
        toml::from_str(&text).into_app_err_with(|| format!("parsing configuration file '{path}'"))
    }

    /// Reads the `AZURE_DEVOPS_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the environment layer from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut partial = Self {
            organization: lookup(ENV_ORGANIZATION),
            project: lookup(ENV_PROJECT),
            repository: lookup(ENV_REPOSITORY),
            personal_access_token: lookup(ENV_TOKEN),
            ..Self::default()
        };
        partial.api.base_url = lookup(ENV_BASE_URL);
        partial
    }
}

/// Merges layers in order and validates the result.
pub fn resolve(layers: impl IntoIterator<Item = PartialConfig>) -> Result<Settings, ConfigError> {
    Settings::resolve(&PartialConfig::merged(layers))
}

/// Writes the default configuration file.
pub fn save_default(output_path: &Utf8Path) -> Result<()> {
    fs::write(output_path, DEFAULT_CONFIG_TOML).into_app_err_with(|| format!("writing default configuration to '{output_path}'"))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_parses() {
        let defaults = PartialConfig::defaults();
        assert!(defaults.organization.is_none());
        assert!(defaults.api.base_url.is_some());
        assert!(defaults.cache.ttl.is_some());
    }

    #[test]
    fn test_env_layer() {
        let vars = HashMap::from([(ENV_ORGANIZATION, "env-org"), (ENV_TOKEN, "secret"), (ENV_BASE_URL, "http://localhost:1234")]);
        let partial = PartialConfig::from_lookup(|name| vars.get(name).map(ToString::to_string));
        assert_eq!(partial.organization.as_deref(), Some("env-org"));
        assert_eq!(partial.personal_access_token.as_deref(), Some("secret"));
        assert_eq!(partial.api.base_url.as_deref(), Some("http://localhost:1234"));
        assert!(partial.project.is_none());
    }

    #[test]
    fn test_layers_resolve_in_order() {
        let file = PartialConfig {
            organization: Some("file-org".into()),
            project: Some("file-project".into()),
            ..PartialConfig::default()
        };
        let env = PartialConfig::from_lookup(|name| (name == ENV_ORGANIZATION).then(|| "env-org".to_string()));
        let detected = RemoteLocation::parse("https://dev.azure.com/remote-org/remote-project/_git/repo").map(RemoteLocation::into_partial);
        let cli = PartialConfig {
            project: Some("cli-project".into()),
            ..PartialConfig::default()
        };

        let layers = [PartialConfig::defaults(), file, env, detected.unwrap_or_default(), cli];
        let settings = resolve(layers).unwrap();

        assert_eq!(settings.organization, "remote-org");
        assert_eq!(settings.project, "cli-project");
        assert_eq!(settings.repository.as_deref(), Some("repo"));
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_from_file_missing_default_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        assert_eq!(PartialConfig::from_file(&dir, None).unwrap(), PartialConfig::default());
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_from_file_explicit_missing_fails() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let _ = PartialConfig::from_file(&dir, Some(&dir.join("nope.toml"))).unwrap_err();
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_saved_default_round_trips() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        save_default(&dir.join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(PartialConfig::from_file(&dir, None).unwrap(), PartialConfig::defaults());
    }
}
