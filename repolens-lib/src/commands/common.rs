//! Arguments and setup shared by the commands.

use crate::Result;
use crate::config::{PartialConfig, RemoteLocation};
use crate::git;
use camino::Utf8PathBuf;
use clap::{Args, ValueEnum};
use core::time::Duration;
use std::io::IsTerminal;

/// Log target for command setup
const LOG_TARGET: &str = "  commands";

/// Color mode configuration for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Always use colors
    Always,

    /// Never use colors
    Never,

    /// Use colors if the output is a terminal, otherwise don't use colors
    Auto,
}

impl ColorMode {
    /// Whether to color a stream, given whether it is a terminal.
    #[must_use]
    pub fn enabled(self, is_terminal: impl FnOnce() -> bool) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => is_terminal(),
        }
    }

    #[must_use]
    pub fn for_stdout(self) -> bool {
        self.enabled(|| std::io::stdout().is_terminal())
    }

    #[must_use]
    pub fn for_stderr(self) -> bool {
        self.enabled(|| std::io::stderr().is_terminal())
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,

    /// Only error messages
    Error,

    /// Warning and error messages
    Warn,

    /// Info, warning, and error messages
    Info,

    /// Debug, info, warning, and error messages
    Debug,

    /// Trace, debug, info, warning, and error messages
    Trace,
}

impl LogLevel {
    /// How long work must run before a progress bar appears. Logging and a progress bar don't mix,
    /// so with logging on the bar effectively never shows.
    #[must_use]
    pub const fn progress_delay(self) -> Duration {
        match self {
            Self::None => Duration::from_millis(300),
            _ => Duration::from_hours(365 * 24),
        }
    }
}

/// Arguments shared by every command that touches configuration or the cache
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Path to configuration file (default is `repolens.toml` in the repository)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Path to the git repository
    #[arg(long, default_value = ".", value_name = "PATH")]
    pub repo: Utf8PathBuf,

    /// Directory where fetched pull requests are cached
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<Utf8PathBuf>,

    /// Control when to use colored output
    #[arg(long, value_name = "WHEN", default_value = "auto")]
    pub color: ColorMode,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "none", global = true)]
    pub log_level: LogLevel,
}

impl CommonArgs {
    /// The configuration file layer.
    pub fn file_layer(&self) -> Result<PartialConfig> {
        PartialConfig::from_file(&self.repo, self.config.as_deref())
    }

    /// Settings given directly on the command line.
    #[must_use]
    pub fn cli_layer(&self) -> PartialConfig {
        let mut layer = PartialConfig::default();
        layer.cache.directory = self.cache_dir.as_ref().map(|dir| dir.as_std_path().to_path_buf());
        layer
    }

    /// Organization, project, and repository detected from the `origin` remote.
    pub async fn detected_layer(&self) -> PartialConfig {
        match git::remote_url(&self.repo).await {
            Ok(Some(url)) => RemoteLocation::parse(&url).map_or_else(
                || {
                    log::debug!(target: LOG_TARGET, "Remote '{url}' is not an Azure Repos URL");
                    PartialConfig::default()
                },
                |location| {
                    log::debug!(
                        target: LOG_TARGET,
                        "Detected {}/{}/{} from the origin remote",
                        location.organization,
                        location.project,
                        location.repository
                    );
                    location.into_partial()
                },
            ),
            Ok(None) => PartialConfig::default(),
            Err(e) => {
                log::debug!(target: LOG_TARGET, "Could not read the origin remote: {e:#}");
                PartialConfig::default()
            }
        }
    }
}

/// Initialize logger based on log level
pub fn init_logging(log_level: LogLevel) {
    let level = match log_level {
        LogLevel::None => return,
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    // a second command in the same process keeps the first logger
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug | LogLevel::Trace))
        .try_init();
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_color_mode() {
        assert!(ColorMode::Always.enabled(|| false));
        assert!(!ColorMode::Never.enabled(|| true));
        assert!(ColorMode::Auto.enabled(|| true));
        assert!(!ColorMode::Auto.enabled(|| false));
    }

    #[test]
    fn test_progress_delay() {
        assert!(LogLevel::None.progress_delay() < Duration::from_secs(1));
        assert!(LogLevel::Info.progress_delay() > Duration::from_hours(24));
    }

    #[test]
    fn test_cli_layer_carries_cache_dir() {
        let args = CommonArgs {
            config: None,
            repo: ".".into(),
            cache_dir: Some("/tmp/repolens-cache".into()),
            color: ColorMode::Never,
            log_level: LogLevel::None,
        };
        assert_eq!(
            args.cli_layer().cache.directory.as_deref(),
            Some(std::path::Path::new("/tmp/repolens-cache"))
        );
    }
}
