use super::Host;
use super::common::{CommonArgs, init_logging};
use crate::Result;
use crate::cache::{CacheManager, SystemClock, acquire_cache_lock};
use crate::config::{CacheSettings, PartialConfig};
use clap::{Parser, Subcommand};
use ohno::bail;
use std::io::Write;
use std::sync::Arc;

/// Log target for cache maintenance
const LOG_TARGET: &str = "     cache";

#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Show how much is cached and where
    Stats,
    /// Remove expired and corrupt entries, then shrink the cache below its size limit
    Cleanup,
    /// Remove every cached entry
    Clear,
}

pub async fn manage_cache<H: Host>(host: &mut H, args: &CacheArgs) -> Result<()> {
    init_logging(args.common.log_level);

    // maintenance works on the directory even when collection runs have caching turned off
    let mut cli = args.common.cli_layer();
    cli.cache.enabled = Some(true);

    let partial = PartialConfig::merged([PartialConfig::defaults(), args.common.file_layer()?, PartialConfig::from_env(), cli]);
    let settings = CacheSettings::resolve(&partial)?;
    log::debug!(target: LOG_TARGET, "Using cache directory '{}'", settings.directory.display());

    let _lock = match args.action {
        CacheAction::Stats => None,
        CacheAction::Cleanup | CacheAction::Clear => Some(acquire_cache_lock(&settings.directory).await?),
    };

    let manager = CacheManager::new(&settings, Arc::new(SystemClock))?;
    let mut out = host.output();

    match args.action {
        CacheAction::Stats => {
            let Some(stats) = manager.file_stats()? else {
                bail!("cache is disabled");
            };
            let _ = writeln!(out, "Cache directory: {}", stats.directory.display());
            let _ = writeln!(out, "Entries:         {} ({} expired)", stats.file_count, stats.expired_count);
            let _ = writeln!(
                out,
                "Size:            {} of {} ({:.1}%)",
                format_bytes(stats.total_bytes),
                format_bytes(stats.max_bytes),
                stats.utilization_percent
            );
        }

        CacheAction::Cleanup => {
            let summary = manager.cleanup()?;
            let report = summary.file;
            let _ = writeln!(
                out,
                "Removed {} expired, {} corrupt, and {} evicted entries; {} -> {}",
                report.expired_removed,
                report.corrupt_removed,
                report.evicted,
                format_bytes(report.bytes_before),
                format_bytes(report.bytes_after)
            );
        }

        CacheAction::Clear => {
            manager.clear()?;
            let _ = writeln!(out, "Cleared cache at {}", settings.directory.display());
        }
    }

    Ok(())
}

#[expect(clippy::cast_precision_loss, reason = "display only")]
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::cache::{SetOptions, keys};
    use crate::commands::TestHost;
    use crate::commands::common::{ColorMode, LogLevel};
    use camino::Utf8PathBuf;

    fn args(action: CacheAction, dir: &Utf8PathBuf) -> CacheArgs {
        CacheArgs {
            action,
            common: CommonArgs {
                config: None,
                repo: dir.clone(),
                cache_dir: Some(dir.join("cache")),
                color: ColorMode::Never,
                log_level: LogLevel::None,
            },
        }
    }

    fn manager(dir: &Utf8PathBuf) -> CacheManager {
        let mut partial = PartialConfig::defaults();
        partial.cache.directory = Some(dir.join("cache").into_std_path_buf());
        CacheManager::new(&CacheSettings::resolve(&partial).unwrap(), Arc::new(SystemClock)).unwrap()
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(100 * 1024 * 1024), "100.0 MiB");
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    async fn test_stats_then_clear() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();

        manager(&dir)
            .set(&keys::pull_request_key(7), &"cached".to_string(), SetOptions::default())
            .unwrap();

        let mut host = TestHost::new();
        manage_cache(&mut host, &args(CacheAction::Stats, &dir)).await.unwrap();
        assert!(host.output_str().contains("Entries:         1 (0 expired)"), "{}", host.output_str());

        let mut host = TestHost::new();
        manage_cache(&mut host, &args(CacheAction::Clear, &dir)).await.unwrap();
        assert!(host.output_str().starts_with("Cleared cache at "));
        assert!(!manager(&dir).has(&keys::pull_request_key(7)));
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    async fn test_cleanup_on_empty_cache() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();

        let mut host = TestHost::new();
        manage_cache(&mut host, &args(CacheAction::Cleanup, &dir)).await.unwrap();
        assert!(host.output_str().starts_with("Removed 0 expired, 0 corrupt, and 0 evicted entries"));
    }
}
