use crate::collector::Progress;
use core::fmt::{Debug, Formatter};
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;

const TICK: Duration = Duration::from_millis(100);

const BAR_TEMPLATE: &str = "{prefix:>10.bold.cyan} [{bar:30}] {pos}/{len} {msg}";
const BAR_TEMPLATE_PLAIN: &str = "{prefix:>10} [{bar:30}] {pos}/{len} {msg}";
const SPINNER_TEMPLATE: &str = "{prefix:>10.bold.cyan} {spinner} {msg}";
const SPINNER_TEMPLATE_PLAIN: &str = "{prefix:>10} {spinner} {msg}";

/// What the current phase reports on each tick.
enum Status {
    /// Known total: (total, done, message).
    Counted(Box<dyn Fn() -> (u64, u64, String) + Send + Sync>),

    /// Unknown total: a message, prefixed with the seconds spent in the phase.
    Open {
        message: Box<dyn Fn() -> String + Send + Sync>,
        since: Instant,
    },
}

/// Progress on standard error that only appears once work has run longer than a delay.
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
    shown: Arc<AtomicBool>,
    status: Arc<Mutex<Status>>,
    ticker: Arc<JoinHandle<()>>,
    use_colors: bool,
}

impl ProgressReporter {
    /// Creates a hidden reporter. Needs a tokio runtime.
    #[must_use]
    pub fn new(delay: Duration, use_colors: bool) -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden());
        let shown = Arc::new(AtomicBool::new(false));
        let status = Arc::new(Mutex::new(Status::Counted(Box::new(|| (0, 0, String::new())))));

        let ticker = tokio::spawn(tick(
            bar.clone(),
            Instant::now() + delay,
            Arc::clone(&shown),
            Arc::clone(&status),
        ));

        Self {
            bar,
            shown,
            status,
            ticker: Arc::new(ticker),
            use_colors,
        }
    }

    fn style(&self, colored: &str, plain: &str) -> ProgressStyle {
        let template = if self.use_colors { colored } else { plain };
        ProgressStyle::with_template(template).expect("progress templates are valid")
    }
}

impl Progress for ProgressReporter {
    fn set_phase(&self, phase: &str) {
        self.bar.set_prefix(phase.to_string());
    }

    fn set_determinate(&self, callback: Box<dyn Fn() -> (u64, u64, String) + Send + Sync + 'static>) {
        *self.status.lock().expect("lock poisoned") = Status::Counted(callback);
        self.bar.disable_steady_tick();
        self.bar.set_length(0);
        self.bar.set_position(0);
        self.bar.set_style(self.style(BAR_TEMPLATE, BAR_TEMPLATE_PLAIN).progress_chars("=> "));
    }

    fn set_indeterminate(&self, callback: Box<dyn Fn() -> String + Send + Sync + 'static>) {
        *self.status.lock().expect("lock poisoned") = Status::Open {
            message: callback,
            since: Instant::now(),
        };
        self.bar.set_style(self.style(SPINNER_TEMPLATE, SPINNER_TEMPLATE_PLAIN).tick_chars("|/-\\ "));
        self.bar.enable_steady_tick(TICK);
    }

    fn done(&self) {
        self.ticker.abort();
        if self.shown.load(Ordering::Relaxed) {
            self.bar.finish_and_clear();
        }
    }
}

impl Debug for ProgressReporter {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("shown", &self.shown)
            .field("use_colors", &self.use_colors)
            .finish_non_exhaustive()
    }
}

async fn tick(bar: ProgressBar, show_at: Instant, shown: Arc<AtomicBool>, status: Arc<Mutex<Status>>) {
    let mut interval = tokio::time::interval(TICK);
    #[expect(clippy::infinite_loop, reason = "task runs until aborted")]
    loop {
        let _ = interval.tick().await;

        if !shown.load(Ordering::Relaxed) {
            if Instant::now() < show_at {
                continue;
            }
            shown.store(true, Ordering::Relaxed);
            bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        }

        let message = match &*status.lock().expect("lock poisoned") {
            Status::Counted(callback) => {
                let (total, done, message) = callback();
                if total > 0 {
                    bar.set_length(total);
                    bar.set_position(done);
                }
                message
            }
            Status::Open { message, since } => format!("{}s {}", since.elapsed().as_secs(), message()),
        };
        bar.set_message(message);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hidden_before_delay() {
        let reporter = ProgressReporter::new(Duration::from_hours(1), false);
        reporter.set_phase("Fetching");
        reporter.set_determinate(Box::new(|| (10, 3, "pull requests".to_string())));
        tokio::time::sleep(TICK * 3).await;
        assert!(!reporter.shown.load(Ordering::Relaxed));
        reporter.done();
    }

    #[tokio::test]
    async fn test_switching_modes() {
        let reporter = ProgressReporter::new(Duration::ZERO, true);
        reporter.set_indeterminate(Box::new(|| "sizing".to_string()));
        assert!(matches!(*reporter.status.lock().unwrap(), Status::Open { .. }));
        reporter.set_determinate(Box::new(|| (5, 5, String::new())));
        assert!(matches!(*reporter.status.lock().unwrap(), Status::Counted(_)));
        tokio::time::sleep(TICK * 2).await;
        assert!(reporter.shown.load(Ordering::Relaxed));
        reporter.done();
    }
}
