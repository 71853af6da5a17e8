//! End-to-end orchestration: configuration, cache, client, and linker wired into one collection
//! run.

mod pr_collector;
mod progress;

pub use pr_collector::{CollectRequest, CollectionOutcome, Collector, CollectorState};
pub use progress::Progress;
