//! Commit input read from a local git repository.

mod log_reader;

pub use log_reader::{LogOptions, parse_log, read_commits, remote_url};
