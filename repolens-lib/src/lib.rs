#![doc(hidden)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core library for repolens
//!
//! This library holds the pull-request integration subsystem of the repolens tool: it fetches
//! pull requests from Azure DevOps, keeps them in a two-tier cache, and links each pull request
//! to the commits that implement it.
//!
//! # Module Organization
//!
//! - [`commands`]: Command-line interface and orchestration
//! - [`config`]: Layered configuration resolution
//! - [`model`]: Pull request, commit, and association records
//! - [`api`]: Rate-limited, retrying Azure DevOps client
//! - [`cache`]: Memory and file cache tiers and their manager
//! - [`linking`]: Pull request to commit record linkage
//! - [`collector`]: End-to-end orchestration of fetch, link, and cache
//! - [`git`]: Commit input adapter over `git log`

pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

pub mod api;
pub mod cache;
pub mod collector;
pub mod commands;
pub mod config;
pub mod errors;
pub mod git;
pub mod linking;
pub mod model;

pub use crate::commands::{Host, run};
