//! statscard - Deterministic GitHub statistics card generator
//!
//! statscard fetches a user's repository statistics from the GitHub API,
//! aggregates them with configurable exclusions, and renders two
//! reproducible SVG artifacts: an overview card and a language
//! distribution card.
//!
//! ## Core Features
//!
//! - **GitHub Integration**: Paged repository discovery plus per-repository
//!   language bytes and commit deltas, merged into one record per repo
//! - **Exclusion Filtering**: Skip repositories by name or glob, languages
//!   by name, and forks wholesale
//! - **Deterministic Rendering**: Frozen formatting contract so identical
//!   data always produces byte-identical SVG output
//! - **Response Caching**: SQLite-backed write-through memo keyed by
//!   repository, safely ignorable when cold or disabled
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and environment overrides
//! - [`github`]: GitHub API client and retry policy
//! - [`stats`]: Data model and pure aggregation
//! - [`render`]: SVG template rendering
//! - [`cache`]: Repository statistics cache
//! - [`pipeline`]: Run orchestration and atomic artifact writes

pub mod cache;
pub mod config;
pub mod error;
pub mod github;
pub mod pipeline;
pub mod render;
pub mod stats;

pub use cache::Cache;
pub use config::Config;
pub use error::{Result, StatsError};
pub use github::{GitHubClient, StatsSource};
pub use pipeline::{RunSummary, StatsEngine};
pub use stats::{aggregate, AggregateStats, ExclusionSet, RepositoryStat};
