//! Run orchestration
//!
//! A run moves through fetch, aggregate, and render phases in order; any
//! fatal error abandons the run before a single byte reaches the output
//! directory. Both artifacts are rendered to memory first and then written
//! via temp-file-and-rename, so observers never see a partial SVG.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{io_error, Result, StatsError};
use crate::github::StatsSource;
use crate::render::{render_languages, render_overview};
use crate::stats::{aggregate, AggregateStats, ExclusionSet};

/// Phase of a statistics run, for logging and failure attribution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Fetching,
    Aggregating,
    Rendering,
    Done,
    Failed,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Init => "init",
            RunPhase::Fetching => "fetching",
            RunPhase::Aggregating => "aggregating",
            RunPhase::Rendering => "rendering",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        }
    }
}

/// Results from a complete statistics run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Repositories whose details were fetched, after up-front exclusions
    /// (the listing itself may have seen more)
    pub fetched_repositories: usize,
    /// Repositories that contributed to the totals after exclusions
    pub included_repositories: usize,
    /// Aggregated totals the artifacts were rendered from
    pub totals: AggregateStats,
    /// Paths of the written artifacts
    pub artifacts: Vec<PathBuf>,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

/// The engine that drives one fetch-aggregate-render run
pub struct StatsEngine {
    config: Arc<Config>,
    source: Arc<dyn StatsSource>,
}

impl StatsEngine {
    /// Create an engine over any statistics source
    pub fn new(config: Config, source: Arc<dyn StatsSource>) -> Self {
        Self {
            config: Arc::new(config),
            source,
        }
    }

    /// Run the full pipeline and write both artifacts
    pub async fn run(&self) -> Result<RunSummary> {
        let result = self.run_inner().await;
        if result.is_err() {
            debug!("Run phase: {}", RunPhase::Failed.as_str());
        }
        result
    }

    async fn run_inner(&self) -> Result<RunSummary> {
        let start_time = Instant::now();
        let run_timeout = Duration::from_secs(self.config.fetch.run_timeout_secs);

        debug!("Run phase: {}", RunPhase::Fetching.as_str());
        let repos = timeout(run_timeout, self.source.fetch_repositories())
            .await
            .map_err(|_| StatsError::Network {
                message: format!("run timed out after {}s", run_timeout.as_secs()),
            })??;

        debug!("Run phase: {}", RunPhase::Aggregating.as_str());
        let exclusions = ExclusionSet::from_config(&self.config);
        let totals = aggregate(&repos, &exclusions);

        info!(
            "Aggregated {} of {} repositories: {} stars, {} forks, {} commits, {} languages",
            totals.total_repos,
            repos.len(),
            totals.total_stars,
            totals.total_forks,
            totals.total_commits,
            totals.languages.len()
        );

        debug!("Run phase: {}", RunPhase::Rendering.as_str());
        let templates_dir = Path::new(&self.config.output.templates_dir);
        let overview_template = read_template(&templates_dir.join("overview.svg"))?;
        let languages_template = read_template(&templates_dir.join("languages.svg"))?;

        // Render everything before writing anything: a render failure must
        // leave the output directory untouched
        let overview = render_overview(&totals, self.source.display_name(), &overview_template)?;
        let languages = render_languages(&totals, &languages_template)?;

        let output_dir = Path::new(&self.config.output.dir);
        std::fs::create_dir_all(output_dir)
            .map_err(|e| io_error(output_dir.to_path_buf(), e))?;

        let overview_path = output_dir.join("overview.svg");
        let languages_path = output_dir.join("languages.svg");
        write_all_atomically(&[
            (overview_path.clone(), overview),
            (languages_path.clone(), languages),
        ])?;

        let duration = start_time.elapsed();
        debug!("Run phase: {}", RunPhase::Done.as_str());
        info!(
            "Generated {} and {} in {:.2}s",
            overview_path.display(),
            languages_path.display(),
            duration.as_secs_f64()
        );

        Ok(RunSummary {
            fetched_repositories: repos.len(),
            included_repositories: totals.total_repos,
            totals,
            artifacts: vec![overview_path, languages_path],
            duration,
        })
    }

    /// Get configuration for external inspection
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Read a template file, attributing failures to the path
fn read_template(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| io_error(path.to_path_buf(), e))
}

/// Write a set of files via temporary siblings, renaming only after every
/// write has succeeded
///
/// Rename within one directory is atomic on the platforms we run on, and no
/// rename happens until all content is staged, so a failure partway through
/// cannot leave the artifacts inconsistent with each other: previous versions
/// stay in place and staged files are removed.
fn write_all_atomically(artifacts: &[(PathBuf, String)]) -> Result<()> {
    let mut staged = Vec::with_capacity(artifacts.len());

    for (path, content) in artifacts {
        let tmp_path = path.with_extension("svg.tmp");
        if let Err(e) = std::fs::write(&tmp_path, content) {
            discard_staged(&staged);
            let _ = std::fs::remove_file(&tmp_path);
            return Err(io_error(tmp_path, e));
        }
        staged.push(tmp_path);
    }

    for (tmp_path, (path, _)) in staged.iter().zip(artifacts) {
        if let Err(e) = std::fs::rename(tmp_path, path) {
            discard_staged(&staged);
            return Err(io_error(path.clone(), e));
        }
    }

    Ok(())
}

fn discard_staged(staged: &[PathBuf]) {
    for tmp_path in staged {
        let _ = std::fs::remove_file(tmp_path);
    }
}
