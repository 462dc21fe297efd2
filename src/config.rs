use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs::data_dir;
use serde::{Deserialize, Serialize};

/// Main configuration structure for statscard
///
/// Values come from an optional YAML file with environment variables layered
/// on top. The environment names (`ACCESS_TOKEN`, `GITHUB_ACTOR`, `EXCLUDED`,
/// `EXCLUDED_LANGS`, `EXCLUDE_FORKED_REPOS`) match the workflow contract, so
/// a CI run needs no config file at all.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// GitHub account settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Repository and language exclusion settings
    #[serde(default)]
    pub exclusions: ExclusionConfig,

    /// Network fetch behavior
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Response cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Artifact output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// GitHub account configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// Username whose statistics are collected (env: GITHUB_ACTOR)
    pub username: Option<String>,

    /// API base URL; overridable for testing against a mock server
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

/// Exclusion filters applied during aggregation
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ExclusionConfig {
    /// Repository identifiers (owner/name) to skip; `*` globs allowed
    /// (env: EXCLUDED, comma-separated)
    #[serde(default)]
    pub repos: Vec<String>,

    /// Language names to skip, case-insensitive
    /// (env: EXCLUDED_LANGS, comma-separated)
    #[serde(default)]
    pub languages: Vec<String>,

    /// Skip forked repositories entirely (env: EXCLUDE_FORKED_REPOS)
    #[serde(default)]
    pub exclude_forks: bool,
}

/// Network fetch configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FetchConfig {
    /// Maximum concurrent per-repository API requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Bounded retry policy for rate-limit and transport failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Attempts to poll a statistics endpoint that answers 202 Accepted
    /// while GitHub computes the result, one second apart
    #[serde(default = "default_pending_attempts")]
    pub pending_stats_attempts: u32,

    /// Overall run timeout in seconds, bounding CI execution cost
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
}

/// Bounded retry policy with exponential backoff
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetryConfig {
    /// Maximum attempts before a retryable error becomes fatal
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubled on each subsequent attempt
    #[serde(default = "default_retry_delay")]
    pub initial_delay_ms: u64,
}

/// Response cache configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    /// Enable the repository statistics cache
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cache database location (defaults to XDG data dir)
    pub path: Option<String>,

    /// Entries older than this are refetched
    #[serde(default = "default_cache_age")]
    pub max_age_hours: i64,
}

/// Artifact output configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OutputConfig {
    /// Directory where overview.svg and languages.svg are written
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Directory containing the SVG templates
    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,
}

// Default value functions
fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_max_concurrent() -> usize {
    10
}
fn default_pending_attempts() -> u32 {
    10
}
fn default_run_timeout() -> u64 {
    600
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_true() -> bool {
    true
}
fn default_cache_age() -> i64 {
    6
}
fn default_output_dir() -> String {
    "generated".to_string()
}
fn default_templates_dir() -> String {
    "templates".to_string()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            username: None,
            api_base: default_api_base(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            retry: RetryConfig::default(),
            pending_stats_attempts: default_pending_attempts(),
            run_timeout_secs: default_run_timeout(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            initial_delay_ms: default_retry_delay(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: None,
            max_age_hours: default_cache_age(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            templates_dir: default_templates_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github: GitHubConfig::default(),
            exclusions: ExclusionConfig::default(),
            fetch: FetchConfig::default(),
            cache: CacheConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration, preferring the given file when present, then
    /// apply environment overrides
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.expand_paths()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Layer workflow environment variables over file-sourced values
    ///
    /// Environment always wins so that a CI secret or workflow input cannot
    /// be shadowed by a stale config file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(actor) = std::env::var("GITHUB_ACTOR") {
            if !actor.trim().is_empty() {
                self.github.username = Some(actor.trim().to_string());
            }
        }

        if let Ok(excluded) = std::env::var("EXCLUDED") {
            self.exclusions.repos = split_list(&excluded);
        }

        if let Ok(langs) = std::env::var("EXCLUDED_LANGS") {
            self.exclusions.languages = split_list(&langs);
        }

        if let Ok(flag) = std::env::var("EXCLUDE_FORKED_REPOS") {
            self.exclusions.exclude_forks = flag.trim().to_lowercase() != "false";
        }
    }

    /// Expand environment variables in configured paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.output.dir = shellexpand::full(&self.output.dir)
            .context("Failed to expand output directory path")?
            .into_owned();

        self.output.templates_dir = shellexpand::full(&self.output.templates_dir)
            .context("Failed to expand templates directory path")?
            .into_owned();

        if let Some(path) = &self.cache.path {
            self.cache.path = Some(
                shellexpand::full(path)
                    .context("Failed to expand cache path")?
                    .into_owned(),
            );
        }

        Ok(())
    }

    /// Resolve the API credential from the environment
    ///
    /// `ACCESS_TOKEN` is the workflow contract; `GITHUB_TOKEN` is the name
    /// GitHub Actions provides automatically.
    pub fn resolve_token() -> Result<String> {
        let token = std::env::var("ACCESS_TOKEN")
            .or_else(|_| std::env::var("GITHUB_TOKEN"))
            .context("ACCESS_TOKEN or GITHUB_TOKEN environment variable is required")?;

        if token.trim().is_empty() {
            anyhow::bail!("ACCESS_TOKEN is empty");
        }

        Ok(token.trim().to_string())
    }

    /// Username whose statistics are collected
    pub fn username(&self) -> Result<&str> {
        self.github
            .username
            .as_deref()
            .context("GitHub username not configured (set GITHUB_ACTOR or github.username)")
    }

    /// Resolve the cache database path (XDG compliant default)
    pub fn cache_path(&self) -> PathBuf {
        if let Some(path) = &self.cache.path {
            return PathBuf::from(path);
        }

        let base = data_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        base.join("statscard").join("cache.db")
    }

    /// Excluded language names, lowercased for case-insensitive matching
    pub fn excluded_languages(&self) -> HashSet<String> {
        self.exclusions
            .languages
            .iter()
            .map(|l| l.to_lowercase())
            .collect()
    }
}

/// Split a comma-separated environment value into trimmed entries
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::env;

    use serial_test::serial;
    use tempfile::TempDir;

    use super::*;

    fn clear_workflow_env() {
        for var in [
            "GITHUB_ACTOR",
            "EXCLUDED",
            "EXCLUDED_LANGS",
            "EXCLUDE_FORKED_REPOS",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.github.api_base, "https://api.github.com");
        assert!(config.exclusions.repos.is_empty());
        assert!(!config.exclusions.exclude_forks);
        assert_eq!(config.fetch.max_concurrent, 10);
        assert_eq!(config.fetch.retry.max_attempts, 3);
        assert_eq!(config.fetch.retry.initial_delay_ms, 1000);
        assert_eq!(config.fetch.pending_stats_attempts, 10);
        assert_eq!(config.fetch.run_timeout_secs, 600);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.max_age_hours, 6);
        assert_eq!(config.output.dir, "generated");
        assert_eq!(config.output.templates_dir, "templates");
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_workflow_env();
        env::set_var("GITHUB_ACTOR", "octocat");
        env::set_var("EXCLUDED", "octocat/dotfiles, octocat/secret-*");
        env::set_var("EXCLUDED_LANGS", "HTML, Jupyter Notebook");
        env::set_var("EXCLUDE_FORKED_REPOS", "true");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.github.username.as_deref(), Some("octocat"));
        assert_eq!(
            config.exclusions.repos,
            vec!["octocat/dotfiles", "octocat/secret-*"]
        );
        assert_eq!(config.exclusions.languages, vec!["HTML", "Jupyter Notebook"]);
        assert!(config.exclusions.exclude_forks);

        clear_workflow_env();
    }

    #[test]
    #[serial]
    fn test_exclude_forks_only_false_disables() {
        clear_workflow_env();

        // The workflow contract treats any value other than "false" as true
        env::set_var("EXCLUDE_FORKED_REPOS", "FALSE");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert!(!config.exclusions.exclude_forks);

        env::set_var("EXCLUDE_FORKED_REPOS", "yes");
        config.apply_env_overrides();
        assert!(config.exclusions.exclude_forks);

        clear_workflow_env();
    }

    #[test]
    #[serial]
    fn test_resolve_token_prefers_access_token() {
        env::set_var("ACCESS_TOKEN", "ghp_primary");
        env::set_var("GITHUB_TOKEN", "ghp_fallback");

        assert_eq!(Config::resolve_token().unwrap(), "ghp_primary");

        env::remove_var("ACCESS_TOKEN");
        assert_eq!(Config::resolve_token().unwrap(), "ghp_fallback");

        env::remove_var("GITHUB_TOKEN");
        assert!(Config::resolve_token().is_err());
    }

    #[test]
    fn test_excluded_languages_lowercased() {
        let mut config = Config::default();
        config.exclusions.languages = vec!["HTML".to_string(), "TeX".to_string()];

        let langs = config.excluded_languages();
        assert!(langs.contains("html"));
        assert!(langs.contains("tex"));
        assert!(!langs.contains("HTML"));
    }

    #[test]
    fn test_split_list_trims_and_drops_empty() {
        assert_eq!(split_list("a, b ,,c"), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.yml"));
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_yaml_parsing() {
        clear_workflow_env();

        let yaml_content = r#"
github:
  username: "octocat"
exclusions:
  repos:
    - "octocat/dotfiles"
  languages:
    - "TeX"
  exclude_forks: true
fetch:
  max_concurrent: 4
  retry:
    max_attempts: 5
    initial_delay_ms: 250
cache:
  enabled: false
  max_age_hours: 12
output:
  dir: "out"
"#;

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.yml");
        std::fs::write(&config_path, yaml_content).expect("Failed to write test config");

        let config = Config::load_or_default(Some(&config_path)).expect("Failed to load config");

        assert_eq!(config.github.username.as_deref(), Some("octocat"));
        assert_eq!(config.exclusions.repos, vec!["octocat/dotfiles"]);
        assert!(config.exclusions.exclude_forks);
        assert_eq!(config.fetch.max_concurrent, 4);
        assert_eq!(config.fetch.retry.max_attempts, 5);
        assert_eq!(config.fetch.retry.initial_delay_ms, 250);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.max_age_hours, 12);
        assert_eq!(config.output.dir, "out");
        // Unspecified sections keep their defaults
        assert_eq!(config.output.templates_dir, "templates");
    }

    #[test]
    #[serial]
    fn test_expand_paths() {
        clear_workflow_env();
        env::set_var("TEST_STATSCARD_OUT", "/test/out");

        let mut config = Config::default();
        config.output.dir = "${TEST_STATSCARD_OUT}/cards".to_string();

        config.expand_paths().expect("Failed to expand paths");
        assert_eq!(config.output.dir, "/test/out/cards");

        env::remove_var("TEST_STATSCARD_OUT");
    }

    #[test]
    fn test_cache_path_override() {
        let mut config = Config::default();
        config.cache.path = Some("/custom/cache.db".to_string());

        assert_eq!(config.cache_path(), PathBuf::from("/custom/cache.db"));
    }
}
