//! Data model and aggregation
//!
//! [`aggregate`] is a pure fold over fetched [`RepositoryStat`] entries: no
//! I/O, no side effects, deterministic output. All exclusion rules are
//! enforced here so the rendered artifacts can never reflect an excluded
//! repository or language, regardless of what the fetch layer returned.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Per-repository statistics fetched from the API
///
/// Immutable once fetched; a cache refresh replaces the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryStat {
    /// Repository identifier in owner/name form
    pub full_name: String,

    /// Whether the repository is a fork
    pub fork: bool,

    /// Star count
    pub stargazers: u64,

    /// Fork count
    pub forks: u64,

    /// Language name to byte count
    pub languages: HashMap<String, u64>,

    /// Lines added by the configured user across all weeks
    pub lines_added: u64,

    /// Lines removed by the configured user across all weeks
    pub lines_deleted: u64,

    /// Commits by the configured user
    pub commits: u64,
}

/// Exclusion filters, resolved once at run start and immutable thereafter
#[derive(Debug, Clone)]
pub struct ExclusionSet {
    repo_patterns: Vec<RepoPattern>,
    languages: HashSet<String>,
    exclude_forks: bool,
}

/// A repository exclusion entry: exact owner/name or a `*` glob
#[derive(Debug, Clone)]
enum RepoPattern {
    Exact(String),
    Glob(Regex),
}

impl ExclusionSet {
    /// Build the exclusion set from configuration
    ///
    /// HTML is always excluded from language totals: it is dominated by
    /// generated documentation and skews byte counts badly.
    pub fn from_config(config: &Config) -> Self {
        let mut languages = config.excluded_languages();
        languages.insert("html".to_string());

        Self {
            repo_patterns: config
                .exclusions
                .repos
                .iter()
                .map(|p| RepoPattern::compile(p))
                .collect(),
            languages,
            exclude_forks: config.exclusions.exclude_forks,
        }
    }

    /// Construct directly, mainly for tests
    pub fn new(repos: &[&str], languages: &[&str], exclude_forks: bool) -> Self {
        let mut language_set: HashSet<String> =
            languages.iter().map(|l| l.to_lowercase()).collect();
        language_set.insert("html".to_string());

        Self {
            repo_patterns: repos.iter().map(|p| RepoPattern::compile(p)).collect(),
            languages: language_set,
            exclude_forks,
        }
    }

    /// Whether a repository identifier (owner/name) is excluded by name
    pub fn is_repo_excluded(&self, full_name: &str) -> bool {
        self.repo_patterns.iter().any(|p| p.matches(full_name))
    }

    /// Whether a language is excluded (case-insensitive)
    pub fn is_language_excluded(&self, language: &str) -> bool {
        self.languages.contains(&language.to_lowercase())
    }

    /// Whether forked repositories are excluded wholesale
    pub fn exclude_forks(&self) -> bool {
        self.exclude_forks
    }

    /// Whether this repository contributes nothing to the aggregate
    pub fn is_excluded(&self, repo: &RepositoryStat) -> bool {
        (self.exclude_forks && repo.fork) || self.is_repo_excluded(&repo.full_name)
    }
}

impl RepoPattern {
    fn compile(pattern: &str) -> Self {
        if pattern.contains('*') {
            let escaped = pattern.replace('.', r"\.").replace('*', ".*");
            match Regex::new(&format!("^{}$", escaped)) {
                Ok(re) => RepoPattern::Glob(re),
                // An unparsable pattern excludes nothing rather than aborting
                Err(_) => RepoPattern::Exact(pattern.to_string()),
            }
        } else {
            RepoPattern::Exact(pattern.to_string())
        }
    }

    fn matches(&self, full_name: &str) -> bool {
        match self {
            RepoPattern::Exact(name) => full_name == name,
            RepoPattern::Glob(re) => re.is_match(full_name),
        }
    }
}

/// Totals across all non-excluded repositories
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_stars: u64,
    pub total_forks: u64,
    pub total_commits: u64,
    pub lines_added: u64,
    pub lines_deleted: u64,
    /// Count of repositories that contributed to the totals
    pub total_repos: usize,
    /// Merged language byte counts across included repositories
    pub languages: HashMap<String, u64>,
}

/// One language's share of the included byte total
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageShare {
    pub name: String,
    pub bytes: u64,
    /// Share of total included bytes, 0.0 to 100.0
    pub percentage: f64,
}

impl AggregateStats {
    /// Total lines changed (added + removed)
    pub fn lines_changed(&self) -> u64 {
        self.lines_added + self.lines_deleted
    }

    /// Language shares ordered by byte count descending, then name ascending
    ///
    /// The ordering is part of the rendering contract: artifacts must be
    /// reproducible byte-for-byte across runs and implementations.
    pub fn language_breakdown(&self) -> Vec<LanguageShare> {
        let total_bytes: u64 = self.languages.values().sum();

        let mut shares: Vec<LanguageShare> = self
            .languages
            .iter()
            .map(|(name, &bytes)| LanguageShare {
                name: name.clone(),
                bytes,
                percentage: if total_bytes > 0 {
                    (bytes as f64 / total_bytes as f64) * 100.0
                } else {
                    0.0
                },
            })
            .collect();

        shares.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.name.cmp(&b.name)));
        shares
    }
}

/// Fold repository statistics into totals, applying exclusions
///
/// Excluded repositories (by name or by fork flag when fork exclusion is on)
/// contribute to no total at all; excluded languages are dropped from the
/// merged byte map of every included repository.
pub fn aggregate(repos: &[RepositoryStat], exclusions: &ExclusionSet) -> AggregateStats {
    let mut totals = AggregateStats::default();

    for repo in repos {
        if exclusions.is_excluded(repo) {
            continue;
        }

        totals.total_stars += repo.stargazers;
        totals.total_forks += repo.forks;
        totals.total_commits += repo.commits;
        totals.lines_added += repo.lines_added;
        totals.lines_deleted += repo.lines_deleted;
        totals.total_repos += 1;

        for (language, bytes) in &repo.languages {
            if exclusions.is_language_excluded(language) {
                continue;
            }
            *totals.languages.entry(language.clone()).or_insert(0) += bytes;
        }
    }

    totals
}
