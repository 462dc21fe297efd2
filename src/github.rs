//! GitHub API client
//!
//! Fetches everything a run needs: the authenticated user's repository list
//! (paged, no fixed upper bound) and, per repository, language byte counts
//! and the user's commit deltas. The three API responses per repository are
//! merged into one [`RepositoryStat`].
//!
//! Listing and credential verification go through octocrab; the per-repo
//! detail endpoints use raw REST because `stats/contributors` answers
//! 202 Accepted while GitHub computes the result and the status code must
//! be visible to the polling loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use octocrab::Octocrab;
use reqwest::{header, Client, Response, StatusCode};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::config::{Config, FetchConfig, RetryConfig};
use crate::error::{Result, StatsError};
use crate::stats::{ExclusionSet, RepositoryStat};

/// Commit deltas attributable to one user in one repository
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitDeltas {
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub commits: u64,
}

/// Source of repository statistics
///
/// The pipeline depends on this seam rather than on the concrete client so
/// tests can drive it with canned data.
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Fetch statistics for every repository of the configured user
    async fn fetch_repositories(&self) -> Result<Vec<RepositoryStat>>;

    /// Display name for rendered artifacts (profile name or login)
    fn display_name(&self) -> &str;
}

/// GitHub client with credential verification and bounded concurrency
pub struct GitHubClient {
    octo: Octocrab,
    http: Client,
    token: String,
    api_base: String,
    username: String,
    display_name: String,
    exclusions: ExclusionSet,
    cache: Option<Cache>,
    fetch: FetchConfig,
    semaphore: Arc<Semaphore>,
}

impl GitHubClient {
    /// Create a client and verify the credential before any other fetching
    pub async fn new(config: &Config, token: String, cache: Option<Cache>) -> Result<Self> {
        let octo = Octocrab::builder()
            .personal_token(token.clone())
            .base_uri(config.github.api_base.as_str())
            .map_err(|e| StatsError::config(format!("invalid API base URL: {e}")))?
            .build()
            .map_err(|e| StatsError::config(format!("failed to build GitHub client: {e}")))?;

        // Auth check up front: an invalid credential must fail here, not
        // halfway through a fetch. A server hiccup keeps its own class so
        // it gets the retry budget instead of masquerading as a bad token.
        let authenticated =
            retry_with_backoff(&config.fetch.retry, "verify credentials", || async {
                octo.current().user().await.map_err(StatsError::from)
            })
            .await?;

        let username = config
            .github
            .username
            .clone()
            .unwrap_or_else(|| authenticated.login.clone());

        info!("Authenticated as GitHub user: {}", username);

        let http = Client::builder()
            .user_agent(concat!("statscard/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        let mut client = Self {
            octo,
            http,
            token,
            api_base: config.github.api_base.trim_end_matches('/').to_string(),
            username,
            display_name: String::new(),
            exclusions: ExclusionSet::from_config(config),
            cache,
            fetch: config.fetch.clone(),
            semaphore: Arc::new(Semaphore::new(config.fetch.max_concurrent.max(1))),
        };

        let display_name = client.fetch_display_name().await;
        client.display_name = display_name;
        Ok(client)
    }

    /// The username statistics are attributed to
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Profile name, falling back to the login when unset
    async fn fetch_display_name(&self) -> String {
        let path = format!("/users/{}", self.username);
        match self.rest_get_json(&path).await {
            Ok(profile) => profile["name"]
                .as_str()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(&self.username)
                .to_string(),
            Err(e) => {
                debug!("Could not fetch profile name ({}), using login", e);
                self.username.clone()
            }
        }
    }

    /// List all repositories for the authenticated user, paging to the end
    async fn list_repositories(&self) -> Result<Vec<octocrab::models::Repository>> {
        debug!("Fetching repository list for: {}", self.username);

        let mut repositories = Vec::new();
        let mut page = 1u8;

        loop {
            let page_repos =
                retry_with_backoff(&self.fetch.retry, "list repositories", || async {
                    self.octo
                        .current()
                        .list_repos_for_authenticated_user()
                        .per_page(100)
                        .page(page)
                        .send()
                        .await
                        .map_err(StatsError::from)
                })
                .await?;

            let items = page_repos.items;
            if items.is_empty() {
                break;
            }

            repositories.extend(items);

            // GitHub API pagination limit for u8
            if page >= 255 {
                warn!("Reached maximum pagination limit (255 pages)");
                break;
            }
            page += 1;
        }

        info!("Found {} repositories", repositories.len());
        Ok(repositories)
    }

    /// Fetch details for one repository, consulting the cache first
    async fn fetch_repository_stat(
        &self,
        full_name: &str,
        fork: bool,
        stargazers: u64,
        forks: u64,
    ) -> Result<RepositoryStat> {
        // Commit deltas are attributed to the configured user, so the memo
        // key must carry the user as well as the repository
        let cache_key = format!("{}:{}", self.username.to_lowercase(), full_name);

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&cache_key) {
                return Ok(cached);
            }
        }

        let languages = self.fetch_languages(full_name).await?;
        let deltas = self.fetch_commit_deltas(full_name).await?;

        let stat = RepositoryStat {
            full_name: full_name.to_string(),
            fork,
            stargazers,
            forks,
            languages,
            lines_added: deltas.lines_added,
            lines_deleted: deltas.lines_deleted,
            commits: deltas.commits,
        };

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&cache_key, &stat) {
                warn!("Failed to cache {}: {}", full_name, e);
            }
        }

        Ok(stat)
    }

    /// Language byte counts for one repository
    async fn fetch_languages(
        &self,
        full_name: &str,
    ) -> Result<std::collections::HashMap<String, u64>> {
        let path = format!("/repos/{}/languages", full_name);
        let value = retry_with_backoff(&self.fetch.retry, &path, || self.rest_get_json(&path))
            .await?;

        let Some(map) = value.as_object() else {
            return Err(StatsError::Api {
                path,
                message: "languages response is not an object".to_string(),
            });
        };

        Ok(map
            .iter()
            .filter_map(|(lang, bytes)| bytes.as_u64().map(|b| (lang.clone(), b)))
            .collect())
    }

    /// Commit deltas for the configured user in one repository
    ///
    /// GitHub computes contributor statistics lazily and answers 202 until
    /// they are ready; poll a bounded number of times, then degrade to zero
    /// deltas rather than failing the run (matching how absent contributor
    /// data is treated).
    async fn fetch_commit_deltas(&self, full_name: &str) -> Result<CommitDeltas> {
        let path = format!("/repos/{}/stats/contributors", full_name);

        for attempt in 1..=self.fetch.pending_stats_attempts {
            let response =
                retry_with_backoff(&self.fetch.retry, &path, || self.rest_get(&path)).await?;

            match response.status() {
                StatusCode::ACCEPTED => {
                    if attempt == self.fetch.pending_stats_attempts {
                        break;
                    }
                    debug!(
                        "Contributor stats pending for {} (attempt {}/{})",
                        full_name, attempt, self.fetch.pending_stats_attempts
                    );
                    sleep(Duration::from_secs(1)).await;
                }
                StatusCode::NO_CONTENT => return Ok(CommitDeltas::default()),
                _ => {
                    let body: Value = response.json().await?;
                    return Ok(parse_commit_deltas(&body, &self.username));
                }
            }
        }

        warn!(
            "Contributor stats still pending for {} after {} attempts, counting zero deltas",
            full_name, self.fetch.pending_stats_attempts
        );
        Ok(CommitDeltas::default())
    }

    /// Issue a GET against the REST API, mapping failure statuses
    async fn rest_get(&self, path: &str) -> Result<Response> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("request semaphore closed");

        let url = format!("{}{}", self.api_base, path);
        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, format!("token {}", self.token))
            .send()
            .await?;

        if let Some(error) = error_for_status(path, &response) {
            return Err(error);
        }

        Ok(response)
    }

    /// GET and decode a JSON body
    async fn rest_get_json(&self, path: &str) -> Result<Value> {
        let response = self.rest_get(path).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl StatsSource for GitHubClient {
    async fn fetch_repositories(&self) -> Result<Vec<RepositoryStat>> {
        let repositories = self.list_repositories().await?;

        // Repositories excluded by name (or as forks when fork exclusion is
        // on) are skipped before the detail fetch: the aggregator enforces
        // the same rules, this just saves the API calls
        let mut futures = FuturesUnordered::new();
        let mut skipped = 0usize;

        for repo in &repositories {
            let Some(full_name) = repo.full_name.as_deref() else {
                continue;
            };
            let fork = repo.fork.unwrap_or(false);

            if self.exclusions.is_repo_excluded(full_name)
                || (self.exclusions.exclude_forks() && fork)
            {
                debug!("Skipping excluded repository: {}", full_name);
                skipped += 1;
                continue;
            }

            let stargazers = u64::from(repo.stargazers_count.unwrap_or(0));
            let forks = u64::from(repo.forks_count.unwrap_or(0));

            futures.push(async move {
                self.fetch_repository_stat(full_name, fork, stargazers, forks)
                    .await
            });
        }

        let mut stats = Vec::new();
        while let Some(result) = futures.next().await {
            // First unrecoverable error abandons the whole run; pending
            // fetches are dropped with the stream
            stats.push(result?);
        }

        info!(
            "Fetched statistics for {} repositories ({} excluded up front)",
            stats.len(),
            skipped
        );

        // Deterministic downstream folds regardless of completion order
        stats.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(stats)
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }
}

/// Map a non-success REST status onto the error taxonomy
fn error_for_status(path: &str, response: &Response) -> Option<StatsError> {
    let status = response.status();
    if status.is_success() {
        return None;
    }

    let rate_limit_exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "0")
        .unwrap_or(false);

    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    match status {
        StatusCode::UNAUTHORIZED => Some(StatsError::auth(format!(
            "credential rejected for {}",
            path
        ))),
        StatusCode::TOO_MANY_REQUESTS => Some(StatsError::RateLimited { retry_after }),
        StatusCode::FORBIDDEN if rate_limit_exhausted => {
            Some(StatsError::RateLimited { retry_after })
        }
        _ => Some(StatsError::Api {
            path: path.to_string(),
            message: format!("unexpected status {}", status),
        }),
    }
}

/// Sum the configured user's weekly additions, deletions, and commits
/// from a `stats/contributors` response
fn parse_commit_deltas(body: &Value, username: &str) -> CommitDeltas {
    let mut deltas = CommitDeltas::default();

    let Some(contributors) = body.as_array() else {
        return deltas;
    };

    for contributor in contributors {
        let Some(author) = contributor["author"]["login"].as_str() else {
            continue;
        };
        if !author.eq_ignore_ascii_case(username) {
            continue;
        }

        if let Some(weeks) = contributor["weeks"].as_array() {
            for week in weeks {
                deltas.lines_added += week["a"].as_u64().unwrap_or(0);
                deltas.lines_deleted += week["d"].as_u64().unwrap_or(0);
                deltas.commits += week["c"].as_u64().unwrap_or(0);
            }
        }
    }

    deltas
}

/// Execute an operation with bounded exponential-backoff retries
///
/// Only errors the taxonomy marks retryable are attempted again; a
/// rate-limit supplied `Retry-After` overrides the computed delay. The
/// final failure is returned to the caller, never swallowed.
pub(crate) async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    operation: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay_ms = config.initial_delay_ms;

    for attempt in 1..=config.max_attempts.max(1) {
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation, attempt);
                }
                return Ok(value);
            }
            Err(error) if error.is_retryable() && attempt < config.max_attempts => {
                let wait_ms = match &error {
                    StatsError::RateLimited {
                        retry_after: Some(secs),
                    } => secs * 1000,
                    _ => delay_ms,
                };

                warn!(
                    "{} failed on attempt {}/{}: {}. Retrying in {}ms",
                    operation, attempt, config.max_attempts, error, wait_ms
                );

                sleep(Duration::from_millis(wait_ms)).await;
                delay_ms = delay_ms.saturating_mul(2);
            }
            Err(error) => return Err(error),
        }
    }

    unreachable!("retry loop returns on final attempt")
}
