//! Error taxonomy
//!
//! Failures are classified by what the caller can do about them: `Auth` is
//! fatal and actionable by the operator, `RateLimited` and `Network` are
//! retryable within the configured budget, everything else aborts the run.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = StatsError> = std::result::Result<T, E>;

/// Errors surfaced by the statistics pipeline
#[derive(Debug, Error)]
pub enum StatsError {
    /// The credential was rejected; no amount of retrying helps
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// The API quota is exhausted; retryable after a delay
    #[error("GitHub rate limit exceeded")]
    RateLimited {
        /// Server-suggested wait in seconds, when provided
        retry_after: Option<u64>,
    },

    /// Transport-level failure (DNS, TLS, timeouts); retryable
    #[error("network error: {message}")]
    Network { message: String },

    /// The API answered with something other than success
    #[error("GitHub API error at {path}: {message}")]
    Api { path: String, message: String },

    /// A template could not be rendered into a valid artifact
    #[error("render error: {message}")]
    Render { message: String },

    /// The configuration is unusable
    #[error("configuration error: {message}")]
    Config { message: String },

    /// The cache database failed underneath us
    #[error("cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    /// Filesystem failure, attributed to the path involved
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A payload could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StatsError {
    /// Whether retrying the failed operation can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StatsError::RateLimited { .. } | StatsError::Network { .. }
        )
    }

    pub fn auth(message: impl Into<String>) -> Self {
        StatsError::Auth {
            message: message.into(),
        }
    }

    pub fn render(message: impl Into<String>) -> Self {
        StatsError::Render {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        StatsError::Config {
            message: message.into(),
        }
    }
}

/// Attribute an I/O failure to the path it happened on
pub fn io_error(path: PathBuf, source: std::io::Error) -> StatsError {
    StatsError::Io { path, source }
}

impl From<reqwest::Error> for StatsError {
    fn from(err: reqwest::Error) -> Self {
        StatsError::Network {
            message: err.to_string(),
        }
    }
}

impl From<octocrab::Error> for StatsError {
    fn from(err: octocrab::Error) -> Self {
        match err {
            octocrab::Error::GitHub { source, .. } => {
                let message = source.message.clone();
                match source.status_code.as_u16() {
                    401 => StatsError::auth(message),
                    // octocrab's typed error carries no response headers, so
                    // any Retry-After hint is lost on this path; the raw REST
                    // client preserves it
                    403 | 429 => StatsError::RateLimited { retry_after: None },
                    _ => StatsError::Api {
                        path: source.status_code.to_string(),
                        message,
                    },
                }
            }
            other => StatsError::Network {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StatsError::RateLimited { retry_after: None }.is_retryable());
        assert!(StatsError::Network {
            message: "timeout".to_string()
        }
        .is_retryable());

        assert!(!StatsError::auth("bad token").is_retryable());
        assert!(!StatsError::render("missing placeholder").is_retryable());
        assert!(!StatsError::config("no username").is_retryable());
    }

    #[test]
    fn test_io_error_carries_path() {
        let err = io_error(
            PathBuf::from("/tmp/out.svg"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );

        assert_matches!(err, StatsError::Io { ref path, .. }
            if path == &PathBuf::from("/tmp/out.svg"));
        assert!(err.to_string().contains("/tmp/out.svg"));
    }

    #[test]
    fn test_display_messages() {
        let err = StatsError::auth("bad credentials");
        assert_eq!(err.to_string(), "authentication failed: bad credentials");

        let err = StatsError::Api {
            path: "/repos/a/b/languages".to_string(),
            message: "unexpected status 500".to_string(),
        };
        assert!(err.to_string().contains("/repos/a/b/languages"));
    }
}
