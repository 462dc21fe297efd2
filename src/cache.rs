//! Response cache - SQLite-backed memo of fetched repository statistics
//!
//! Acts as a write-through memo so repeated runs skip redundant API calls.
//! Keys are caller-supplied; the client scopes them by user as well as
//! repository, since commit deltas differ per user. A cold or missing cache is a fully
//! functional state: every lookup simply misses and the client fetches live.
//!
//! The database lives in XDG_DATA_HOME/statscard/cache.db by default.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::stats::RepositoryStat;

/// A cached repository statistic plus its freshness marker
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub stat: RepositoryStat,
    pub fetched_at: DateTime<Utc>,
}

/// Repository statistics cache
///
/// The connection is shared behind a mutex: concurrent fetch tasks may read
/// and write freely, with writes serialized by the lock.
#[derive(Clone)]
pub struct Cache {
    conn: Arc<Mutex<Connection>>,
    max_age: Duration,
}

impl Cache {
    /// Open or create the cache database at a specific path
    pub fn open_at(path: PathBuf, max_age_hours: i64) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::error::io_error(parent.to_path_buf(), e))?;
        }

        let conn = Connection::open(&path)?;
        let cache = Self {
            conn: Arc::new(Mutex::new(conn)),
            max_age: Duration::hours(max_age_hours),
        };
        cache.initialize()?;

        info!("Cache opened at {}", path.display());
        Ok(cache)
    }

    /// Open an in-memory cache (for testing)
    pub fn open_in_memory(max_age_hours: i64) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self {
            conn: Arc::new(Mutex::new(conn)),
            max_age: Duration::hours(max_age_hours),
        };
        cache.initialize()?;
        Ok(cache)
    }

    /// Initialize the database schema
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().expect("cache mutex poisoned");
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS repo_stats (
                cache_key TEXT PRIMARY KEY,
                fetched_at TEXT NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_repo_stats_fetched ON repo_stats(fetched_at);
            "#,
        )?;

        debug!("Cache schema initialized");
        Ok(())
    }

    /// Look up cached statistics under a key
    ///
    /// Returns None when the entry is absent or older than the configured
    /// maximum age; stale rows are deleted on the way out.
    pub fn get(&self, key: &str) -> Option<RepositoryStat> {
        match self.get_entry(key) {
            Ok(Some(entry)) => {
                let age = Utc::now() - entry.fetched_at;
                if age > self.max_age {
                    debug!("Cache entry for {} expired ({}h old)", key, age.num_hours());
                    self.remove(key);
                    None
                } else {
                    debug!("Cache hit for {}", key);
                    Some(entry.stat)
                }
            }
            Ok(None) => None,
            // A broken cache degrades to a miss rather than failing the run
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Store statistics under a key (write-through, upsert)
    pub fn put(&self, key: &str, stat: &RepositoryStat) -> Result<()> {
        let payload = serde_json::to_string(stat)?;
        let conn = self.conn.lock().expect("cache mutex poisoned");

        conn.execute(
            "INSERT INTO repo_stats (cache_key, fetched_at, payload)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(cache_key) DO UPDATE SET
                 fetched_at = excluded.fetched_at,
                 payload = excluded.payload",
            params![key, Utc::now().to_rfc3339(), payload],
        )?;

        Ok(())
    }

    /// Fetch the raw entry with its freshness marker
    fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.conn.lock().expect("cache mutex poisoned");

        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT fetched_at, payload FROM repo_stats WHERE cache_key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((fetched_at, payload)) = row else {
            return Ok(None);
        };

        let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC);
        let stat: RepositoryStat = serde_json::from_str(&payload)?;

        Ok(Some(CacheEntry { stat, fetched_at }))
    }

    /// Delete an entry, ignoring failures
    fn remove(&self, key: &str) {
        let conn = self.conn.lock().expect("cache mutex poisoned");
        let _ = conn.execute(
            "DELETE FROM repo_stats WHERE cache_key = ?1",
            params![key],
        );
    }

    /// Number of stored entries (diagnostics)
    pub fn len(&self) -> usize {
        let conn = self.conn.lock().expect("cache mutex poisoned");
        conn.query_row("SELECT COUNT(*) FROM repo_stats", [], |row| row.get(0))
            .unwrap_or(0usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn backdate(&self, key: &str, hours: i64) {
        let conn = self.conn.lock().expect("cache mutex poisoned");
        let stale = (Utc::now() - Duration::hours(hours)).to_rfc3339();
        conn.execute(
            "UPDATE repo_stats SET fetched_at = ?1 WHERE cache_key = ?2",
            params![stale, key],
        )
        .expect("backdate failed");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn sample_stat(full_name: &str) -> RepositoryStat {
        RepositoryStat {
            full_name: full_name.to_string(),
            fork: false,
            stargazers: 12,
            forks: 3,
            languages: HashMap::from([("Rust".to_string(), 1000)]),
            lines_added: 500,
            lines_deleted: 100,
            commits: 42,
        }
    }

    #[test]
    fn test_put_then_get_roundtrip() {
        let cache = Cache::open_in_memory(6).unwrap();
        let stat = sample_stat("user/repo");

        cache.put("user/repo", &stat).unwrap();
        let fetched = cache.get("user/repo").expect("expected cache hit");

        assert_eq!(fetched, stat);
    }

    #[test]
    fn test_missing_key_is_none() {
        let cache = Cache::open_in_memory(6).unwrap();
        assert!(cache.get("user/unknown").is_none());
    }

    #[test]
    fn test_put_overwrites_existing() {
        let cache = Cache::open_in_memory(6).unwrap();
        let mut stat = sample_stat("user/repo");
        cache.put("user/repo", &stat).unwrap();

        stat.stargazers = 99;
        cache.put("user/repo", &stat).unwrap();

        assert_eq!(cache.get("user/repo").unwrap().stargazers, 99);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expired_entry_purged_on_read() {
        let cache = Cache::open_in_memory(6).unwrap();
        cache.put("user/repo", &sample_stat("user/repo")).unwrap();
        cache.backdate("user/repo", 7);

        assert!(cache.get("user/repo").is_none());
        // The stale row is gone, not just skipped
        assert!(cache.is_empty());
    }

    #[test]
    fn test_fresh_entry_survives_max_age_boundary() {
        let cache = Cache::open_in_memory(6).unwrap();
        cache.put("user/repo", &sample_stat("user/repo")).unwrap();
        cache.backdate("user/repo", 5);

        assert!(cache.get("user/repo").is_some());
    }

    #[test]
    fn test_open_at_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");

        let cache = Cache::open_at(path.clone(), 6).unwrap();
        cache.put("user/repo", &sample_stat("user/repo")).unwrap();

        assert!(path.exists());

        // A second open sees the persisted entry
        drop(cache);
        let reopened = Cache::open_at(path, 6).unwrap();
        assert!(reopened.get("user/repo").is_some());
    }
}
