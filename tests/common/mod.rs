//! Common test utilities and fixtures for statscard integration tests

use serde_json::{json, Value};
use statscard::Config;

/// JSON body for the authenticated-user endpoint, complete enough for the
/// client's response models
pub fn author_json(login: &str) -> Value {
    json!({
        "login": login,
        "id": 1,
        "node_id": "MDQ6VXNlcjE=",
        "avatar_url": format!("https://avatars.example.com/{login}"),
        "gravatar_id": "",
        "url": format!("https://api.github.com/users/{login}"),
        "html_url": format!("https://github.com/{login}"),
        "followers_url": format!("https://api.github.com/users/{login}/followers"),
        "following_url": format!("https://api.github.com/users/{login}/following{{/other_user}}"),
        "gists_url": format!("https://api.github.com/users/{login}/gists{{/gist_id}}"),
        "starred_url": format!("https://api.github.com/users/{login}/starred{{/owner}}{{/repo}}"),
        "subscriptions_url": format!("https://api.github.com/users/{login}/subscriptions"),
        "organizations_url": format!("https://api.github.com/users/{login}/orgs"),
        "repos_url": format!("https://api.github.com/users/{login}/repos"),
        "events_url": format!("https://api.github.com/users/{login}/events{{/privacy}}"),
        "received_events_url": format!("https://api.github.com/users/{login}/received_events"),
        "type": "User",
        "site_admin": false
    })
}

/// JSON body for the user profile endpoint (display name lookup)
pub fn profile_json(login: &str, name: Option<&str>) -> Value {
    json!({
        "login": login,
        "id": 1,
        "name": name,
    })
}

/// One repository entry for the listing endpoint
pub fn repo_json(id: u64, full_name: &str, fork: bool, stars: u64, forks: u64) -> Value {
    let name = full_name.split('/').nth(1).unwrap_or(full_name);
    json!({
        "id": id,
        "name": name,
        "full_name": full_name,
        "url": format!("https://api.github.com/repos/{full_name}"),
        "fork": fork,
        "stargazers_count": stars,
        "forks_count": forks,
    })
}

/// A `stats/contributors` body with one entry for the given user
pub fn contributor_stats_json(login: &str, added: u64, deleted: u64, commits: u64) -> Value {
    json!([
        {
            "author": {"login": login},
            "total": commits,
            "weeks": [
                {"w": 1_700_000_000u64, "a": added, "d": deleted, "c": commits}
            ]
        }
    ])
}

/// Configuration pointing at a mock server, with the cache disabled and the
/// crate's real templates
pub fn test_config(api_base: &str, output_dir: &str) -> Config {
    let mut config = Config::default();
    config.github.username = Some("octocat".to_string());
    config.github.api_base = api_base.to_string();
    config.output.dir = output_dir.to_string();
    config.output.templates_dir = format!("{}/templates", env!("CARGO_MANIFEST_DIR"));
    config.cache.enabled = false;
    // Keep failure tests fast; success paths never retry anyway
    config.fetch.retry.max_attempts = 1;
    config.fetch.retry.initial_delay_ms = 10;
    config
}
