pub mod file;

pub use file::ReportConfig;

use std::env;

pub fn bugzilla_api_key() -> Option<String> {
    non_empty_env("BUGZILLA_API_KEY")
}

pub fn github_credentials() -> Option<(String, String)> {
    Some((
        non_empty_env("GITHUB_USERNAME")?,
        non_empty_env("GITHUB_TOKEN")?,
    ))
}

pub fn force_cache() -> bool {
    non_empty_env("FORCE_CACHE").is_some()
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}
