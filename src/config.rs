use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::api::DEFAULT_API_URL;
use crate::session::FileSessionStore;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Runtime settings. Everything has a default; environment variables
/// override the defaults and CLI flags override the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub timeout: Duration,
    pub session_path: PathBuf,
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let timeout_secs = match non_empty("JOBTRACK_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .context("JOBTRACK_TIMEOUT_SECS must be a whole number of seconds")?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Config {
            api_url: non_empty("JOBTRACK_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
            session_path: non_empty("JOBTRACK_SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(FileSessionStore::default_path),
            log_file: non_empty("JOBTRACK_LOG_FILE").map(PathBuf::from),
        })
    }

    pub fn with_api_url(mut self, api_url: Option<String>) -> Self {
        if let Some(url) = api_url {
            self.api_url = url;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.api_url, "http://localhost:8000/api");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.session_path.ends_with("session.json"));
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("JOBTRACK_API_URL", "https://jobs.example.com/api"),
            ("JOBTRACK_TIMEOUT_SECS", " 30 "),
            ("JOBTRACK_SESSION_FILE", "/tmp/jt.json"),
            ("JOBTRACK_LOG_FILE", "/tmp/jt.log"),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "https://jobs.example.com/api");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.session_path, PathBuf::from("/tmp/jt.json"));
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/jt.log")));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup_from(&[("JOBTRACK_API_URL", "  ")])).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_bad_timeout_is_an_error() {
        let result = Config::from_lookup(lookup_from(&[("JOBTRACK_TIMEOUT_SECS", "soon")]));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("JOBTRACK_TIMEOUT_SECS"));
    }

    #[test]
    fn test_cli_flag_wins() {
        let config = Config::from_lookup(lookup_from(&[("JOBTRACK_API_URL", "http://env")]))
            .unwrap()
            .with_api_url(Some("http://flag".to_string()));
        assert_eq!(config.api_url, "http://flag");
    }
}
