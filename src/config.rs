//! Client configuration.
//!
//! Defaults match a locally running backend. `from_env` reads the same
//! variables the web client uses, with the `REACT_APP_` prefix dropped.

use std::time::Duration;

use crate::document::{HistoryConfig, UserSummary};
use crate::storage::StorageConfig;
use crate::sync::SyncConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Settings for one builder client
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base url of the pages API, e.g. `http://localhost:5001/api`
    pub api_url: String,
    pub socket_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Where drafts are stored; `None` disables local drafts
    pub draft_path: Option<String>,
    /// Maximum undo depth; `None` keeps every snapshot
    pub history_limit: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5001/api".to_string(),
            socket_url: "ws://localhost:5001".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            draft_path: Some("./data/drafts.sled".to_string()),
            history_limit: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup("API_URL") {
            config.api_url = url;
        }
        if let Some(url) = lookup("SOCKET_URL") {
            config.socket_url = url;
        }
        if let Some(ms) = parse(&lookup, "CONNECT_TIMEOUT_MS")? {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse(&lookup, "REQUEST_TIMEOUT_MS")? {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(path) = lookup("DRAFT_PATH") {
            config.draft_path = if path.is_empty() { None } else { Some(path) };
        }
        if let Some(limit) = parse(&lookup, "HISTORY_LIMIT")? {
            config.history_limit = Some(limit);
        }

        Ok(config)
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_socket_url(mut self, url: impl Into<String>) -> Self {
        self.socket_url = url.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_draft_path(mut self, path: Option<String>) -> Self {
        self.draft_path = path;
        self
    }

    pub fn with_history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn sync_config(&self, local_user: UserSummary) -> SyncConfig {
        SyncConfig::new(self.socket_url.clone())
            .with_connect_timeout(self.connect_timeout)
            .with_local_user(local_user)
    }

    pub fn history_config(&self) -> HistoryConfig {
        HistoryConfig {
            max_entries: self.history_limit,
        }
    }

    pub fn storage_config(&self) -> Option<StorageConfig> {
        self.draft_path.as_ref().map(StorageConfig::new)
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.api_url, "http://localhost:5001/api");
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.history_config().max_entries, None);
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("API_URL", "https://builder.example.com/api"),
            ("SOCKET_URL", "wss://builder.example.com"),
            ("CONNECT_TIMEOUT_MS", "2500"),
            ("HISTORY_LIMIT", "50"),
            ("DRAFT_PATH", ""),
        ]))
        .unwrap();

        assert_eq!(config.socket_url, "wss://builder.example.com");
        assert_eq!(config.connect_timeout, Duration::from_millis(2500));
        assert_eq!(config.history_limit, Some(50));
        assert!(config.storage_config().is_none());

        let sync = config.sync_config(UserSummary::new("u1", "Ann"));
        assert_eq!(sync.socket_url, "wss://builder.example.com");
        assert_eq!(sync.connect_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_invalid_number() {
        let err = ClientConfig::from_lookup(lookup(&[("REQUEST_TIMEOUT_MS", "soon")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "REQUEST_TIMEOUT_MS",
                value: "soon".into()
            }
        );
    }

    #[test]
    fn test_builder_methods() {
        let config = ClientConfig::default()
            .with_api_url("http://api")
            .with_history_limit(Some(5))
            .with_draft_path(None);
        assert_eq!(config.api_url, "http://api");
        assert_eq!(config.history_config().max_entries, Some(5));
        assert!(config.storage_config().is_none());
    }
}
