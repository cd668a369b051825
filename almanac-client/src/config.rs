use crate::errors::{ClientError, ClientResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://almanac.db?mode=rwc";
pub const DEFAULT_TABLE: &str = "todos";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOG_FILTER: &str = "almanac_client=info";

/// Connection settings for the hosted task store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`.
    pub url: String,
    pub anon_key: String,
    /// Session token of the signed-in user; the anon key is used when absent.
    pub access_token: Option<String>,
    pub user_id: String,
    pub table: String,
    pub timeout_secs: u64,
}

impl RemoteConfig {
    pub fn bearer(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.anon_key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub database_url: String,
    pub log_filter: String,
    pub remote: Option<RemoteConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            remote: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> ClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let timeout_secs = match var("ALMANAC_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                ClientError::Config(format!("ALMANAC_TIMEOUT_SECS is not a number: {raw}"))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let url = var("ALMANAC_REMOTE_URL");
        let anon_key = var("ALMANAC_ANON_KEY");
        let user_id = var("ALMANAC_USER_ID");

        let remote = match (url, anon_key, user_id) {
            (None, None, None) => None,
            (Some(url), Some(anon_key), Some(user_id)) => Some(RemoteConfig {
                url,
                anon_key,
                access_token: var("ALMANAC_ACCESS_TOKEN"),
                user_id,
                table: var("ALMANAC_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string()),
                timeout_secs,
            }),
            (url, anon_key, user_id) => {
                let missing: Vec<&str> = [
                    ("ALMANAC_REMOTE_URL", url.is_none()),
                    ("ALMANAC_ANON_KEY", anon_key.is_none()),
                    ("ALMANAC_USER_ID", user_id.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                return Err(ClientError::Config(format!(
                    "incomplete remote configuration, missing {}",
                    missing.join(", ")
                )));
            }
        };

        Ok(Self {
            database_url: var("ALMANAC_DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            log_filter: var("ALMANAC_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            remote,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_remote() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_full_remote_config() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("ALMANAC_REMOTE_URL", "https://example.supabase.co"),
            ("ALMANAC_ANON_KEY", "anon"),
            ("ALMANAC_USER_ID", "user-1"),
            ("ALMANAC_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();

        let remote = config.remote.unwrap();
        assert_eq!(remote.table, DEFAULT_TABLE);
        assert_eq!(remote.timeout_secs, 3);
        assert_eq!(remote.bearer(), "anon");
    }

    #[test]
    fn test_partial_remote_config_is_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[("ALMANAC_REMOTE_URL", "https://x")]))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("ALMANAC_ANON_KEY"));
        assert!(message.contains("ALMANAC_USER_ID"));
    }

    #[test]
    fn test_bad_timeout() {
        assert!(ClientConfig::from_lookup(lookup(&[("ALMANAC_TIMEOUT_SECS", "soon")])).is_err());
    }
}
