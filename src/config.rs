//! Configuration loading and persistence.
//!
//! Settings come from `config.json` in the config directory, then
//! `PHITHIAI_*` environment variables override individual fields. The auth
//! token is never written to disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::reconnect::ReconnectPolicy;
use crate::ws::http_to_ws_scheme;

/// Socket base URL used when nothing is configured.
pub const DEFAULT_WS_URL: &str = "ws://localhost:3001";

/// Configuration for the realtime client and CLI.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the messaging endpoint (`ws(s)://` or `http(s)://`).
    pub ws_url: String,
    /// Auth token appended to the socket URL. Not serialized.
    #[serde(skip)]
    pub token: Option<String>,
    /// Delay in milliseconds before reconnecting.
    pub reconnect_ms: u64,
    /// Give up after this many consecutive failed reconnects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_reconnect_attempts: Option<u32>,
    /// When set, back off exponentially from `reconnect_ms` up to this ceiling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_reconnect_ms: Option<u64>,
    /// Idle time in milliseconds before a typing indicator clears.
    pub typing_idle_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            token: None,
            reconnect_ms: 1500,
            max_reconnect_attempts: None,
            max_reconnect_ms: None,
            typing_idle_ms: 3000,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `PHITHIAI_CONFIG_DIR` overrides the platform config directory.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = match std::env::var("PHITHIAI_CONFIG_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::config_dir()
                .context("Could not determine config directory")?
                .join("phithiai"),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create config dir {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_dir()?);
        config.apply_env_overrides();
        Ok(config)
    }

    /// Read `config.json` from `dir`, falling back to defaults when the file
    /// is missing or malformed.
    #[must_use]
    pub fn load_from(dir: &Path) -> Self {
        let path = dir.join("config.json");
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|content| Ok(serde_json::from_str::<Self>(&content)?))
        {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring unreadable config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `PHITHIAI_*` overrides looked up through `var`. Values that do
    /// not parse are ignored.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("PHITHIAI_WS_URL") {
            self.ws_url = url;
        }

        if let Some(token) = var("PHITHIAI_TOKEN").filter(|t| !t.is_empty()) {
            self.token = Some(token);
        }

        if let Some(ms) = var("PHITHIAI_RECONNECT_MS").and_then(|v| v.parse().ok()) {
            self.reconnect_ms = ms;
        }

        if let Some(max) = var("PHITHIAI_MAX_RECONNECT_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.max_reconnect_attempts = Some(max);
        }

        if let Some(ms) = var("PHITHIAI_MAX_RECONNECT_MS").and_then(|v| v.parse().ok()) {
            self.max_reconnect_ms = Some(ms);
        }

        if let Some(ms) = var("PHITHIAI_TYPING_IDLE_MS").and_then(|v| v.parse().ok()) {
            self.typing_idle_ms = ms;
        }
    }

    /// Persists the configuration to `config.json` in the config directory.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_dir()?)
    }

    /// Persists the configuration to `config.json` in `dir`.
    pub fn save_to(&self, dir: &Path) -> Result<()> {
        let config_path = dir.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("failed to write {}", config_path.display()))?;

        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Full socket URL including the token query parameter.
    #[must_use]
    pub fn socket_url(&self) -> String {
        socket_url(&self.ws_url, self.token.as_deref())
    }

    /// Reconnect policy described by this configuration.
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let delay = Duration::from_millis(self.reconnect_ms);
        let policy = match self.max_reconnect_ms {
            Some(max) => ReconnectPolicy::exponential(delay, Duration::from_millis(max)),
            None => ReconnectPolicy::fixed(delay),
        };
        match self.max_reconnect_attempts {
            Some(max) => policy.with_max_attempts(max),
            None => policy,
        }
    }

    /// Typing indicator idle timeout.
    #[must_use]
    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms)
    }
}

/// Build the messaging socket URL: `{base}/ws`, plus `?token=` when a token
/// is given. `http(s)` bases are rewritten to `ws(s)`.
#[must_use]
pub fn socket_url(base: &str, token: Option<&str>) -> String {
    let base = http_to_ws_scheme(base.trim_end_matches('/'));
    match token {
        Some(token) if !token.is_empty() => format!("{base}/ws?token={token}"),
        _ => format!("{base}/ws"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconnect::Backoff;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_socket_url_with_and_without_token() {
        assert_eq!(socket_url("ws://localhost:3001", None), "ws://localhost:3001/ws");
        assert_eq!(
            socket_url("ws://localhost:3001", Some("abc")),
            "ws://localhost:3001/ws?token=abc"
        );
        assert_eq!(socket_url("ws://localhost:3001", Some("")), "ws://localhost:3001/ws");
    }

    #[test]
    fn test_socket_url_rewrites_http_and_trailing_slash() {
        assert_eq!(
            socket_url("https://chat.phithiai.com/", Some("t")),
            "wss://chat.phithiai.com/ws?token=t"
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(vars(&[
            ("PHITHIAI_WS_URL", "wss://rt.test"),
            ("PHITHIAI_TOKEN", "tok"),
            ("PHITHIAI_RECONNECT_MS", "250"),
            ("PHITHIAI_MAX_RECONNECT_ATTEMPTS", "5"),
            ("PHITHIAI_TYPING_IDLE_MS", "not-a-number"),
        ]));

        assert_eq!(config.ws_url, "wss://rt.test");
        assert_eq!(config.token.as_deref(), Some("tok"));
        assert_eq!(config.reconnect_ms, 250);
        assert_eq!(config.max_reconnect_attempts, Some(5));
        assert_eq!(config.typing_idle_ms, 3000);
        assert_eq!(config.socket_url(), "wss://rt.test/ws?token=tok");
    }

    #[test]
    fn test_reconnect_policy_from_config() {
        let fixed = Config::default().reconnect_policy();
        assert_eq!(fixed, ReconnectPolicy::default());

        let config = Config {
            reconnect_ms: 500,
            max_reconnect_ms: Some(8000),
            max_reconnect_attempts: Some(4),
            ..Config::default()
        };
        let policy = config.reconnect_policy();
        assert_eq!(
            policy.backoff(),
            Backoff::Exponential {
                initial: Duration::from_millis(500),
                max: Duration::from_millis(8000),
            }
        );
        assert_eq!(policy.max_attempts(), Some(4));
    }

    #[test]
    fn test_save_and_load_skips_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config {
            ws_url: "wss://saved.test".into(),
            token: Some("secret".into()),
            reconnect_ms: 900,
            ..Config::default()
        };
        config.save_to(dir.path()).expect("save");

        let written = fs::read_to_string(dir.path().join("config.json")).expect("read");
        assert!(!written.contains("secret"));

        let loaded = Config::load_from(dir.path());
        assert_eq!(loaded.ws_url, "wss://saved.test");
        assert_eq!(loaded.reconnect_ms, 900);
        assert_eq!(loaded.token, None);
    }

    #[test]
    fn test_load_from_missing_or_malformed_falls_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(Config::load_from(dir.path()), Config::default());

        fs::write(dir.path().join("config.json"), "{not json").expect("write");
        assert_eq!(Config::load_from(dir.path()), Config::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("config.json"), r#"{"reconnect_ms": 42}"#).expect("write");
        let loaded = Config::load_from(dir.path());
        assert_eq!(loaded.reconnect_ms, 42);
        assert_eq!(loaded.ws_url, DEFAULT_WS_URL);
    }

    #[cfg(unix)]
    #[test]
    fn test_save_sets_owner_only_permissions() {
        let dir = tempfile::tempdir().expect("tempdir");
        Config::default().save_to(dir.path()).expect("save");
        let mode = fs::metadata(dir.path().join("config.json"))
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
