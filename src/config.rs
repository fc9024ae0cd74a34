//! Runtime configuration.
//!
//! Built-in defaults, then environment variables, then the `app` category of
//! `local_settings` (values the settings screen writes). Unusable values are
//! logged and skipped so a bad override never prevents startup.

use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::api::DEFAULT_TIMEOUT;
use crate::db::{self, DbState};
use crate::search::{SearchSettings, DEFAULT_DEBOUNCE, DEFAULT_MIN_CHARS, DEFAULT_PAGE_SIZE};

pub const DEFAULT_API_URL: &str = "https://api.bolibana.com/api/v1";
pub const DEFAULT_LOG_FILTER: &str = "info,bolibana_stock_lib=debug";

/// `local_settings` category holding configuration overrides.
pub const SETTINGS_CATEGORY: &str = "app";

const ENV_API_URL: &str = "BOLIBANA_API_URL";
const ENV_DATA_DIR: &str = "BOLIBANA_DATA_DIR";
const ENV_DEBOUNCE_MS: &str = "BOLIBANA_SEARCH_DEBOUNCE_MS";
const ENV_LOG_FILTER: &str = "RUST_LOG";

/// Keys the settings screen may store under `SETTINGS_CATEGORY`.
pub const SETTING_KEYS: [&str; 6] = [
    "api_base_url",
    "log_filter",
    "search_debounce_ms",
    "search_min_chars",
    "search_page_size",
    "request_timeout_secs",
];

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub search: SearchSettings,
    pub data_dir: PathBuf,
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout: DEFAULT_TIMEOUT,
            search: SearchSettings {
                debounce: DEFAULT_DEBOUNCE,
                min_chars: DEFAULT_MIN_CHARS,
                page_size: DEFAULT_PAGE_SIZE,
            },
            data_dir: default_data_dir(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// `$XDG_DATA_HOME` (or `~/.local/share`) / `bolibana-stock`. Mobile shells
/// pass their sandbox directory through `BOLIBANA_DATA_DIR` instead.
fn default_data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                .join(".local")
                .join("share")
        });
    base.join("bolibana-stock")
}

impl AppConfig {
    /// Defaults overridden by environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let vars = [ENV_API_URL, ENV_DATA_DIR, ENV_DEBOUNCE_MS, ENV_LOG_FILTER];
        for name in vars {
            if let Ok(value) = std::env::var(name) {
                config.apply(name, &value);
            }
        }
        config
    }

    /// Apply overrides stored in `local_settings`.
    pub fn apply_settings(&mut self, db: &DbState) {
        let rows = match db.conn.lock() {
            Ok(conn) => db::get_category_settings(&conn, SETTINGS_CATEGORY),
            Err(e) => {
                warn!(error = %e, "settings lock poisoned, keeping current config");
                return;
            }
        };
        for (key, value) in rows {
            self.apply(&key, &value);
        }
    }

    /// Validate and store one override, then apply it to this config.
    /// Values this config would ignore are rejected instead of stored.
    pub fn save_setting(&mut self, db: &DbState, key: &str, value: &str) -> Result<(), String> {
        if !SETTING_KEYS.contains(&key) {
            return Err(format!("unknown setting: {key}"));
        }
        let mut updated = self.clone();
        if !updated.apply(key, value) {
            return Err(format!("invalid value for {key}: {value}"));
        }
        let conn = db.conn.lock().map_err(|e| format!("settings lock: {e}"))?;
        db::set_setting(&conn, SETTINGS_CATEGORY, key, value.trim())?;
        *self = updated;
        Ok(())
    }

    /// Drop every stored override. Takes effect on the next start.
    pub fn reset_settings(db: &DbState) -> Result<(), String> {
        let conn = db.conn.lock().map_err(|e| format!("settings lock: {e}"))?;
        db::delete_all_settings(&conn, SETTINGS_CATEGORY)?;
        info!("stored settings reset");
        Ok(())
    }

    /// Apply one override. Accepts both environment names and setting keys.
    /// Returns false when the value was ignored.
    fn apply(&mut self, key: &str, value: &str) -> bool {
        let value = value.trim();
        match key {
            ENV_API_URL | "api_base_url" => {
                if value.is_empty() {
                    warn!(key, "empty API URL ignored");
                    return false;
                }
                self.api_base_url = crate::api::normalize_api_url(value);
            }
            ENV_DATA_DIR => {
                if value.is_empty() {
                    return false;
                }
                self.data_dir = PathBuf::from(value);
            }
            ENV_LOG_FILTER | "log_filter" => {
                if value.is_empty() {
                    return false;
                }
                self.log_filter = value.to_string();
            }
            ENV_DEBOUNCE_MS | "search_debounce_ms" => match value.parse::<u64>() {
                Ok(ms) if ms <= 5_000 => self.search.debounce = Duration::from_millis(ms),
                _ => {
                    warn!(key, value, "invalid search debounce ignored");
                    return false;
                }
            },
            "search_min_chars" => match value.parse::<usize>() {
                Ok(n) if n >= 1 => self.search.min_chars = n,
                _ => {
                    warn!(key, value, "invalid search minimum ignored");
                    return false;
                }
            },
            "search_page_size" => match value.parse::<u32>() {
                Ok(n) if (1..=200).contains(&n) => self.search.page_size = n,
                _ => {
                    warn!(key, value, "invalid page size ignored");
                    return false;
                }
            },
            "request_timeout_secs" => match value.parse::<u64>() {
                Ok(s) if s > 0 => self.request_timeout = Duration::from_secs(s),
                _ => {
                    warn!(key, value, "invalid request timeout ignored");
                    return false;
                }
            },
            other => {
                warn!(key = other, "unknown configuration key ignored");
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var(ENV_API_URL, "stock.example.ml/api/v1/");
        std::env::set_var(ENV_DEBOUNCE_MS, "450");
        std::env::set_var(ENV_DATA_DIR, "/tmp/bolibana-test");
        let config = AppConfig::from_env();
        std::env::remove_var(ENV_API_URL);
        std::env::remove_var(ENV_DEBOUNCE_MS);
        std::env::remove_var(ENV_DATA_DIR);

        assert_eq!(config.api_base_url, "https://stock.example.ml/api/v1");
        assert_eq!(config.search.debounce, Duration::from_millis(450));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/bolibana-test"));
    }

    #[test]
    #[serial]
    fn test_invalid_env_value_keeps_default() {
        std::env::set_var(ENV_DEBOUNCE_MS, "soon");
        let config = AppConfig::from_env();
        std::env::remove_var(ENV_DEBOUNCE_MS);
        assert_eq!(config.search.debounce, DEFAULT_DEBOUNCE);
    }

    #[test]
    fn test_settings_overrides() {
        let state = db::test_state();
        {
            let conn = state.conn.lock().unwrap();
            db::set_setting(&conn, SETTINGS_CATEGORY, "search_page_size", "50").unwrap();
            db::set_setting(&conn, SETTINGS_CATEGORY, "search_min_chars", "0").unwrap();
            db::set_setting(&conn, SETTINGS_CATEGORY, "api_base_url", "localhost:8000").unwrap();
            db::set_setting(&conn, SETTINGS_CATEGORY, "request_timeout_secs", "10").unwrap();
        }
        let mut config = AppConfig::default();
        config.apply_settings(&state);
        assert_eq!(config.search.page_size, 50);
        assert_eq!(config.search.min_chars, DEFAULT_MIN_CHARS);
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_save_setting_persists_and_applies() {
        let state = db::test_state();
        let mut config = AppConfig::default();
        config
            .save_setting(&state, "search_page_size", " 40 ")
            .expect("save");
        assert_eq!(config.search.page_size, 40);

        let mut reloaded = AppConfig::default();
        reloaded.apply_settings(&state);
        assert_eq!(reloaded.search.page_size, 40);
    }

    #[test]
    fn test_save_setting_rejects_bad_values_without_storing() {
        let state = db::test_state();
        let mut config = AppConfig::default();
        assert!(config.save_setting(&state, "search_page_size", "0").is_err());
        assert!(config.save_setting(&state, "BOLIBANA_DATA_DIR", "/tmp").is_err());
        assert!(config.save_setting(&state, "colour", "blue").is_err());
        assert_eq!(config, AppConfig::default());
        let conn = state.conn.lock().unwrap();
        assert!(db::get_category_settings(&conn, SETTINGS_CATEGORY).is_empty());
    }

    #[test]
    fn test_reset_settings_restores_defaults_on_next_load() {
        let state = db::test_state();
        let mut config = AppConfig::default();
        config.save_setting(&state, "request_timeout_secs", "5").unwrap();
        config.save_setting(&state, "search_min_chars", "3").unwrap();

        AppConfig::reset_settings(&state).expect("reset");

        let mut reloaded = AppConfig::default();
        reloaded.apply_settings(&state);
        assert_eq!(reloaded, AppConfig::default());
    }
}
