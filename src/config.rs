//! Application-level configuration loading, including matchmaking tunables.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUICKPAIR_BACK_CONFIG_PATH";

/// Window within which a user counts as "recently active" for Tier 2 matching.
const DEFAULT_RECENT_ACTIVITY_SECS: u64 = 300;
/// How many times the engine re-evaluates the tiers after a lost bind race.
const DEFAULT_MATCH_ATTEMPTS: usize = 3;
/// Upper bound on relayed chat message content, in characters.
const DEFAULT_CHAT_MAX_CHARS: usize = 2000;
/// Capacity of the shared event broadcast channel.
const DEFAULT_EVENT_CAPACITY: usize = 16;
/// Capacity of each per-user match watch channel.
const DEFAULT_WATCH_CAPACITY: usize = 8;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    recent_activity_window: Duration,
    match_attempts: usize,
    chat_max_chars: usize,
    event_capacity: usize,
    watch_capacity: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        recent_activity_secs = config.recent_activity_window.as_secs(),
                        match_attempts = config.match_attempts,
                        "loaded configuration file"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// How far back `last_seen` may lie for a user to qualify for Tier 2.
    pub fn recent_activity_window(&self) -> Duration {
        self.recent_activity_window
    }

    /// Bounded number of tier evaluations before the engine reports no match.
    pub fn match_attempts(&self) -> usize {
        self.match_attempts
    }

    /// Maximum accepted chat message length, in characters.
    pub fn chat_max_chars(&self) -> usize {
        self.chat_max_chars
    }

    /// Broadcast capacity of the shared event hub.
    pub fn event_capacity(&self) -> usize {
        self.event_capacity
    }

    /// Broadcast capacity of each per-user match watch channel.
    pub fn watch_capacity(&self) -> usize {
        self.watch_capacity
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            recent_activity_window: Duration::from_secs(DEFAULT_RECENT_ACTIVITY_SECS),
            match_attempts: DEFAULT_MATCH_ATTEMPTS,
            chat_max_chars: DEFAULT_CHAT_MAX_CHARS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            watch_capacity: DEFAULT_WATCH_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    recent_activity_secs: Option<u64>,
    match_attempts: Option<usize>,
    chat_max_chars: Option<usize>,
    event_capacity: Option<usize>,
    watch_capacity: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            recent_activity_window: value
                .recent_activity_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.recent_activity_window),
            match_attempts: value.match_attempts.unwrap_or(defaults.match_attempts),
            chat_max_chars: value.chat_max_chars.unwrap_or(defaults.chat_max_chars),
            event_capacity: value.event_capacity.unwrap_or(defaults.event_capacity),
            watch_capacity: value.watch_capacity.unwrap_or(defaults.watch_capacity),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
