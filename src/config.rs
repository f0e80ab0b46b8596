//! Subsystem configuration model and defaults.

use std::path::{Path, PathBuf};

use log::warn;

/// Runtime configuration, persisted as TOML by the hosting application.
///
/// Every field carries a default so a missing or partial file still yields a
/// usable configuration.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    /// Persisted code cache location.
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,
    /// Character-to-readings map location.
    #[serde(default = "default_char_map_file")]
    pub char_map_file: PathBuf,
    /// Minimum query length before a non-empty query triggers a refresh.
    #[serde(default = "default_min_query_len")]
    pub min_query_len: usize,
    /// Cool-down between refresh triggers while typing, in milliseconds.
    #[serde(default = "default_refresh_cooldown_ms")]
    pub refresh_cooldown_ms: u64,
    /// Exact digit sequence intercepted as the force-rebuild command.
    #[serde(default = "default_rebuild_sequence")]
    pub rebuild_sequence: String,
    /// Idle wakeup interval of the input worker, in milliseconds.
    #[serde(default = "default_input_poll_ms")]
    pub input_poll_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_file: default_cache_file(),
            char_map_file: default_char_map_file(),
            min_query_len: default_min_query_len(),
            refresh_cooldown_ms: default_refresh_cooldown_ms(),
            rebuild_sequence: default_rebuild_sequence(),
            input_poll_ms: default_input_poll_ms(),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file, falling back to defaults when the
    /// file is missing or unparsable.
    pub fn load(path: &Path) -> Config {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                warn!(
                    "Failed to read config file {}. Using defaults. error={}",
                    path.display(),
                    err
                );
                return Config::default();
            }
        };

        match toml::from_str::<Config>(&content) {
            Ok(config) => config,
            Err(err) => {
                warn!(
                    "Failed to parse config file {}. Using defaults. error={}",
                    path.display(),
                    err
                );
                Config::default()
            }
        }
    }
}

fn data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("t9search")
}

fn default_cache_file() -> PathBuf {
    data_root().join("t9_cache.json")
}

fn default_char_map_file() -> PathBuf {
    data_root().join("char_map.json")
}

fn default_min_query_len() -> usize {
    3
}

fn default_refresh_cooldown_ms() -> u64 {
    200
}

fn default_rebuild_sequence() -> String {
    "9527007".to_string()
}

fn default_input_poll_ms() -> u64 {
    1000
}
