//! Reload options and their loading.
//!
//! Options are layered with figment. Priority: explicit overrides >
//! environment variables (`HMR_CLEAR_ON_RELOAD`, `HMR_DEBOUNCE_MS`, ...) >
//! `hmr.toml` > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default config file looked up in the working directory.
pub const CONFIG_FILE: &str = "hmr.toml";

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "HMR_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmrOptions {
    /// Clear the terminal and print a "restarted" notice before each reload
    #[serde(default = "default_clear_on_reload")]
    pub clear_on_reload: bool,

    /// Quiet period before a burst of file events becomes one change signal
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Where the dylib loader puts its per-load copies
    #[serde(default)]
    pub shadow_dir: Option<PathBuf>,

    /// Path patterns the file watcher drops (directory names or `*.ext`)
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
}

impl Default for HmrOptions {
    fn default() -> Self {
        Self {
            clear_on_reload: default_clear_on_reload(),
            debounce_ms: default_debounce_ms(),
            shadow_dir: None,
            ignore: default_ignore(),
        }
    }
}

impl HmrOptions {
    /// Load options from `hmr.toml` (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let default_path = Path::new(CONFIG_FILE);
        let file = default_path.exists().then_some(default_path);
        Self::figment(file).extract().map_err(ConfigError::from)
    }

    /// Load options from an explicit config file and the environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::figment(Some(path)).extract().map_err(ConfigError::from)
    }

    /// The layered figment, for callers that merge their own overrides on top.
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Configured shadow directory, or `<tmp>/hmr-<pid>`.
    pub fn shadow_dir(&self) -> PathBuf {
        self.shadow_dir.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("hmr-{}", std::process::id()))
        })
    }
}

fn default_clear_on_reload() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_ignore() -> Vec<String> {
    vec![".git".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = HmrOptions::default();
        assert!(options.clear_on_reload);
        assert_eq!(options.debounce(), Duration::from_millis(100));
        assert!(options.shadow_dir.is_none());
        assert_eq!(options.ignore, vec![".git".to_string()]);
    }

    #[test]
    fn test_default_shadow_dir_is_per_process() {
        let dir = HmrOptions::default().shadow_dir();
        assert!(dir.starts_with(std::env::temp_dir()));
        assert!(dir.ends_with(format!("hmr-{}", std::process::id())));
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let options: HmrOptions = serde_json::from_str(r#"{ "debounce_ms": 5 }"#).unwrap();
        assert!(options.clear_on_reload);
        assert_eq!(options.debounce_ms, 5);
        assert_eq!(options.ignore, vec![".git".to_string()]);
    }
}
