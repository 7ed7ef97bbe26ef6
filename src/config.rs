//! Configuration for the dashboard.
//!
//! Supports YAML configuration with precedence: CLI > ENV > file > defaults.
//! The binary applies CLI flags on top of [`Config::apply_env`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::aggregator::Limits;
use crate::error::{Result, StreamvizError};
use crate::state::{PreviewMode, StartMode};
use crate::theme::Theme;
use crate::view::ViewOptions;

/// Enables pretty previews when set to a truthy value.
pub const ENV_PRETTY: &str = "STREAMVIZ_PRETTY";
/// Preview style used when pretty previews are on (`summary` or `hybrid`).
pub const ENV_PRETTY_MODE: &str = "STREAMVIZ_PRETTY_MODE";
/// Keeps ANSI escapes in log lines when set to a truthy value.
pub const ENV_KEEP_ANSI: &str = "STREAMVIZ_KEEP_ANSI";

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version.
    #[serde(default = "default_version")]
    pub version: u32,

    /// Log file to follow.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Read existing content instead of only new writes.
    #[serde(default)]
    pub from_start: bool,

    /// Soft cap on tracked streams.
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Wrapped lines per row.
    #[serde(default = "default_lines_per_item")]
    pub lines_per_item: usize,

    /// Wrapped lines per expanded row.
    #[serde(default = "default_lines_expanded")]
    pub lines_expanded: usize,

    /// Initial preview mode.
    #[serde(default)]
    pub preview: PreviewMode,

    /// Characters retained per stream.
    #[serde(default = "default_char_budget")]
    pub char_budget: usize,

    /// Non-delta lines retained for the recent panel.
    #[serde(default = "default_recent_capacity")]
    pub recent_capacity: usize,

    /// Recent lines shown under the list.
    #[serde(default = "default_recent_lines")]
    pub recent_lines: usize,

    /// Tick length in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Events-per-second sampling window in milliseconds.
    #[serde(default = "default_eps_window_ms")]
    pub eps_window_ms: u64,

    /// Most bytes read from the log in one poll.
    #[serde(default = "default_max_read_bytes")]
    pub max_read_bytes: usize,

    /// Keep ANSI escapes instead of stripping them.
    #[serde(default)]
    pub keep_ansi: bool,

    /// Pretty-print JSON content in the detail view.
    #[serde(default)]
    pub json_pretty: bool,

    /// Enable vim-style navigation keys (jk, g/G).
    #[serde(default = "default_vim_keys")]
    pub vim_keys: bool,

    /// Directory exports are written to.
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,

    /// Color overrides.
    #[serde(default)]
    pub theme: Theme,
}

fn default_version() -> u32 {
    1
}
fn default_log_path() -> PathBuf {
    PathBuf::from("codex-tui.log")
}
fn default_max_items() -> usize {
    200
}
fn default_lines_per_item() -> usize {
    5
}
fn default_lines_expanded() -> usize {
    12
}
fn default_char_budget() -> usize {
    32 * 1024
}
fn default_recent_capacity() -> usize {
    50
}
fn default_recent_lines() -> usize {
    3
}
fn default_tick_ms() -> u64 {
    20
}
fn default_eps_window_ms() -> u64 {
    500
}
fn default_max_read_bytes() -> usize {
    4 * 1024 * 1024
}
fn default_vim_keys() -> bool {
    true
}
fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            log_path: default_log_path(),
            from_start: false,
            max_items: default_max_items(),
            lines_per_item: default_lines_per_item(),
            lines_expanded: default_lines_expanded(),
            preview: PreviewMode::Off,
            char_budget: default_char_budget(),
            recent_capacity: default_recent_capacity(),
            recent_lines: default_recent_lines(),
            tick_ms: default_tick_ms(),
            eps_window_ms: default_eps_window_ms(),
            max_read_bytes: default_max_read_bytes(),
            keep_ansi: false,
            json_pretty: false,
            vim_keys: default_vim_keys(),
            export_dir: default_export_dir(),
            theme: Theme::default(),
        }
    }
}

/// True for `1`, `true`, `yes` and `on`, in any case.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `<config_dir>/streamviz/config.yaml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("streamviz").join("config.yaml"))
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .map_err(|_| StreamvizError::ConfigNotFound(path.display().to_string()))?;

        Self::parse(&content)
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error with line number if parsing fails.
    pub fn parse(yaml: &str) -> Result<Self> {
        serde_yaml_ng::from_str(yaml).map_err(|e| {
            let line = e.location().map_or(0, |l| l.line());
            StreamvizError::ConfigParse {
                line,
                message: e.to_string(),
            }
        })
    }

    /// Loads configuration with fallback to defaults. A file that exists but
    /// does not parse is reported through tracing.
    #[must_use]
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(StreamvizError::ConfigNotFound(_)) => Self::default(),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable configuration");
                Self::default()
            }
        }
    }

    /// Applies environment overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let mode = lookup(ENV_PRETTY_MODE)
            .as_deref()
            .and_then(PreviewMode::parse)
            .filter(PreviewMode::is_pretty);

        if lookup(ENV_PRETTY).is_some_and(|v| is_truthy(&v)) {
            self.preview = mode.unwrap_or(PreviewMode::Hybrid);
        } else if let Some(mode) = mode {
            if self.preview.is_pretty() {
                self.preview = mode;
            }
        }

        if lookup(ENV_KEEP_ANSI).is_some_and(|v| is_truthy(&v)) {
            self.keep_ansi = true;
        }
    }

    /// Rejects values the pipeline cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`StreamvizError::ConfigInvalid`] naming the first bad key.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_items", self.max_items as u64),
            ("lines_per_item", self.lines_per_item as u64),
            ("lines_expanded", self.lines_expanded as u64),
            ("char_budget", self.char_budget as u64),
            ("recent_capacity", self.recent_capacity as u64),
            ("tick_ms", self.tick_ms),
            ("eps_window_ms", self.eps_window_ms),
            ("max_read_bytes", self.max_read_bytes as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(StreamvizError::ConfigInvalid {
                    key: key.to_string(),
                    message: "must be greater than 0".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Tick length.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// EPS sampling window.
    #[must_use]
    pub fn eps_window(&self) -> Duration {
        Duration::from_millis(self.eps_window_ms)
    }

    /// Tailer start mode.
    #[must_use]
    pub fn start_mode(&self) -> StartMode {
        StartMode::from_flag(self.from_start)
    }

    /// Aggregator capacities.
    #[must_use]
    pub fn limits(&self) -> Limits {
        Limits {
            max_items: self.max_items,
            char_budget: self.char_budget,
            recent_capacity: self.recent_capacity,
        }
    }

    /// Initial view settings.
    #[must_use]
    pub fn view_options(&self) -> ViewOptions {
        ViewOptions {
            lines_per_item: self.lines_per_item,
            lines_expanded: self.lines_expanded,
            recent_lines: self.recent_lines,
            preview: self.preview,
            json_pretty: self.json_pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::new();

        assert_eq!(config.version, 1);
        assert_eq!(config.max_items, 200);
        assert_eq!(config.char_budget, 32 * 1024);
        assert_eq!(config.recent_capacity, 50);
        assert_eq!(config.tick_interval(), Duration::from_millis(20));
        assert_eq!(config.eps_window(), Duration::from_millis(500));
        assert_eq!(config.start_mode(), StartMode::Tail);
        assert!(config.vim_keys);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_parse_minimal() {
        let config = Config::parse("version: 1").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_parse_full() {
        let yaml = r"
version: 1
log_path: /var/log/agent.log
from_start: true
max_items: 50
lines_per_item: 3
preview: hybrid
char_budget: 1000
json_pretty: true
vim_keys: false
export_dir: /tmp/exports
";

        let config = Config::parse(yaml).unwrap();

        assert_eq!(config.log_path, PathBuf::from("/var/log/agent.log"));
        assert_eq!(config.start_mode(), StartMode::FromStart);
        assert_eq!(config.limits().max_items, 50);
        assert_eq!(config.limits().char_budget, 1000);
        assert_eq!(config.view_options().lines_per_item, 3);
        assert_eq!(config.preview, PreviewMode::Hybrid);
        assert!(config.json_pretty);
        assert!(!config.vim_keys);
        assert_eq!(config.export_dir, PathBuf::from("/tmp/exports"));
    }

    #[test]
    fn test_config_theme_override() {
        let config = Config::parse("theme:\n  error: \"#ff0000\"\n").unwrap();
        assert_eq!(config.theme.error, "#ff0000");
        assert_eq!(config.theme.args, Theme::default().args);
    }

    #[test]
    fn test_config_parse_error_includes_line() {
        let yaml = r"
version: 1
max_items: 10
tick_ms: not_a_number
";

        let err = Config::parse(yaml).unwrap_err();
        assert!(matches!(err, StreamvizError::ConfigParse { line: 4, .. }), "{err}");
    }

    #[test]
    fn test_config_load_or_default() {
        let config = Config::load_or_default("/nonexistent/path");
        assert_eq!(config.version, 1);
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "max_items: 7\n").unwrap();

        assert_eq!(Config::load(&path).unwrap().max_items, 7);
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = Config {
            char_budget: 0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, StreamvizError::ConfigInvalid { ref key, .. } if key == "char_budget"));
    }

    #[test]
    fn test_env_pretty_defaults_to_hybrid() {
        let mut config = Config::default();
        config.apply_env(env(&[(ENV_PRETTY, "yes")]));
        assert_eq!(config.preview, PreviewMode::Hybrid);

        let mut config = Config::default();
        config.apply_env(env(&[(ENV_PRETTY, "1"), (ENV_PRETTY_MODE, "summary")]));
        assert_eq!(config.preview, PreviewMode::Summary);
    }

    #[test]
    fn test_env_mode_alone_keeps_previews_off() {
        let mut config = Config::default();
        config.apply_env(env(&[(ENV_PRETTY_MODE, "summary")]));
        assert_eq!(config.preview, PreviewMode::Off);

        let mut config = Config {
            preview: PreviewMode::Hybrid,
            ..Config::default()
        };
        config.apply_env(env(&[(ENV_PRETTY_MODE, "summary")]));
        assert_eq!(config.preview, PreviewMode::Summary);
    }

    #[test]
    fn test_env_keep_ansi() {
        let mut config = Config::default();
        config.apply_env(env(&[(ENV_KEEP_ANSI, "on")]));
        assert!(config.keep_ansi);
    }

    #[test]
    fn test_truthy() {
        assert!(is_truthy(" TRUE "));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
    }
}
