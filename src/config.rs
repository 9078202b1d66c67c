use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::stats::{Metric, ThresholdConfig};
use crate::terminal::TermSize;

pub const CONFIG_ENV: &str = "PROCPROG_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub render: RenderConfig,
    pub thresholds: ThresholdConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RenderConfig {
    pub debounce_ms: u64,
    pub tick_ms: u64,
    pub cpu_warmup_ms: u64,
    pub fallback_columns: u16,
    pub fallback_rows: u16,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            tick_ms: 1000,
            cpu_warmup_ms: 50,
            fallback_columns: 80,
            fallback_rows: 24,
        }
    }
}

impl RenderConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn cpu_warmup(&self) -> Duration {
        Duration::from_millis(self.cpu_warmup_ms)
    }

    pub fn fallback_size(&self) -> TermSize {
        TermSize::new(self.fallback_columns, self.fallback_rows)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        error: std::io::Error,
    },
    Parse {
        path: PathBuf,
        error: toml::de::Error,
    },
    Invalid {
        path: PathBuf,
        message: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, error } => {
                write!(f, "failed to read config {}: {error}", path.display())
            }
            ConfigError::Parse { path, error } => {
                write!(f, "failed to parse config {}: {error}", path.display())
            }
            ConfigError::Invalid { path, message } => {
                write!(f, "invalid config {}: {message}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Loads the config file named by `PROCPROG_CONFIG`, else the one in the
    /// user's config directory, else the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var_os(key))
    }

    pub fn load_with(env: impl Fn(&str) -> Option<OsString>) -> Result<Self, ConfigError> {
        match locate(&env) {
            Some(Located::Required(path)) => Self::read(&path),
            Some(Located::Optional(path)) if path.is_file() => Self::read(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_path_buf(),
            error,
        })?;
        let config = Self::parse(&source, path)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn parse(source: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(source).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })?;
        config.validate().map_err(|message| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        let render = &self.render;
        for (key, value) in [
            ("render.debounce_ms", render.debounce_ms),
            ("render.tick_ms", render.tick_ms),
            ("render.fallback_columns", u64::from(render.fallback_columns)),
            ("render.fallback_rows", u64::from(render.fallback_rows)),
        ] {
            if value == 0 {
                return Err(format!("`{key}` must be greater than zero"));
            }
        }
        for metric in Metric::ALL {
            let thresholds = self.thresholds.for_metric(metric);
            let label = metric.label();
            if !thresholds.amber.is_finite() || !thresholds.red.is_finite() {
                return Err(format!("`thresholds.{label}` values must be finite numbers"));
            }
            if thresholds.amber < 0.0 {
                return Err(format!("`thresholds.{label}.amber` must not be negative"));
            }
            if thresholds.amber > thresholds.red {
                return Err(format!(
                    "`thresholds.{label}.amber` ({}) must not exceed `red` ({})",
                    thresholds.amber, thresholds.red
                ));
            }
        }
        Ok(())
    }
}

enum Located {
    Required(PathBuf),
    Optional(PathBuf),
}

fn locate(env: &impl Fn(&str) -> Option<OsString>) -> Option<Located> {
    let non_empty = |key: &str| env(key).filter(|value| !value.is_empty());
    if let Some(path) = non_empty(CONFIG_ENV) {
        return Some(Located::Required(PathBuf::from(path)));
    }
    let base = non_empty("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| non_empty("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(Located::Optional(base.join("procprog").join("config.toml")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Thresholds;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("procprog-config-{name}-{nanos}"));
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    fn parse(source: &str) -> Result<Config, ConfigError> {
        Config::parse(source, Path::new("config.toml"))
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse("").expect("parse");
        assert_eq!(config, Config::default());
        assert_eq!(config.render.debounce(), Duration::from_millis(300));
        assert_eq!(config.render.fallback_size(), TermSize::new(80, 24));
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = parse(
            "[render]\ndebounce_ms = 150\n\n[thresholds.cpu]\namber = 50.0\nred = 90.0\n",
        )
        .expect("parse");
        assert_eq!(config.render.debounce_ms, 150);
        assert_eq!(config.render.tick_ms, 1000);
        assert_eq!(config.thresholds.cpu, Thresholds::new(50.0, 90.0));
        assert_eq!(config.thresholds.memory, Thresholds::new(60.0, 80.0));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let error = parse("[render]\ndebounce = 10\n").expect_err("unknown key");
        assert!(matches!(error, ConfigError::Parse { .. }));
        let error = parse("[colors]\nclock = \"red\"\n").expect_err("unknown table");
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn threshold_tables_need_both_levels() {
        let error = parse("[thresholds.disk]\namber = 10.0\n").expect_err("missing red");
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn inverted_thresholds_are_invalid() {
        let error = parse("[thresholds.network]\namber = 500.0\nred = 100.0\n")
            .expect_err("amber above red");
        assert!(matches!(error, ConfigError::Invalid { .. }));
        assert!(error.to_string().contains("thresholds.network.amber"));
    }

    #[test]
    fn zero_intervals_are_invalid() {
        let error = parse("[render]\ntick_ms = 0\n").expect_err("zero tick");
        assert!(error.to_string().contains("render.tick_ms"));
    }

    #[test]
    fn explicit_config_path_must_exist() {
        let dir = temp_dir("explicit");
        let missing = dir.join("missing.toml");
        let missing_os = missing.clone().into_os_string();
        let error = Config::load_with(|key| (key == CONFIG_ENV).then(|| missing_os.clone()))
            .expect_err("missing explicit config");
        assert!(matches!(error, ConfigError::Read { .. }));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn discovered_config_is_optional() {
        let dir = temp_dir("discovered");
        let dir_os = dir.clone().into_os_string();
        let config = Config::load_with(|key| (key == "XDG_CONFIG_HOME").then(|| dir_os.clone()))
            .expect("defaults when absent");
        assert_eq!(config, Config::default());

        fs::create_dir_all(dir.join("procprog")).expect("create config dir");
        fs::write(
            dir.join("procprog").join("config.toml"),
            "[render]\ntick_ms = 250\n",
        )
        .expect("write config");
        let config = Config::load_with(|key| (key == "XDG_CONFIG_HOME").then(|| dir_os.clone()))
            .expect("load discovered config");
        assert_eq!(config.render.tick_ms, 250);
        let _ = fs::remove_dir_all(dir);
    }
}
