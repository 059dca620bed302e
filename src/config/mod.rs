//! Orchestrator configuration (layered: defaults > TOML file > env).

use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TurnError};

const ENV_PREFIX: &str = "TURNKIT_";

/// Tunables for turn execution.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Wall-clock budget per turn. `None` disables the timeout.
    pub turn_timeout_ms: Option<u64>,
    /// Raw events buffered between producer and relay.
    #[builder(default = 64)]
    pub event_buffer: usize,
    /// Render units buffered between relay and consumer.
    #[builder(default = 64)]
    pub feed_buffer: usize,
    /// Reorder buffer bound, in events.
    #[builder(default = 32)]
    pub reorder_window: usize,
    #[builder(default = true)]
    pub stream_updates: bool,
    /// Record failed and cancelled turns (without snapshots).
    #[builder(default = false)]
    pub retain_failed_turns: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl OrchestratorConfig {
    pub fn turn_timeout(&self) -> Option<Duration> {
        self.turn_timeout_ms.map(Duration::from_millis)
    }

    /// Defaults overridden by `TURNKIT_*` environment variables (and `.env`).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| TurnError::Configuration(err.to_string()))
    }

    /// Full layering: defaults, then the TOML file if given, then env.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|err| {
                    TurnError::Configuration(format!("cannot read {}: {err}", path.display()))
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (`TURNKIT_EVENT_BUFFER`, ...).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(raw) = var("TURN_TIMEOUT_MS") {
            let ms: u64 = parse_var("TURN_TIMEOUT_MS", &raw)?;
            self.turn_timeout_ms = (ms > 0).then_some(ms);
        }
        if let Some(raw) = var("EVENT_BUFFER") {
            self.event_buffer = parse_var("EVENT_BUFFER", &raw)?;
        }
        if let Some(raw) = var("FEED_BUFFER") {
            self.feed_buffer = parse_var("FEED_BUFFER", &raw)?;
        }
        if let Some(raw) = var("REORDER_WINDOW") {
            self.reorder_window = parse_var("REORDER_WINDOW", &raw)?;
        }
        if let Some(raw) = var("STREAM_UPDATES") {
            self.stream_updates = parse_flag("STREAM_UPDATES", &raw)?;
        }
        if let Some(raw) = var("RETAIN_FAILED_TURNS") {
            self.retain_failed_turns = parse_flag("RETAIN_FAILED_TURNS", &raw)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_buffer == 0 {
            return Err(TurnError::Configuration("event_buffer must be at least 1".into()));
        }
        if self.feed_buffer == 0 {
            return Err(TurnError::Configuration("feed_buffer must be at least 1".into()));
        }
        if self.reorder_window == 0 {
            return Err(TurnError::Configuration("reorder_window must be at least 1".into()));
        }
        if self.turn_timeout_ms == Some(0) {
            return Err(TurnError::Configuration(
                "turn_timeout_ms must be positive; omit it to disable the timeout".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|err| TurnError::Configuration(format!("{ENV_PREFIX}{name}={raw}: {err}")))
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(TurnError::Configuration(format!(
            "{ENV_PREFIX}{name}={raw}: expected a boolean"
        ))),
    }
}

/// Platform data directory for persisted history.
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "turnkit")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".turnkit"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.turn_timeout(), None);
        assert_eq!(config.event_buffer, 64);
        assert!(config.stream_updates);
        assert!(!config.retain_failed_turns);
        config.validate().unwrap();
    }

    #[test]
    fn toml_overrides_defaults_partially() {
        let config = OrchestratorConfig::from_toml_str(
            "turn_timeout_ms = 5000\nreorder_window = 4\n",
        )
        .unwrap();
        assert_eq!(config.turn_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.reorder_window, 4);
        assert_eq!(config.feed_buffer, 64);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = OrchestratorConfig::from_toml_str("event_buffer = 8").unwrap();
        config
            .apply_env(lookup(&[
                ("TURNKIT_EVENT_BUFFER", "2"),
                ("TURNKIT_STREAM_UPDATES", "off"),
                ("TURNKIT_TURN_TIMEOUT_MS", "0"),
            ]))
            .unwrap();
        assert_eq!(config.event_buffer, 2);
        assert!(!config.stream_updates);
        assert_eq!(config.turn_timeout_ms, None);
    }

    #[test]
    fn bad_values_are_configuration_errors() {
        let mut config = OrchestratorConfig::default();
        let err = config
            .apply_env(lookup(&[("TURNKIT_FEED_BUFFER", "lots")]))
            .unwrap_err();
        assert!(matches!(err, TurnError::Configuration(_)));

        let zero = OrchestratorConfig::builder().event_buffer(0).build();
        assert!(zero.validate().is_err());
        let zero_window = OrchestratorConfig::builder().reorder_window(0).build();
        assert!(matches!(zero_window.validate(), Err(TurnError::Configuration(_))));
        let zero_timeout = OrchestratorConfig::builder().turn_timeout_ms(0).build();
        assert!(zero_timeout.validate().is_err());
        assert!(OrchestratorConfig::from_toml_str("event_buffer = \"x\"").is_err());
    }

    #[test]
    fn load_reads_a_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("turnkit.toml");
        std::fs::write(&path, "retain_failed_turns = true\n").unwrap();
        let config = OrchestratorConfig::load(Some(&path)).unwrap();
        assert!(config.retain_failed_turns);
    }
}
