// config.rs — TOML configuration loaded from beside the DLL.
//
// Missing file: defaults are written out so users have something to edit.
// Present but unreadable or unparsable: fatal ConfigInvalid — a half-read
// key binding silently doing the wrong thing is worse than an inactive mod.

use std::fs;
use std::path::Path;

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_AOB_PATTERN;
use crate::error::{Error, Result};
use crate::input::KeyBindings;

fn default_log_level() -> String {
    "info".to_string()
}

fn default_aob_pattern() -> String {
    DEFAULT_AOB_PATTERN.to_string()
}

fn default_toggle_keys() -> Vec<u32> {
    vec![0x72] // F3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// VK codes that toggle between first and third person.
    #[serde(default = "default_toggle_keys")]
    pub toggle_keys: Vec<u32>,

    /// VK codes that force first person.
    #[serde(default)]
    pub fpv_keys: Vec<u32>,

    /// VK codes that force third person.
    #[serde(default)]
    pub tpv_keys: Vec<u32>,

    /// One of: debug, info, warning, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// AOB pattern scanned for in the game module; override after a game
    /// patch moves the code.
    #[serde(default = "default_aob_pattern")]
    pub aob_pattern: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            toggle_keys: default_toggle_keys(),
            fpv_keys: Vec::new(),
            tpv_keys: Vec::new(),
            log_level: default_log_level(),
            aob_pattern: default_aob_pattern(),
        }
    }
}

impl Config {
    /// Load the config, creating it with defaults when absent.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Config::default();
            config.save(path)?;
            return Ok(config);
        }
        let content = fs::read_to_string(path)
            .map_err(|e| Error::ConfigInvalid(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| Error::ConfigInvalid(format!("cannot parse {}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigInvalid(format!("cannot serialize config: {e}")))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn key_bindings(&self) -> KeyBindings {
        KeyBindings {
            toggle: self.toggle_keys.clone(),
            first_person: self.fpv_keys.clone(),
            third_person: self.tpv_keys.clone(),
        }
    }

    /// Parse the configured log level, falling back to Info on anything
    /// unrecognized (a bad level should not keep the mod from starting).
    pub fn level_filter(&self) -> LevelFilter {
        match self.log_level.to_ascii_lowercase().as_str() {
            "debug" => LevelFilter::Debug,
            "info" => LevelFilter::Info,
            "warning" | "warn" => LevelFilter::Warn,
            "error" => LevelFilter::Error,
            _ => LevelFilter::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.toggle_keys, vec![0x72]);
        assert!(config.fpv_keys.is_empty());
        assert_eq!(config.level_filter(), LevelFilter::Info);
        assert_eq!(config.aob_pattern, DEFAULT_AOB_PATTERN);
    }

    #[test]
    fn test_parse_partial_file_fills_defaults() {
        let config: Config = toml::from_str("toggle_keys = [0x70]\nlog_level = \"debug\"").unwrap();
        assert_eq!(config.toggle_keys, vec![0x70]);
        assert_eq!(config.level_filter(), LevelFilter::Debug);
        assert_eq!(config.aob_pattern, DEFAULT_AOB_PATTERN);
    }

    #[test]
    fn test_level_filter_tolerates_junk() {
        let mut config = Config::default();
        config.log_level = "chatty".to_string();
        assert_eq!(config.level_filter(), LevelFilter::Info);
        config.log_level = "WARNING".to_string();
        assert_eq!(config.level_filter(), LevelFilter::Warn);
    }

    #[test]
    fn test_load_or_create_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tpv_toggle.toml");

        // First load writes the defaults out.
        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());

        let reloaded = Config::load_or_create(&path).unwrap();
        assert_eq!(reloaded.toggle_keys, created.toggle_keys);
        assert_eq!(reloaded.aob_pattern, created.aob_pattern);
    }

    #[test]
    fn test_malformed_file_is_config_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tpv_toggle.toml");
        std::fs::write(&path, "toggle_keys = \"not a list\"").unwrap();
        assert!(matches!(
            Config::load_or_create(&path),
            Err(Error::ConfigInvalid(_))
        ));
    }
}
