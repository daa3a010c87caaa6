//! TOML-based application configuration for the CLI.
//!
//! Stores user preferences including:
//! - Where the collection database lives
//! - Which deck `review` commands study by default
//! - How answers are displayed
//!
//! Configuration is stored at `~/.config/deckwise/config.toml`.
//! Scheduling parameters are not here; they live in the collection as
//! [`DeckConfig`](crate::deck_config::DeckConfig).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file. Relative paths resolve against the data directory.
    #[serde(default = "default_database")]
    pub database: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSettings {
    #[serde(default = "default_deck")]
    pub default_deck: String,
    /// Print the next interval for every button after showing a card.
    #[serde(default = "default_true")]
    pub show_intervals: bool,
    /// Seed for the scheduler's fuzz generator. Unset means random.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/deckwise/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub review: ReviewSettings,
}

fn default_database() -> String {
    "deckwise.db".into()
}
fn default_deck() -> String {
    "Default".into()
}
fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            default_deck: default_deck(),
            show_intervals: true,
            seed: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            review: ReviewSettings::default(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> std::result::Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    // "none" clears an optional number; required ones reject it below.
                    serde_json::Value::Number(_) if value == "none" => serde_json::Value::Null,
                    serde_json::Value::Number(_) => value
                        .parse::<u64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?,
                    // Unset optionals accept numbers, everything else is a string.
                    serde_json::Value::Null => match value.parse::<u64>() {
                        Ok(n) => serde_json::Value::Number(n.into()),
                        Err(_) if value == "none" => serde_json::Value::Null,
                        Err(_) => serde_json::Value::String(value.into()),
                    },
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk, writing the default config when none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(ConfigError::from)?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
            .into()),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// All leaf keys with their values, in `section.key` form.
    pub fn entries(&self) -> Vec<(String, String)> {
        let Ok(json) = serde_json::to_value(self) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        if let Some(sections) = json.as_object() {
            for (section, fields) in sections {
                let Some(fields) = fields.as_object() else {
                    continue;
                };
                for (name, value) in fields {
                    let shown = match value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    out.push((format!("{section}.{name}"), shown));
                }
            }
        }
        out.sort();
        out
    }

    /// Database location, resolving relative paths against the data directory.
    pub fn database_path(&self) -> Result<PathBuf> {
        let path = PathBuf::from(&self.storage.database);
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(data_dir()?.join(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.review.default_deck, "Default");
        assert!(parsed.review.show_intervals);
        assert_eq!(parsed.storage.database, "deckwise.db");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[review]\ndefault_deck = \"Japanese\"\n").unwrap();
        assert_eq!(parsed.review.default_deck, "Japanese");
        assert!(parsed.review.show_intervals);
        assert_eq!(parsed.storage.database, "deckwise.db");
    }

    #[test]
    fn get_reads_dotted_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("review.default_deck").as_deref(), Some("Default"));
        assert_eq!(cfg.get("review.show_intervals").as_deref(), Some("true"));
        assert_eq!(cfg.get("review.missing"), None);
        assert_eq!(cfg.get(""), None);
    }

    #[test]
    fn set_parses_by_existing_type() {
        let mut cfg = Config::default();
        cfg.set("review.show_intervals", "false").unwrap();
        assert!(!cfg.review.show_intervals);
        cfg.set("review.seed", "42").unwrap();
        assert_eq!(cfg.review.seed, Some(42));
        cfg.set("review.seed", "none").unwrap();
        assert_eq!(cfg.review.seed, None);
        cfg.set("review.seed", "none").unwrap();
        assert_eq!(cfg.review.seed, None);
        cfg.set("review.seed", "9").unwrap();
        assert_eq!(cfg.review.seed, Some(9));
        cfg.set("storage.database", "/tmp/x.db").unwrap();
        assert_eq!(cfg.storage.database, "/tmp/x.db");
    }

    #[test]
    fn set_rejects_unknown_and_malformed() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("review.nope", "1"),
            Err(crate::error::CoreError::Config(ConfigError::UnknownKey(_)))
        ));
        assert!(cfg.set("review.show_intervals", "maybe").is_err());
        assert!(cfg.review.show_intervals);
        assert!(matches!(
            cfg.set("review.show_intervals", "none"),
            Err(crate::error::CoreError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.review.default_deck, "Default");
        assert!(path.exists());

        let mut cfg = cfg;
        cfg.set("review.default_deck", "Kanji").unwrap();
        cfg.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().review.default_deck, "Kanji");
    }

    #[test]
    fn entries_lists_every_leaf() {
        let keys: Vec<String> = Config::default().entries().into_iter().map(|(k, _)| k).collect();
        assert!(keys.contains(&"storage.database".to_string()));
        assert!(keys.contains(&"review.seed".to_string()));
    }
}
