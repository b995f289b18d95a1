//! Configuration for Storytime.
//!
//! Settings are read from `storytime.toml` and layered as
//! file → environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//!
//! [storage]
//! db_path = ".storytime/storytime.db"
//!
//! [keys]
//! story_min_len = 3
//! part_len = 8
//! random_len = 32
//!
//! [stories]
//! max_visible_words = 16
//! max_target_words = 65535
//!
//! [notify]
//! base_url = "http://localhost:8080"
//! sender = "Storytime <storytime@localhost>"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "storytime.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".storytime/storytime.db")
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Identifier lengths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysSection {
    /// Shortest story id the allocator will try.
    #[serde(default = "default_story_min_len")]
    pub story_min_len: usize,
    /// Length of part tokens.
    #[serde(default = "default_part_len")]
    pub part_len: usize,
    /// Length of the random string each allocation draws prefixes from.
    #[serde(default = "default_random_len")]
    pub random_len: usize,
}

fn default_story_min_len() -> usize {
    3
}

fn default_part_len() -> usize {
    8
}

fn default_random_len() -> usize {
    32
}

impl Default for KeysSection {
    fn default() -> Self {
        Self {
            story_min_len: default_story_min_len(),
            part_len: default_part_len(),
            random_len: default_random_len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoriesSection {
    #[serde(default = "default_max_visible_words")]
    pub max_visible_words: usize,
    #[serde(default = "default_max_target_words")]
    pub max_target_words: u32,
}

fn default_max_visible_words() -> usize {
    storytime_common::MAX_VISIBLE_WORDS
}

fn default_max_target_words() -> u32 {
    u16::MAX as u32
}

impl Default for StoriesSection {
    fn default() -> Self {
        Self {
            max_visible_words: default_max_visible_words(),
            max_target_words: default_max_target_words(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifySection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_sender")]
    pub sender: String,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_sender() -> String {
    "Storytime <storytime@localhost>".to_string()
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            sender: default_sender(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorytimeConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub keys: KeysSection,
    #[serde(default)]
    pub stories: StoriesSection,
    #[serde(default)]
    pub notify: NotifySection,
}

impl StorytimeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse storytime.toml")
    }

    /// Load `path` if given, else `./storytime.toml` if present, else defaults.
    /// Environment overrides are applied on top.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None if Path::new(CONFIG_FILE).exists() => Self::load(Path::new(CONFIG_FILE))?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize storytime.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(db_path) = std::env::var("STORYTIME_DB_PATH") {
            self.storage.db_path = PathBuf::from(db_path);
        }
        if let Ok(port) = std::env::var("STORYTIME_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid STORYTIME_PORT '{}'", port))?;
        }
        if let Ok(base_url) = std::env::var("STORYTIME_BASE_URL") {
            self.notify.base_url = base_url;
        }
        Ok(())
    }

    /// Returns a list of problems; empty means the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.keys.story_min_len == 0 {
            errors.push("keys.story_min_len must be at least 1".to_string());
        }
        if self.keys.part_len == 0 {
            errors.push("keys.part_len must be at least 1".to_string());
        }
        if self.keys.story_min_len > self.keys.random_len {
            errors.push(format!(
                "keys.story_min_len ({}) exceeds keys.random_len ({})",
                self.keys.story_min_len, self.keys.random_len
            ));
        }
        if self.stories.max_visible_words == 0 {
            errors.push("stories.max_visible_words must be at least 1".to_string());
        }
        if self.stories.max_target_words == 0 {
            errors.push("stories.max_target_words must be at least 1".to_string());
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StorytimeConfig::default();
        assert_eq!(config.keys.story_min_len, 3);
        assert_eq!(config.keys.part_len, 8);
        assert_eq!(config.keys.random_len, 32);
        assert_eq!(config.stories.max_visible_words, 16);
        assert_eq!(config.stories.max_target_words, 65535);
        assert_eq!(config.server.port, 8080);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_file_fills_defaults() -> Result<()> {
        let config = StorytimeConfig::parse(
            r#"
            [server]
            port = 9000

            [keys]
            story_min_len = 4
            "#,
        )?;
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.keys.story_min_len, 4);
        assert_eq!(config.keys.part_len, 8);
        Ok(())
    }

    #[test]
    fn test_parse_rejects_bad_toml() {
        assert!(StorytimeConfig::parse("[server\nport = 1").is_err());
    }

    #[test]
    fn test_validate_reports_bad_lengths() {
        let mut config = StorytimeConfig::default();
        config.keys.story_min_len = 40;
        config.stories.max_visible_words = 0;
        let errors = config.validate();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("story_min_len"));
    }

    #[test]
    fn test_save_and_load_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(CONFIG_FILE);
        let mut config = StorytimeConfig::default();
        config.notify.base_url = "https://stories.example.com".into();
        config.save(&path)?;

        let loaded = StorytimeConfig::load(&path)?;
        assert_eq!(loaded.notify.base_url, "https://stories.example.com");
        Ok(())
    }
}
