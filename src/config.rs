//! Persistence for the single API key the CLI needs.
//!
//! The file is a flat JSON object. It is read fresh on every access and rewritten in full
//! after every mutation; nothing is cached between calls.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Error;

/// The default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    // Keys written by something else are carried through untouched.
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ConfigStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the config file. A missing file is the same as an empty config; a file that
    /// exists but does not hold a JSON object with an optional string `api_key` is an error.
    pub fn load(&self) -> Result<Config, Error> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no config file at {}, using defaults", self.path.display());
                return Ok(Config::default());
            }
            Err(source) => {
                return Err(Error::ConfigIo {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let config = serde_json::from_str(&contents).map_err(|source| Error::ConfigCorrupt {
            path: self.path.clone(),
            source,
        })?;
        debug!("loaded config from {}", self.path.display());
        Ok(config)
    }

    /// Replaces the file's contents with `config`.
    pub fn save(&self, config: &Config) -> Result<(), Error> {
        let io_err = |source| Error::ConfigIo {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let json = serde_json::to_string_pretty(config).map_err(|e| io_err(e.into()))?;
        fs::write(&self.path, json).map_err(io_err)?;
        debug!("saved config to {}", self.path.display());
        Ok(())
    }

    pub fn set_api_key(&self, key: &str) -> Result<(), Error> {
        let mut config = self.load()?;
        config.api_key = Some(key.to_string());
        self.save(&config)
    }

    /// Removes the stored key. Returns `false`, leaving the file untouched, when there was
    /// no key to remove.
    pub fn reset_api_key(&self) -> Result<bool, Error> {
        let mut config = self.load()?;
        if config.api_key.take().is_none() {
            return Ok(false);
        }
        self.save(&config)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(temp: &TempDir) -> ConfigStore {
        ConfigStore::new(temp.path().join(DEFAULT_CONFIG_FILE))
    }

    #[test]
    fn test_missing_file_is_empty_config() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        assert_eq!(store.load().unwrap(), Config::default());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_set_then_load_returns_key() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        store.set_api_key("abc123").unwrap();
        assert_eq!(store.load().unwrap().api_key.as_deref(), Some("abc123"));

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"api_key": "abc123"}));
    }

    #[test]
    fn test_save_of_load_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        fs::write(store.path(), r#"{"api_key": "k", "theme": "dark", "n": 3}"#).unwrap();

        let first = store.load().unwrap();
        store.save(&first).unwrap();
        let second = store.load().unwrap();
        store.save(&second).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.load().unwrap(), first);
        assert_eq!(first.other.get("theme"), Some(&serde_json::json!("dark")));
    }

    #[test]
    fn test_reset_removes_key_and_keeps_other_entries() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        fs::write(store.path(), r#"{"api_key": "k", "theme": "dark"}"#).unwrap();

        assert!(store.reset_api_key().unwrap());
        let config = store.load().unwrap();
        assert_eq!(config.api_key, None);
        assert_eq!(config.other.len(), 1);
    }

    #[test]
    fn test_reset_without_key_leaves_file_unchanged() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        let original = r#"{ "theme":"dark" }"#;
        fs::write(store.path(), original).unwrap();

        assert!(!store.reset_api_key().unwrap());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), original);
    }

    #[test]
    fn test_reset_without_file_does_not_create_it() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        assert!(!store.reset_api_key().unwrap());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_corrupt_files_are_rejected() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        for contents in ["{not json", "", "[1, 2]", r#"{"api_key": 42}"#] {
            fs::write(store.path(), contents).unwrap();
            match store.load() {
                Err(Error::ConfigCorrupt { path, .. }) => assert_eq!(path, store.path()),
                other => panic!("expected ConfigCorrupt for {contents:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_save_failures_are_io_errors() {
        let temp = TempDir::new().unwrap();
        // the config path is taken by a directory, so writing it fails
        let store = ConfigStore::new(temp.path());
        match store.save(&Config::default()) {
            Err(Error::ConfigIo { path, .. }) => assert_eq!(path, temp.path()),
            other => panic!("expected ConfigIo, got {other:?}"),
        }
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::new(temp.path().join("nested").join("config.json"));
        store.set_api_key("xyz").unwrap();
        assert_eq!(store.load().unwrap().api_key.as_deref(), Some("xyz"));
    }
}
