//! Store configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use msgstore_storage::{StoreConfig, DATABASE_NAME, DEFAULT_PAGE_SIZE};

use crate::error::CoreError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the database file
    pub data_dir: PathBuf,
    /// Fixed database identifier; the file is `<data_dir>/<name>.sqlite3`
    pub database_name: String,
    /// Rows fetched per round trip while streaming a query
    pub query_page_size: usize,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            database_name: DATABASE_NAME.to_string(),
            query_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("msgstore"))
            .unwrap_or_else(|| PathBuf::from(".msgstore"))
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.sqlite3", self.database_name))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file, falling back to defaults when it doesn't exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_name.trim().is_empty() {
            return Err(CoreError::Config("database_name cannot be empty".into()));
        }
        if self.database_name.contains(['/', '\\']) {
            return Err(CoreError::Config(format!(
                "database_name {:?} must not contain path separators",
                self.database_name
            )));
        }
        if self.query_page_size == 0 {
            return Err(CoreError::Config("query_page_size must be at least 1".into()));
        }
        Ok(())
    }

    pub fn store_config(&self) -> Result<StoreConfig> {
        self.validate()?;

        let mut store = StoreConfig::new(self.database_path());
        store.schema.database_name = self.database_name.clone();
        store.page_size = self.query_page_size;
        Ok(store)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

// Simple dirs implementation for common directories
mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path_uses_fixed_name() {
        let config = Config::new(PathBuf::from("/tmp/msgstore-data"));
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/msgstore-data/myDatabase.sqlite3")
        );
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = Config::from_json(r#"{"data_dir": "/var/lib/app"}"#).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/app"));
        assert_eq!(config.database_name, "myDatabase");
        assert_eq!(config.query_page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            Config::from_json(r#"{"query_page_size": 0}"#),
            Err(CoreError::Config(_))
        ));
        assert!(matches!(
            Config::from_json(r#"{"database_name": "../escape"}"#),
            Err(CoreError::Config(_))
        ));
        assert!(matches!(
            Config::from_json("not json"),
            Err(CoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join(format!("msgstore-{}.json", uuid::Uuid::new_v4()));
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_store_config_carries_name_and_page_size() {
        let mut config = Config::new(PathBuf::from("/tmp/x"));
        config.database_name = "chatlog".to_string();
        config.query_page_size = 16;

        let store = config.store_config().unwrap();
        assert_eq!(store.path, PathBuf::from("/tmp/x/chatlog.sqlite3"));
        assert_eq!(store.schema.database_name, "chatlog");
        assert_eq!(store.page_size, 16);
    }
}
