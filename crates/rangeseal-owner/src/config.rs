//! Owner and searcher configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::credential::DelegatedCredential;
use crate::error::{OwnerError, Result};
use crate::keystore::replace_private;

/// File name of the persisted key material under `store_path`
pub const KEYS_FILE: &str = "keys";

/// File name of the persisted index counters under `store_path`
pub const INDEX_STATE_FILE: &str = "index-state.json";

fn default_server_addr() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

/// Configuration for the data owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerConfig {
    /// Directory holding the keys file and index counters
    pub store_path: PathBuf,
    /// Known partition names (the attribute universe)
    pub set_list: Vec<String>,
    /// Remote store base URL
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// Deadline for one remote round trip, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Ask the store which trapdoors match before a full Find
    #[serde(default)]
    pub prefind: bool,
}

impl OwnerConfig {
    pub fn new(store_path: impl Into<PathBuf>, set_list: Vec<String>) -> Self {
        Self {
            store_path: store_path.into(),
            set_list,
            server_addr: default_server_addr(),
            request_timeout_ms: default_request_timeout_ms(),
            prefind: false,
        }
    }

    pub fn with_server_addr(mut self, addr: impl Into<String>) -> Self {
        self.server_addr = addr.into();
        self
    }

    pub fn with_prefind(mut self, enabled: bool) -> Self {
        self.prefind = enabled;
        self
    }

    pub fn keys_path(&self) -> PathBuf {
        self.store_path.join(KEYS_FILE)
    }

    pub fn index_state_path(&self) -> PathBuf {
        self.store_path.join(INDEX_STATE_FILE)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.set_list.is_empty() {
            return Err(OwnerError::Config("set_list must name at least one partition".into()));
        }
        Ok(())
    }
}

/// Self-contained configuration for a delegated searcher
///
/// Never contains the master secret key or the index secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearcherConfig {
    pub set_list: Vec<String>,
    pub keys: DelegatedCredential,
    pub server_addr: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl SearcherConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save with owner-only permissions; the file holds secret keys
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_vec_pretty(self)?;
        replace_private(path.as_ref(), &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let config: OwnerConfig =
            serde_json::from_str(r#"{"store_path": "/tmp/owner", "set_list": ["grpA"]}"#).unwrap();
        assert_eq!(config.server_addr, "http://127.0.0.1:3000");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(!config.prefind);
        assert_eq!(config.keys_path(), PathBuf::from("/tmp/owner/keys"));
    }

    #[test]
    fn test_load_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("owner.json");
        let config = OwnerConfig::new(dir.path(), vec!["grpA".into(), "grpB".into()])
            .with_server_addr("http://10.0.0.1:8080")
            .with_prefind(true);
        config.save(&path).unwrap();
        assert_eq!(OwnerConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_empty_set_list_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("owner.json");
        OwnerConfig::new(dir.path(), vec![]).save(&path).unwrap();
        assert!(matches!(OwnerConfig::load(&path), Err(OwnerError::Config(_))));
    }
}
