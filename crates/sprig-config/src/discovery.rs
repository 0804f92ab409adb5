//! File-based config discovery
//!
//! Finds and loads sprig configuration files from the filesystem.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::SprigConfig;
use crate::error::{ConfigError, Result};

const TOML_FILE: &str = "sprig.toml";
const PACKAGE_JSON: &str = "package.json";
const PACKAGE_FIELD: &str = "sprig";

/// File-based configuration discovery
///
/// Library users that already hold a config value should use
/// [`SprigConfig::from_value`] directly.
///
/// # Example
///
/// ```no_run
/// use sprig_config::ConfigDiscovery;
///
/// let discovery = ConfigDiscovery::new(".");
/// let config = discovery.load().unwrap();
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    /// Create a new config discovery with a root directory
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Find a config file in the root directory
    ///
    /// Searches in this order:
    /// 1. `sprig.toml`
    /// 2. `package.json` with a non-null `sprig` field
    pub fn find(&self) -> Option<PathBuf> {
        let toml_path = self.root.join(TOML_FILE);
        if toml_path.is_file() {
            return Some(toml_path);
        }

        let pkg_path = self.root.join(PACKAGE_JSON);
        let content = fs::read_to_string(&pkg_path).ok()?;
        let parsed = serde_json::from_str::<Value>(&content).ok()?;
        match parsed.get(PACKAGE_FIELD) {
            Some(value) if !value.is_null() => Some(pkg_path),
            _ => None,
        }
    }

    /// Load config from the discovered file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if no config file is found.
    pub fn load(&self) -> Result<SprigConfig> {
        let path = self.find().ok_or(ConfigError::NotFound)?;
        tracing::debug!(path = %path.display(), "loading sprig config");
        self.load_from(&path)
    }

    /// Load config with profile merging
    pub fn load_with_profile(&self, profile: &str) -> Result<SprigConfig> {
        self.load()?.materialize_profile(Some(profile))
    }

    /// Load config from a specific file path
    pub fn load_from(&self, path: &Path) -> Result<SprigConfig> {
        if path.file_name() == Some(std::ffi::OsStr::new(PACKAGE_JSON)) {
            return self.load_from_package_json(path);
        }

        let content = fs::read_to_string(path)?;

        let toml_val: toml::Value =
            toml::from_str(&content).map_err(|e| ConfigError::InvalidValue {
                field: TOML_FILE.to_string(),
                hint: Some(format!("invalid TOML syntax: {e}")),
            })?;

        let value = serde_json::to_value(toml_val).map_err(|e| ConfigError::InvalidValue {
            field: TOML_FILE.to_string(),
            hint: Some(format!("TOML to JSON conversion failed: {e}")),
        })?;

        SprigConfig::from_value(value)
    }

    fn load_from_package_json(&self, path: &Path) -> Result<SprigConfig> {
        let content = fs::read_to_string(path)?;

        let parsed: Value =
            serde_json::from_str(&content).map_err(|e| ConfigError::InvalidValue {
                field: PACKAGE_JSON.to_string(),
                hint: Some(format!("invalid JSON: {e}")),
            })?;

        match parsed.get(PACKAGE_FIELD) {
            Some(value) if !value.is_null() => SprigConfig::from_value(value.clone()),
            _ => Err(ConfigError::InvalidValue {
                field: PACKAGE_FIELD.to_string(),
                hint: Some("add a 'sprig' object to package.json".to_string()),
            }),
        }
    }
}

/// Discover and load config from the current directory
pub fn discover() -> Result<SprigConfig> {
    let root = std::env::current_dir()?;
    ConfigDiscovery::new(&root).load()
}

/// Discover and load config from the current directory with a profile applied
pub fn discover_with_profile(profile: &str) -> Result<SprigConfig> {
    let root = std::env::current_dir()?;
    ConfigDiscovery::new(&root).load_with_profile(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn find_returns_none_when_no_config() {
        let dir = TempDir::new().unwrap();
        let discovery = ConfigDiscovery::new(dir.path());
        assert!(discovery.find().is_none());
    }

    #[test]
    fn load_returns_not_found_when_no_config() {
        let dir = TempDir::new().unwrap();
        let result = ConfigDiscovery::new(dir.path()).load();
        assert!(matches!(result, Err(ConfigError::NotFound)));
    }

    #[test]
    fn package_json_without_field_is_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), r#"{ "name": "app" }"#).unwrap();
        assert!(ConfigDiscovery::new(dir.path()).find().is_none());
    }

    #[test]
    fn invalid_toml_reports_field() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("sprig.toml"), "[bundle\n").unwrap();

        let err = ConfigDiscovery::new(dir.path()).load().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "sprig.toml"));
    }
}
