//! Pluggable config validation strategies
//!
//! Schema validation needs nothing but the config value; filesystem
//! validation additionally checks that entries exist on disk.

use std::path::{Path, PathBuf};

use crate::bundle::{BundleOptions, SplitPolicyKind};
use crate::config::SprigConfig;
use crate::error::{ConfigError, Result};

/// Trait for pluggable config validation strategies
pub trait ConfigValidator {
    fn validate(&self, config: &SprigConfig) -> Result<()>;
}

/// Schema-only validation (no filesystem checks)
///
/// # Example
///
/// ```
/// use sprig_config::{ConfigValidator, SchemaValidator, SprigConfig};
///
/// let mut config = SprigConfig::default();
/// config.bundle.entries.insert("main".into(), "src/main.js".into());
///
/// SchemaValidator.validate(&config).unwrap();
/// ```
pub struct SchemaValidator;

impl ConfigValidator for SchemaValidator {
    fn validate(&self, config: &SprigConfig) -> Result<()> {
        validate_bundle(&config.bundle)?;

        if config.cache.enabled && config.cache.max_generations == 0 {
            return Err(ConfigError::SchemaValidation {
                message: "cache.max_generations must be at least 1".to_string(),
                hint: Some("disable the cache with cache.enabled = false instead".to_string()),
            });
        }

        if config.settings.parallel_jobs == Some(0) {
            return Err(ConfigError::SchemaValidation {
                message: "settings.parallel_jobs cannot be 0".to_string(),
                hint: Some("omit the field to use every available core".to_string()),
            });
        }

        Ok(())
    }
}

fn validate_bundle(bundle: &BundleOptions) -> Result<()> {
    if bundle.entries.is_empty() {
        return Err(ConfigError::NoEntries);
    }

    for (name, path) in &bundle.entries {
        if name.trim().is_empty() {
            return Err(ConfigError::SchemaValidation {
                message: "entry names cannot be empty".to_string(),
                hint: Some(format!("give the entry for {} a name", path.display())),
            });
        }
        if path.as_os_str().is_empty() {
            return Err(ConfigError::SchemaValidation {
                message: format!("entry '{name}' has an empty path"),
                hint: None,
            });
        }
    }

    if bundle.split_chunks.policy == SplitPolicyKind::ShareCommonModules
        && bundle.split_chunks.min_chunks < 2
    {
        return Err(ConfigError::SchemaValidation {
            message: format!(
                "split_chunks.min_chunks must be at least 2, got {}",
                bundle.split_chunks.min_chunks
            ),
            hint: Some("a module in a single async chunk is never shared".to_string()),
        });
    }

    Ok(())
}

/// Filesystem validator
///
/// Runs schema validation first, then checks that every entry exists under
/// `root` and that a configured cache directory is not a regular file.
pub struct FsValidator {
    root: PathBuf,
}

impl FsValidator {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl ConfigValidator for FsValidator {
    fn validate(&self, config: &SprigConfig) -> Result<()> {
        SchemaValidator.validate(config)?;

        for (name, entry) in &config.bundle.entries {
            let path = self.root.join(entry);
            if !path.is_file() {
                return Err(ConfigError::EntryNotFound {
                    name: name.clone(),
                    path,
                });
            }
        }

        if let Some(dir) = &config.cache.dir {
            let path = self.root.join(dir);
            if path.exists() && !path.is_dir() {
                return Err(ConfigError::CacheDirInvalid { path });
            }
        }

        Ok(())
    }
}

/// Convenience function for schema-only validation
pub fn validate_schema(config: &SprigConfig) -> Result<()> {
    SchemaValidator.validate(config)
}

/// Convenience function for filesystem validation
pub fn validate_fs(config: &SprigConfig, root: impl AsRef<Path>) -> Result<()> {
    FsValidator::new(root).validate(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_entry() -> SprigConfig {
        let mut config = SprigConfig::default();
        config.bundle.entries.insert("main".into(), "src/main.js".into());
        config
    }

    #[test]
    fn rejects_empty_entries() {
        let result = validate_schema(&SprigConfig::default());
        assert!(matches!(result, Err(ConfigError::NoEntries)));
    }

    #[test]
    fn accepts_minimal_config() {
        assert!(validate_schema(&with_entry()).is_ok());
    }

    #[test]
    fn rejects_single_chunk_sharing() {
        let mut config = with_entry();
        config.bundle.split_chunks.policy = SplitPolicyKind::ShareCommonModules;
        config.bundle.split_chunks.min_chunks = 1;
        assert!(matches!(
            validate_schema(&config),
            Err(ConfigError::SchemaValidation { .. })
        ));
    }

    #[test]
    fn min_chunks_is_ignored_without_sharing() {
        let mut config = with_entry();
        config.bundle.split_chunks.min_chunks = 0;
        assert!(validate_schema(&config).is_ok());
    }

    #[test]
    fn rejects_zero_parallel_jobs() {
        let mut config = with_entry();
        config.settings.parallel_jobs = Some(0);
        assert!(validate_schema(&config).is_err());
    }
}
