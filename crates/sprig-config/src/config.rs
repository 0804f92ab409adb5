//! Top-level configuration structure and profile merging.
//!
//! For file discovery, see the `discovery` module.

use std::collections::BTreeMap;

use figment::Figment;
use figment::providers::{Env, Serialized};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bundle::{BundleOptions, CacheOptions};
use crate::error::{ConfigError, Result as ConfigResult};
use crate::settings::GlobalSettings;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SprigConfig {
    #[serde(default)]
    pub bundle: BundleOptions,

    #[serde(default)]
    pub cache: CacheOptions,

    #[serde(default)]
    pub settings: GlobalSettings,

    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

/// Partial overrides applied on top of the base config by
/// [`SprigConfig::materialize_profile`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default)]
    pub bundle: Value,

    #[serde(default)]
    pub cache: Value,

    #[serde(default)]
    pub settings: Value,
}

impl SprigConfig {
    /// Create from serde_json::Value (for programmatic config)
    ///
    /// # Example
    ///
    /// ```
    /// use sprig_config::SprigConfig;
    /// use serde_json::json;
    /// use std::path::PathBuf;
    ///
    /// let value = json!({
    ///     "bundle": {
    ///         "entries": { "main": "src/main.js" },
    ///         "inline_exports": false
    ///     }
    /// });
    ///
    /// let config = SprigConfig::from_value(value).unwrap();
    /// assert_eq!(config.bundle.entries["main"], PathBuf::from("src/main.js"));
    /// assert!(!config.bundle.inline_exports);
    /// ```
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        serde_json::from_value(value).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: Some(e.to_string()),
        })
    }

    /// Convert to serde_json::Value
    pub fn to_value(&self) -> ConfigResult<Value> {
        serde_json::to_value(self).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: Some(e.to_string()),
        })
    }

    /// Apply the named profile's overrides. `None` returns the config as is.
    pub fn materialize_profile(mut self, profile: Option<&str>) -> ConfigResult<Self> {
        let Some(name) = profile else {
            return Ok(self);
        };
        let overrides = self
            .profiles
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))?;

        tracing::debug!(profile = name, "applying config profile");

        self.bundle = overlay(&self.bundle, &overrides.bundle)?;
        self.cache = overlay(&self.cache, &overrides.cache)?;
        self.settings = overlay(&self.settings, &overrides.settings)?;
        Ok(self)
    }

    /// Layer `PREFIX_SECTION__FIELD` environment variables over this config.
    ///
    /// `SPRIG_BUNDLE__TREE_SHAKE=false` with prefix `SPRIG_` sets
    /// `bundle.tree_shake`.
    pub fn with_env_overrides(mut self, prefix: &str) -> ConfigResult<Self> {
        let base = Sections {
            bundle: self.bundle,
            cache: self.cache,
            settings: self.settings,
        };
        let layered: Sections = Figment::new()
            .merge(Serialized::defaults(base))
            .merge(Env::prefixed(prefix).split("__"))
            .extract()
            .map_err(|e| ConfigError::InvalidValue {
                field: "environment".to_string(),
                hint: Some(e.to_string()),
            })?;

        self.bundle = layered.bundle;
        self.cache = layered.cache;
        self.settings = layered.settings;
        Ok(self)
    }
}

/// The overridable part of [`SprigConfig`]; profiles never come from the
/// environment.
#[derive(Serialize, Deserialize)]
struct Sections {
    bundle: BundleOptions,
    cache: CacheOptions,
    settings: GlobalSettings,
}

fn overlay<T>(base: &T, update: &Value) -> ConfigResult<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    if update.is_null() {
        return Ok(base.clone());
    }

    let mut merged = serde_json::to_value(base).map_err(|err| {
        ConfigError::InvalidProfileOverride {
            message: err.to_string(),
        }
    })?;
    merge_values(&mut merged, update);
    serde_json::from_value(merged).map_err(|err| ConfigError::InvalidProfileOverride {
        message: err.to_string(),
    })
}

fn merge_values(target: &mut Value, update: &Value) {
    match (target, update) {
        (Value::Object(target_map), Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_values(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target_slot, _) => {
            *target_slot = update.clone();
        }
    }
}
