//! Configuration for the sprig bundler.
//!
//! A [`SprigConfig`] can be built programmatically from a JSON value, or found
//! on disk by [`ConfigDiscovery`] in either `sprig.toml` or the `sprig` field
//! of `package.json`. Named profiles overlay the base configuration.

pub mod bundle;
pub mod config;
pub mod discovery;
pub mod error;
pub mod settings;
pub mod validation;

pub use bundle::{BundleOptions, CacheOptions, SplitChunksOptions, SplitPolicyKind};
pub use config::{ProfileConfig, SprigConfig};
pub use error::{ConfigError, Result};
pub use settings::GlobalSettings;

pub use discovery::{ConfigDiscovery, discover, discover_with_profile};
pub use validation::{ConfigValidator, FsValidator, SchemaValidator, validate_fs, validate_schema};
