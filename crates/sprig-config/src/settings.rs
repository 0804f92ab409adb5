//! Global configuration settings shared across profiles.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// `tracing` filter directive, e.g. `"info"` or `"sprig_bundler=debug"`.
    #[serde(default)]
    pub log_level: Option<String>,

    /// Upper bound on code generation worker threads.
    #[serde(default)]
    pub parallel_jobs: Option<usize>,
}
