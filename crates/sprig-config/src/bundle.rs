//! Bundle configuration types.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_min_chunks() -> usize {
    2
}

fn default_max_generations() -> u64 {
    4
}

/// Main bundle configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleOptions {
    /// Named entry points. The name becomes the entry chunk's name; order is
    /// preserved from the config file.
    #[serde(default)]
    pub entries: IndexMap<String, PathBuf>,

    /// Output directory handed to the output writer
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Remove unused exports and modules. When disabled every reachable
    /// export is treated as `Unknown`.
    #[serde(default = "default_true")]
    pub tree_shake: bool,

    /// Substitute constant exports at their use sites
    #[serde(default = "default_true")]
    pub inline_exports: bool,

    /// How dynamically imported modules are grouped into chunks
    #[serde(default)]
    pub split_chunks: SplitChunksOptions,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
            output_dir: default_output_dir(),
            tree_shake: true,
            inline_exports: true,
            split_chunks: SplitChunksOptions::default(),
        }
    }
}

impl BundleOptions {
    /// Add an entry point, replacing any entry with the same name.
    pub fn with_entry(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.entries.insert(name.into(), path.into());
        self
    }

    /// Stable text covering every option that changes generated code.
    ///
    /// Mixed into module etags so that toggling one of these options
    /// invalidates cached code generation. The output directory is not part
    /// of it.
    pub fn options_fingerprint(&self) -> String {
        let split = match self.split_chunks.policy {
            SplitPolicyKind::PerDynamicImport => "per-dynamic-import".to_string(),
            SplitPolicyKind::ShareCommonModules => {
                format!("share-common-modules:{}", self.split_chunks.min_chunks)
            }
        };
        format!(
            "tree_shake={};inline_exports={};split_chunks={}",
            self.tree_shake, self.inline_exports, split
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SplitPolicyKind {
    /// One async chunk per dynamic import target
    #[default]
    PerDynamicImport,
    /// Modules shared by several async chunks move into a common chunk
    ShareCommonModules,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitChunksOptions {
    #[serde(default)]
    pub policy: SplitPolicyKind,

    /// Minimum number of async chunks a module must appear in before
    /// `share-common-modules` extracts it.
    #[serde(default = "default_min_chunks")]
    pub min_chunks: usize,
}

impl Default for SplitChunksOptions {
    fn default() -> Self {
        Self {
            policy: SplitPolicyKind::default(),
            min_chunks: default_min_chunks(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOptions {
    /// Enable the build cache
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory for the persistent cache file. In-memory only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Entries untouched for this many builds are garbage collected
    #[serde(default = "default_max_generations")]
    pub max_generations: u64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            max_generations: default_max_generations(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_optimizations() {
        let options = BundleOptions::default();
        assert!(options.tree_shake);
        assert!(options.inline_exports);
        assert_eq!(options.split_chunks.policy, SplitPolicyKind::PerDynamicImport);
        assert_eq!(options.output_dir, PathBuf::from("dist"));
    }

    #[test]
    fn fingerprint_tracks_codegen_options_only() {
        let base = BundleOptions::default().with_entry("main", "src/main.js");

        let mut moved = base.clone();
        moved.output_dir = PathBuf::from("out");
        assert_eq!(base.options_fingerprint(), moved.options_fingerprint());

        let mut no_inline = base.clone();
        no_inline.inline_exports = false;
        assert_ne!(base.options_fingerprint(), no_inline.options_fingerprint());
    }

    #[test]
    fn split_policy_uses_kebab_case() {
        let options: SplitChunksOptions =
            serde_json::from_str(r#"{ "policy": "share-common-modules", "min_chunks": 3 }"#)
                .unwrap();
        assert_eq!(options.policy, SplitPolicyKind::ShareCommonModules);
        assert_eq!(options.min_chunks, 3);
    }
}
