//! Change detection for incremental builds.
//!
//! Detects which modules have changed between builds by comparing hashes of
//! their loader output.

use blake3::Hasher;
use rustc_hash::FxHashMap as HashMap;
use sprig_graph::{ModuleContent, ModuleId};

/// BLAKE3 digest of one module's loader output.
pub type ContentHash = [u8; 32];

/// Tracks module content hashes for change detection.
///
/// The compiler records the hash of every module it loads. On the next
/// build a module whose loader output hashes the same is reused as-is; the
/// graph is only touched for modules that actually changed.
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    /// BLAKE3 hashes of loader output, indexed by ModuleId.
    pub module_hashes: HashMap<ModuleId, ContentHash>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash everything the loader produced for a module.
    ///
    /// Exports and dependencies are hashed through their `Debug` rendering,
    /// which is deterministic for these types.
    pub fn hash_content(content: &ModuleContent) -> ContentHash {
        let mut hasher = Hasher::new();
        for field in [
            content.kind.as_str().to_string(),
            content.source.to_string(),
            format!("{:?}", content.exports),
            format!("{:?}", content.star_reexports),
            format!("{:?}", content.dependencies),
            format!("{:?}", content.side_effects),
            content.top_level_await.to_string(),
        ] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        *hasher.finalize().as_bytes()
    }

    /// True if `hash` differs from the recorded hash, or nothing is recorded.
    pub fn has_changed(&self, id: &ModuleId, hash: &ContentHash) -> bool {
        self.module_hashes.get(id) != Some(hash)
    }

    pub fn record(&mut self, id: ModuleId, hash: ContentHash) {
        self.module_hashes.insert(id, hash);
    }

    pub fn forget(&mut self, id: &ModuleId) {
        self.module_hashes.remove(id);
    }
}
