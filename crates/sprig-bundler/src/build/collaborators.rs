//! Boundary traits the compiler calls out through.
//!
//! The core never reads or writes files on its own: module content comes
//! from a [`Loader`], resolution from a [`Resolver`](sprig_graph::Resolver)
//! and finished chunks go to an [`OutputWriter`].

use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap as HashMap;
use sprig_graph::{ModuleContent, ModuleId};

use super::ChunkOutput;

/// Produces the content of a module: source, declared exports, dependency
/// edges and side-effect flag.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, id: &ModuleId) -> anyhow::Result<ModuleContent>;
}

/// Loader over a fixed in-memory table. Entries can be replaced between
/// builds to simulate edits.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    modules: RwLock<HashMap<ModuleId, ModuleContent>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(self, id: ModuleId, content: ModuleContent) -> Self {
        self.insert(id, content);
        self
    }

    /// Add or replace a module, returning the previous content.
    pub fn insert(&self, id: ModuleId, content: ModuleContent) -> Option<ModuleContent> {
        self.modules.write().insert(id, content)
    }

    pub fn remove(&self, id: &ModuleId) -> Option<ModuleContent> {
        self.modules.write().remove(id)
    }

    pub fn ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = self.modules.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl Loader for MemoryLoader {
    async fn load(&self, id: &ModuleId) -> anyhow::Result<ModuleContent> {
        self.modules
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no content registered for {id}"))
    }
}

/// Receives every finished chunk of a build.
///
/// Chunks are written in chunk order, one at a time. The writer decides the
/// final location; [`ChunkOutput::file_name`] is the suggested name.
#[async_trait]
pub trait OutputWriter: Send + Sync {
    async fn write_chunk(&self, chunk: &ChunkOutput) -> io::Result<()>;
}

/// Keeps the code of every written chunk, keyed by file name.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    files: RwLock<BTreeMap<String, String>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> BTreeMap<String, String> {
        self.files.read().clone()
    }

    pub fn get(&self, file_name: &str) -> Option<String> {
        self.files.read().get(file_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

#[async_trait]
impl OutputWriter for MemoryWriter {
    async fn write_chunk(&self, chunk: &ChunkOutput) -> io::Result<()> {
        self.files
            .write()
            .insert(chunk.file_name.clone(), chunk.code.clone());
        Ok(())
    }
}

/// Writes chunks below an output directory.
///
/// Each file is written to a `.tmp` sibling first and renamed into place,
/// so readers never observe a half-written chunk.
#[derive(Debug, Clone)]
pub struct DirWriter {
    root: PathBuf,
}

impl DirWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join `file_name` onto the root, refusing anything that would leave it.
    fn target(&self, file_name: &str) -> io::Result<PathBuf> {
        let relative = Path::new(file_name);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
        if file_name.is_empty() || escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("chunk file name '{file_name}' escapes the output directory"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl OutputWriter for DirWriter {
    async fn write_chunk(&self, chunk: &ChunkOutput) -> io::Result<()> {
        let target = self.target(&chunk.file_name)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut temp = target.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        if let Err(err) = tokio::fs::write(&temp, chunk.code.as_bytes()).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(err);
        }
        tokio::fs::rename(&temp, &target).await
    }
}
