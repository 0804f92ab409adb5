use std::collections::{BTreeMap, BTreeSet, VecDeque};

use sprig_graph::{EdgeCategory, GraphEdge, ModuleGraph, ModuleId, ModuleIdx, SourceSpan, UsageMap};

use super::{Chunk, ChunkError, ChunkGroup, ChunkId, ChunkKind, ChunkSet, SplitPolicy};

/// A synchronous `require` of a module that can only load asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub importer: ModuleId,
    pub module: ModuleId,
    /// Location of the `require` call in the importer.
    pub span: Option<SourceSpan>,
}

/// Assigns retained modules to chunks.
///
/// Every entry gets a chunk holding its synchronous closure. Every retained
/// target of a dynamic or weak edge becomes an async root; its chunk holds
/// its synchronous closure minus the modules already loaded by every group
/// that imports it. The split policy then redistributes the async groups.
pub struct ChunkAssembler<'a> {
    graph: &'a ModuleGraph,
    usage: &'a UsageMap,
    policy: &'a dyn SplitPolicy,
}

impl<'a> ChunkAssembler<'a> {
    pub fn new(graph: &'a ModuleGraph, usage: &'a UsageMap, policy: &'a dyn SplitPolicy) -> Self {
        Self {
            graph,
            usage,
            policy,
        }
    }

    fn retained_target(&self, edge: &GraphEdge) -> Option<&'a ModuleId> {
        let graph = self.graph;
        let module = edge.target.module().and_then(|target| graph.module(target))?;
        self.usage.is_retained(&module.id).then_some(&module.id)
    }

    fn sync_closure(&self, root: ModuleIdx) -> BTreeSet<ModuleId> {
        self.graph
            .reachable_via(&[root], |edge| {
                edge.edge.category.is_sync() && self.retained_target(edge).is_some()
            })
            .into_iter()
            .filter_map(|idx| self.graph.module(idx))
            .map(|module| module.id.clone())
            .collect()
    }

    /// Retained modules that must be evaluated asynchronously: those using
    /// top-level await and, transitively, those importing one through ESM.
    pub fn async_modules(&self) -> BTreeSet<ModuleId> {
        let modules = self.graph.modules_sorted();
        let mut async_modules: BTreeSet<ModuleId> = modules
            .iter()
            .filter(|(_, module)| module.top_level_await && self.usage.is_retained(&module.id))
            .map(|(_, module)| module.id.clone())
            .collect();

        loop {
            let mut changed = false;
            for (idx, module) in &modules {
                if !self.usage.is_retained(&module.id) || async_modules.contains(&module.id) {
                    continue;
                }
                let imports_async = self.graph.outgoing_edges(*idx).any(|(_, edge)| {
                    edge.edge.category == EdgeCategory::Esm
                        && self
                            .retained_target(edge)
                            .is_some_and(|target| async_modules.contains(target))
                });
                if imports_async {
                    async_modules.insert(module.id.clone());
                    changed = true;
                }
            }
            if !changed {
                return async_modules;
            }
        }
    }

    /// Every CommonJS require of an async module, sorted by importer.
    pub fn conflicts(&self) -> Vec<Conflict> {
        self.conflicts_with(&self.async_modules())
    }

    fn conflicts_with(&self, async_modules: &BTreeSet<ModuleId>) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        for (idx, module) in self.graph.modules_sorted() {
            if !self.usage.is_retained(&module.id) {
                continue;
            }
            for (_, edge) in self.graph.outgoing_edges(idx) {
                if edge.edge.category != EdgeCategory::CommonJs {
                    continue;
                }
                if let Some(target) = self.retained_target(edge) {
                    if async_modules.contains(target) {
                        conflicts.push(Conflict {
                            importer: module.id.clone(),
                            module: target.clone(),
                            span: edge.edge.span,
                        });
                    }
                }
            }
        }
        conflicts
    }

    /// Build the chunk set for the named entries.
    ///
    /// # Errors
    ///
    /// `ConflictingRequirements` for the first conflict found (see
    /// [`conflicts`](Self::conflicts) for all of them) and `MissingEntry`
    /// for an entry id not present in the graph.
    pub fn assemble(&self, entries: &[(String, ModuleId)]) -> Result<ChunkSet, ChunkError> {
        let async_modules = self.async_modules();
        if let Some(conflict) = self.conflicts_with(&async_modules).into_iter().next() {
            return Err(ChunkError::ConflictingRequirements {
                importer: conflict.importer,
                module: conflict.module,
            });
        }

        let mut closures: BTreeMap<ModuleId, BTreeSet<ModuleId>> = BTreeMap::new();
        let mut entry_groups = Vec::with_capacity(entries.len());
        let mut queue = VecDeque::new();

        for (name, module) in entries {
            let idx = self
                .graph
                .index_of(module)
                .ok_or_else(|| ChunkError::MissingEntry {
                    name: name.clone(),
                    module: module.clone(),
                })?;
            let closure = closures
                .entry(module.clone())
                .or_insert_with(|| self.sync_closure(idx))
                .clone();
            entry_groups.push(ChunkGroup::new(
                name.clone(),
                ChunkKind::Entry,
                vec![module.clone()],
                closure,
            ));
            queue.push_back(module.clone());
        }

        // Discover async roots and the groups importing each of them.
        let mut parents: BTreeMap<ModuleId, BTreeSet<ModuleId>> = BTreeMap::new();
        let mut hints: BTreeMap<ModuleId, String> = BTreeMap::new();
        let mut scanned: BTreeSet<ModuleId> = BTreeSet::new();

        while let Some(root) = queue.pop_front() {
            if !scanned.insert(root.clone()) {
                continue;
            }
            let members = closures.get(&root).cloned().unwrap_or_default();
            for member in &members {
                let Some(idx) = self.graph.index_of(member) else {
                    continue;
                };
                for (_, edge) in self.graph.outgoing_edges(idx) {
                    if !edge.edge.category.is_async() {
                        continue;
                    }
                    let Some(target) = self.retained_target(edge) else {
                        continue;
                    };
                    parents
                        .entry(target.clone())
                        .or_default()
                        .insert(root.clone());
                    if let Some(hint) = &edge.edge.chunk_name {
                        let current = hints.entry(target.clone()).or_insert_with(|| hint.clone());
                        if hint < current {
                            *current = hint.clone();
                        }
                    }
                    if !closures.contains_key(target) {
                        if let Some(target_idx) = edge.target.module() {
                            closures.insert(target.clone(), self.sync_closure(target_idx));
                        }
                    }
                    queue.push_back(target.clone());
                }
            }
        }

        // Trim every async closure by what all of its importers already load.
        let mut trimmed: BTreeMap<ModuleId, BTreeSet<ModuleId>> = BTreeMap::new();
        let mut async_groups = Vec::new();
        for (root, importers) in &parents {
            let mut available: Option<BTreeSet<ModuleId>> = None;
            for importer in importers {
                let loaded = closures.get(importer).cloned().unwrap_or_default();
                available = Some(match available {
                    None => loaded,
                    Some(acc) => acc.intersection(&loaded).cloned().collect(),
                });
            }
            let available = available.unwrap_or_default();
            let modules: BTreeSet<ModuleId> = closures
                .get(root)
                .map(|closure| closure.difference(&available).cloned().collect())
                .unwrap_or_default();

            if !modules.is_empty() {
                let name = hints
                    .get(root)
                    .cloned()
                    .unwrap_or_else(|| chunk_name_for(root));
                async_groups.push(ChunkGroup::new(
                    name,
                    ChunkKind::Async,
                    vec![root.clone()],
                    modules.clone(),
                ));
            }
            trimmed.insert(root.clone(), modules);
        }

        let mut groups = entry_groups;
        groups.extend(async_groups);
        let mut chunks: Vec<Chunk> = self
            .policy
            .split(groups)
            .into_iter()
            .map(Chunk::from_group)
            .collect();
        // Stable sort keeps entry chunks in entry order.
        chunks.sort_by(|a, b| match (a.is_entry(), b.is_entry()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            (false, false) => (a.kind, &a.name, &a.id).cmp(&(b.kind, &b.name, &b.id)),
        });

        let mut async_targets = BTreeMap::new();
        for (root, modules) in &trimmed {
            async_targets.insert(root.clone(), chunks_to_load(&chunks, root, modules));
        }

        tracing::debug!(
            chunks = chunks.len(),
            async_roots = trimmed.len(),
            async_modules = async_modules.len(),
            policy = self.policy.name(),
            "assembled chunks"
        );

        Ok(ChunkSet::new(
            chunks,
            async_targets,
            async_modules,
            self.policy.version(),
        ))
    }
}

/// The root's own chunk plus, for modules the policy moved elsewhere, the
/// chunk now holding each of them (shared chunks first, then lowest id).
fn chunks_to_load(chunks: &[Chunk], root: &ModuleId, modules: &BTreeSet<ModuleId>) -> Vec<ChunkId> {
    let own = chunks
        .iter()
        .find(|chunk| !chunk.is_entry() && chunk.roots.contains(root));

    let mut ids = BTreeSet::new();
    if let Some(own) = own {
        ids.insert(own.id.clone());
    }

    for module in modules {
        if own.is_some_and(|chunk| chunk.contains(module)) {
            continue;
        }
        let holder = chunks
            .iter()
            .filter(|chunk| !chunk.is_entry() && chunk.contains(module))
            .min_by(|a, b| {
                (a.kind != ChunkKind::Shared, &a.id).cmp(&(b.kind != ChunkKind::Shared, &b.id))
            });
        if let Some(holder) = holder {
            ids.insert(holder.id.clone());
        }
    }

    ids.into_iter().collect()
}

/// File stem of the module path, restricted to characters safe in a file name.
fn chunk_name_for(id: &ModuleId) -> String {
    let path = id.path();
    let file = path.rsplit('/').next().unwrap_or(path);
    let stem = file.split('.').next().unwrap_or(file);
    let name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() {
        "chunk".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_names_come_from_file_stems() {
        assert_eq!(chunk_name_for(&ModuleId::new("/src/pages/about.page.js").unwrap()), "about");
        assert_eq!(chunk_name_for(&ModuleId::new("/src/my lazy.js").unwrap()), "my_lazy");
    }
}
