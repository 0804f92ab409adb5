//! Construction methods for ModuleGraph.

use tracing::{debug, trace};

use super::super::{
    DependencyEdge, EdgeTarget, Export, GraphEdge, GraphError, Module, ModuleContent, ModuleId,
    ModuleStatus, ResolutionError, Resolver, Result,
};
use super::{EdgeIdx, ModuleGraph, ModuleIdx};

/// What happened when an edge was added.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeOutcome {
    pub edge: EdgeIdx,
    pub target: EdgeTarget,
    /// The target module did not exist before this edge was added.
    pub newly_discovered: bool,
    /// Set when the resolver failed; the edge is stored as `Unresolved`.
    pub resolution_error: Option<ResolutionError>,
}

impl ModuleGraph {
    /// Add a module, or return the existing index if `id` is already present.
    ///
    /// New modules start out `Pending` with `NotYetResolved` exports.
    pub fn add_module(&mut self, id: ModuleId) -> ModuleIdx {
        self.add_module_inner(id).0
    }

    fn add_module_inner(&mut self, id: ModuleId) -> (ModuleIdx, bool) {
        if let Some(idx) = self.ids.get(&id) {
            return (*idx, false);
        }

        trace!(module = %id, "discovered module");
        let idx = self.modules.push(Some(Module::pending(id.clone())));
        self.ids.insert(id, idx);
        (idx, true)
    }

    /// Apply loader output to a pending module: record its content, finalize
    /// its exports and add every declared dependency edge.
    ///
    /// Returns one [`EdgeOutcome`] per dependency in declaration order.
    pub fn set_module_content(
        &mut self,
        idx: ModuleIdx,
        content: ModuleContent,
        resolver: &dyn Resolver,
    ) -> Result<Vec<EdgeOutcome>> {
        let ModuleContent {
            kind,
            source,
            exports,
            star_reexports,
            dependencies,
            side_effects,
            top_level_await,
        } = content;

        {
            let module = self.module_mut(idx)?;
            if module.status == ModuleStatus::Loaded {
                return Err(GraphError::AlreadyLoaded(module.id.clone()));
            }

            module.kind = kind;
            module.source = source;
            module.star_reexports = star_reexports;
            module.side_effects = side_effects;
            module.top_level_await = top_level_await;
            module.status = ModuleStatus::Loaded;
        }

        for export in exports {
            self.add_export(idx, export)?;
        }
        self.finalize_exports(idx)?;

        let mut outcomes = Vec::with_capacity(dependencies.len());
        for edge in dependencies {
            outcomes.push(self.add_edge(idx, edge, resolver)?);
        }

        Ok(outcomes)
    }

    /// Add an edge from `from`, resolving its specifier through `resolver`.
    ///
    /// A resolver failure is not an error of this call: the edge is stored
    /// with target `Unresolved` and the failure is returned in the outcome so
    /// the caller can report it.
    pub fn add_edge(
        &mut self,
        from: ModuleIdx,
        edge: DependencyEdge,
        resolver: &dyn Resolver,
    ) -> Result<EdgeOutcome> {
        let importer = self.module_ref(from)?.id.clone();

        let (target, newly_discovered, resolution_error) =
            match resolver.resolve(&importer, &edge.specifier) {
                Ok(id) => {
                    let (idx, fresh) = self.add_module_inner(id);
                    (EdgeTarget::Resolved(idx), fresh, None)
                }
                Err(reason) => {
                    debug!(
                        importer = %importer,
                        specifier = %edge.specifier,
                        %reason,
                        "unresolved dependency"
                    );
                    let error = ResolutionError {
                        importer: importer.clone(),
                        specifier: edge.specifier.clone(),
                        span: edge.span,
                        reason,
                    };
                    (EdgeTarget::Unresolved, false, Some(error))
                }
            };

        let edge_idx = self.insert_edge(from, target, edge)?;

        Ok(EdgeOutcome {
            edge: edge_idx,
            target,
            newly_discovered,
            resolution_error,
        })
    }

    fn insert_edge(
        &mut self,
        from: ModuleIdx,
        target: EdgeTarget,
        edge: DependencyEdge,
    ) -> Result<EdgeIdx> {
        self.module_ref(from)?;

        let idx = self.edges.push(Some(GraphEdge { from, target, edge }));
        self.module_mut(from)?.outgoing.push(idx);
        if let EdgeTarget::Resolved(to) = target {
            self.module_mut(to)?.incoming.push(idx);
        }

        Ok(idx)
    }

    /// Append an export to a module.
    ///
    /// Once the list is finalized only new names may be added.
    pub fn add_export(&mut self, idx: ModuleIdx, export: Export) -> Result<()> {
        let module = self.module_mut(idx)?;
        let name = export.name.clone();
        if module.exports.insert(export) {
            Ok(())
        } else {
            Err(GraphError::ExportsFinalized {
                module: module.id.clone(),
                name,
            })
        }
    }

    /// Freeze the export list of a module for this build.
    pub fn finalize_exports(&mut self, idx: ModuleIdx) -> Result<()> {
        self.module_mut(idx)?.exports.finalize();
        Ok(())
    }
}
