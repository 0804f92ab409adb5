//! Export resolution through re-export chains.

use rustc_hash::FxHashSet as HashSet;

use super::super::{Export, ExportBinding};
use super::{ModuleGraph, ModuleIdx};

/// Where an export name ultimately comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExportResolution<'a> {
    /// A local binding declared by `module`.
    Local {
        module: ModuleIdx,
        export: &'a Export,
    },
    /// `export * as name from` resolves to the namespace object of `module`.
    Namespace { module: ModuleIdx },
    /// The chain ends in a module with static exports that lacks the name.
    Missing { module: ModuleIdx },
    /// The chain passes through a pending module, a module with dynamic
    /// exports, an unresolved edge or a cycle.
    Unknown,
}

impl ModuleGraph {
    /// Follow `name` on `module` through re-exports and `export *` until a
    /// local binding is found.
    ///
    /// Re-export chains are followed to any depth; a cycle yields `Unknown`.
    /// `default` is never forwarded through `export *`. When several star
    /// targets provide the name, the first in source order wins.
    pub fn resolve_export(&self, module: ModuleIdx, name: &str) -> ExportResolution<'_> {
        let mut visited = HashSet::default();
        self.resolve_export_inner(module, name, &mut visited)
    }

    fn resolve_export_inner<'a>(
        &'a self,
        mut current: ModuleIdx,
        name: &str,
        visited: &mut HashSet<(ModuleIdx, String)>,
    ) -> ExportResolution<'a> {
        let mut name = name.to_string();

        loop {
            if !visited.insert((current, name.clone())) {
                return ExportResolution::Unknown;
            }

            let Some(module) = self.module(current) else {
                return ExportResolution::Unknown;
            };
            if !module.exports.is_finalized() {
                return ExportResolution::Unknown;
            }

            match module.exports.get(&name).map(|export| (export, &export.binding)) {
                Some((export, ExportBinding::Local { .. })) => {
                    return ExportResolution::Local {
                        module: current,
                        export,
                    };
                }
                Some((_, ExportBinding::ReExport { specifier, imported })) => {
                    let Some(target) = self.resolve_specifier(current, specifier) else {
                        return ExportResolution::Unknown;
                    };
                    current = target;
                    name = imported.clone();
                }
                Some((_, ExportBinding::Namespace { specifier })) => {
                    return match self.resolve_specifier(current, specifier) {
                        Some(target) => ExportResolution::Namespace { module: target },
                        None => ExportResolution::Unknown,
                    };
                }
                None => {
                    if name != "default" {
                        for specifier in &module.star_reexports {
                            let Some(target) = self.resolve_specifier(current, specifier) else {
                                return ExportResolution::Unknown;
                            };
                            match self.resolve_export_inner(target, &name, visited) {
                                ExportResolution::Missing { .. } => {}
                                found => return found,
                            }
                        }
                    }

                    return if module.kind.has_static_exports() {
                        ExportResolution::Missing { module: current }
                    } else {
                        ExportResolution::Unknown
                    };
                }
            }
        }
    }
}
