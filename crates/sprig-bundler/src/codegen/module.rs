//! Per-module code generation.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use sprig_graph::{
    DeclarationKind, DestructuredProperty, EdgeCategory, EdgeIdx, ExportBinding, ExportResolution,
    GraphEdge, ImportedNames, InlineValue, Module, ModuleIdx, ModuleKind, Rewrite, SourceSpan,
    UseSite, UseSiteKind, property_access,
};

use super::edits::EditSet;
use super::{CodegenContext, CodegenError, GeneratedModule, RuntimeFeature, js_string};

/// Generate the factory body of one module.
///
/// # Panics
///
/// When a live reference names an export its module does not declare. The
/// build reports missing exports before code generation, so reaching this
/// means an earlier phase accepted an inconsistent graph.
pub fn generate_module(ctx: &CodegenContext, idx: ModuleIdx) -> Result<GeneratedModule, CodegenError> {
    let Some(module) = ctx.graph.module(idx) else {
        return Err(CodegenError::GraphIntegrity {
            module: sprig_graph::ModuleId::new_virtual(format!("#{}", idx.index())),
            message: "module index does not refer to a live module".to_string(),
        });
    };
    let is_async = ctx.chunks.is_async_module(&module.id);

    let (code, mut runtime) = match module.kind {
        ModuleKind::Json => (
            format!("module.exports = {};\n", module.source.trim()),
            BTreeSet::new(),
        ),
        ModuleKind::Asset => (
            format!("module.exports = {};\n", js_string(module.source.trim())),
            BTreeSet::new(),
        ),
        ModuleKind::Esm | ModuleKind::CommonJs => ModuleRenderer::new(ctx, idx, module).render()?,
    };

    runtime.insert(RuntimeFeature::Require);
    if is_async {
        runtime.insert(RuntimeFeature::AsyncModule);
    }

    Ok(GeneratedModule {
        id: module.id.clone(),
        code,
        runtime,
        is_async,
    })
}

/// Expression a use site is rewritten against.
#[derive(Debug, Clone)]
enum Base {
    /// Binding declared in the prologue.
    Import(String),
    /// Inline expression (CommonJS require, unresolved stub, eliminated target).
    Expr(String),
    /// Target was eliminated; no live reference may use it.
    Eliminated,
}

struct ModuleRenderer<'a> {
    ctx: &'a CodegenContext,
    idx: ModuleIdx,
    module: &'a Module,
    edits: EditSet,
    imports: Vec<String>,
    runtime: BTreeSet<RuntimeFeature>,
    bases: HashMap<EdgeIdx, Base>,
}

impl<'a> ModuleRenderer<'a> {
    fn new(ctx: &'a CodegenContext, idx: ModuleIdx, module: &'a Module) -> Self {
        Self {
            ctx,
            idx,
            module,
            edits: EditSet::new(),
            imports: Vec::new(),
            runtime: BTreeSet::new(),
            bases: HashMap::default(),
        }
    }

    fn render(mut self) -> Result<(String, BTreeSet<RuntimeFeature>), CodegenError> {
        let ctx = self.ctx;
        let edges: Vec<(EdgeIdx, &GraphEdge)> = ctx.graph.outgoing_edges(self.idx).collect();

        for (edge_idx, edge) in &edges {
            let base = match edge.edge.category {
                EdgeCategory::Esm => self.static_import(edge),
                EdgeCategory::CommonJs | EdgeCategory::Unknown => self.require_call(edge),
                EdgeCategory::Dynamic => {
                    self.dynamic_import(edge);
                    continue;
                }
                EdgeCategory::Weak => {
                    self.weak_import(edge);
                    continue;
                }
            };
            self.bases.insert(*edge_idx, base);
        }

        for (edge_idx, edge) in &edges {
            let Some(base) = self.bases.get(edge_idx).cloned() else {
                continue;
            };
            for site in &edge.edge.use_sites {
                self.use_site(edge, &base, site)?;
            }
        }

        let mut prologue = Vec::new();
        if self.module.kind == ModuleKind::Esm {
            prologue.push("__sprig_require__.r(exports);".to_string());
            self.runtime.insert(RuntimeFeature::MakeNamespace);
            if let Some(getters) = self.export_getters()? {
                prologue.push(getters);
            }
            self.export_declarations();
        }
        prologue.append(&mut self.imports);
        if self.module.kind == ModuleKind::Esm {
            prologue.extend(self.star_reexports());
        }

        let body = self.edits.apply(&self.module.source, &self.module.id)?;
        let mut code = String::with_capacity(body.len() + 64);
        for line in prologue {
            code.push_str(&line);
            code.push('\n');
        }
        code.push_str(&body);
        Ok((code, self.runtime))
    }

    fn target(&self, edge: &GraphEdge) -> Option<&'a Module> {
        let ctx: &'a CodegenContext = self.ctx;
        edge.target.module().and_then(|target| ctx.graph.module(target))
    }

    fn is_retained(&self, module: &Module) -> bool {
        self.ctx.usage.is_retained(&module.id)
    }

    /// `__sprig_require__("id")`, with namespace interop for non-ESM targets.
    fn require_expr(&mut self, target: &Module, interop: bool) -> String {
        let call = format!("__sprig_require__({})", js_string(target.id.as_str()));
        if interop && target.kind.needs_interop() {
            self.runtime.insert(RuntimeFeature::Interop);
            format!("__sprig_require__.i({call})")
        } else {
            call
        }
    }

    fn static_import(&mut self, edge: &GraphEdge) -> Base {
        if let Some(span) = edge.edge.span {
            self.edits.remove(span);
        }

        let Some(target) = self.target(edge) else {
            let name = self.next_import_name();
            self.imports
                .push(format!("var {name} = {};", missing_module(&edge.edge.specifier)));
            return Base::Import(name);
        };
        if !self.is_retained(target) {
            return Base::Eliminated;
        }

        let awaited = if self.ctx.chunks.is_async_module(&target.id) {
            "await "
        } else {
            ""
        };
        if edge.edge.imported == ImportedNames::SideEffectOnly {
            let call = self.require_expr(target, false);
            self.imports.push(format!("{awaited}{call};"));
            return Base::Eliminated;
        }

        let name = self.next_import_name();
        let call = self.require_expr(target, true);
        self.imports.push(format!("var {name} = {awaited}{call};"));
        Base::Import(name)
    }

    fn require_call(&mut self, edge: &GraphEdge) -> Base {
        let (expr, base) = match self.target(edge) {
            None => {
                let stub = missing_module(&edge.edge.specifier);
                (stub.clone(), Base::Expr(stub))
            }
            Some(target) if !self.is_retained(target) => ("{}".to_string(), Base::Eliminated),
            Some(target) => {
                let call = self.require_expr(target, false);
                (call.clone(), Base::Expr(call))
            }
        };

        if let Some(span) = edge.edge.span {
            let covered = edge
                .edge
                .use_sites
                .iter()
                .filter_map(|site| site.span)
                .any(|site| site.encloses(&span));
            if !covered {
                self.edits.replace(span, expr);
            }
        }
        base
    }

    fn dynamic_import(&mut self, edge: &GraphEdge) {
        let Some(span) = edge.edge.span else {
            return;
        };

        let expr = match self.target(edge) {
            None => rejected_import(&edge.edge.specifier),
            Some(target) if !self.is_retained(target) => "Promise.resolve({})".to_string(),
            Some(target) => {
                let id = js_string(target.id.as_str());
                let load = if target.kind.needs_interop() {
                    self.runtime.insert(RuntimeFeature::Interop);
                    format!("function () {{ return __sprig_require__.i(__sprig_require__({id})); }}")
                } else {
                    format!("__sprig_require__.bind(__sprig_require__, {id})")
                };

                let chunks = self.ctx.chunks.async_chunks_for(&target.id);
                let ready = match chunks {
                    [] => "Promise.resolve()".to_string(),
                    [single] => format!("__sprig_require__.e({})", js_string(single.as_str())),
                    many => {
                        let ids: Vec<String> = many.iter().map(|id| js_string(id.as_str())).collect();
                        format!("__sprig_require__.e([{}])", ids.join(", "))
                    }
                };
                if !chunks.is_empty() {
                    self.runtime.insert(RuntimeFeature::EnsureChunk);
                }
                format!("{ready}.then({load})")
            }
        };
        self.edits.replace(span, expr);
    }

    /// A weak import never loads a chunk. It settles with the target only if
    /// something else already brought the target into the module table.
    fn weak_import(&mut self, edge: &GraphEdge) {
        let Some(span) = edge.edge.span else {
            return;
        };

        let expr = match self.target(edge) {
            None => rejected_import(&edge.edge.specifier),
            Some(target) => {
                self.runtime.insert(RuntimeFeature::WeakRequire);
                let call = format!("__sprig_require__.w({})", js_string(target.id.as_str()));
                if target.kind.needs_interop() {
                    self.runtime.insert(RuntimeFeature::Interop);
                    format!("{call}.then(__sprig_require__.i)")
                } else {
                    call
                }
            }
        };
        self.edits.replace(span, expr);
    }

    fn use_site(&mut self, edge: &GraphEdge, base: &Base, site: &UseSite) -> Result<(), CodegenError> {
        let Some(span) = site.span else {
            return Ok(());
        };

        let text = match self.ctx.plan.rewrite(&self.module.id, site.id) {
            Rewrite::Inline { export, value } => {
                let literal = inlined(export, value);
                match self.swallowed_require(edge, base, span) {
                    Some(call) => format!("({call}, {literal})"),
                    None => literal,
                }
            }
            Rewrite::InlineDestructure {
                declaration,
                bindings,
            } => {
                let declarators: Vec<String> = bindings
                    .iter()
                    .map(|binding| format!("{} = {}", binding.local, inlined(&binding.export, &binding.value)))
                    .collect();
                let original = span.slice(&self.module.source).unwrap_or_default();
                let statement = format!(
                    "{} {}{}",
                    declaration.keyword(),
                    declarators.join(", "),
                    terminator(original)
                );
                match self.swallowed_require(edge, base, span) {
                    Some(call) => format!("{call};\n{statement}"),
                    None => statement,
                }
            }
            Rewrite::Keep => {
                let base = match base {
                    Base::Import(name) => name.clone(),
                    Base::Expr(expr) => expr.clone(),
                    Base::Eliminated => {
                        return Err(CodegenError::integrity(
                            &self.module.id,
                            format!(
                                "live use of '{}' whose target module was eliminated",
                                edge.edge.specifier
                            ),
                        ));
                    }
                };
                self.live_use(edge, &base, &site.kind, span)
            }
        };

        self.edits.replace(span, text);
        Ok(())
    }

    /// Require call replaced along with an inlined use site, when the
    /// required module still has to run for its side effects.
    fn swallowed_require(&self, edge: &GraphEdge, base: &Base, site: SourceSpan) -> Option<String> {
        let require = edge.edge.span?;
        if !site.encloses(&require) {
            return None;
        }
        let Base::Expr(call) = base else {
            return None;
        };
        let target = self.target(edge)?;
        target.side_effects.assumed().then(|| call.clone())
    }

    fn live_use(&self, edge: &GraphEdge, base: &str, kind: &UseSiteKind, span: SourceSpan) -> String {
        match kind {
            UseSiteKind::Reference { export } => {
                self.check_declared(edge, export);
                format!("{base}{}", property_access(export))
            }
            UseSiteKind::Destructure {
                declaration,
                properties,
            } => {
                let original = span.slice(&self.module.source).unwrap_or_default();
                destructure(*declaration, properties, base, terminator(original))
            }
            UseSiteKind::ComputedMember {
                export: Some(export),
            } => format!("{base}{}", property_access(export)),
            UseSiteKind::ComputedMember { export: None }
            | UseSiteKind::Eval
            | UseSiteKind::NamespaceEscape => base.to_string(),
        }
    }

    /// A named ESM import must name an export the target provides.
    fn check_declared(&self, edge: &GraphEdge, export: &str) {
        if edge.edge.category != EdgeCategory::Esm {
            return;
        }
        if !edge
            .edge
            .named_bindings()
            .iter()
            .any(|binding| binding.imported == export)
        {
            return;
        }
        let Some(target) = edge.target.module() else {
            return;
        };
        if let ExportResolution::Missing { module } = self.ctx.graph.resolve_export(target, export) {
            let owner = self
                .ctx
                .graph
                .module(module)
                .map(|module| module.id.to_string())
                .unwrap_or_default();
            panic!(
                "{} keeps a live reference to '{export}', which {owner} does not export",
                self.module.id
            );
        }
    }

    fn next_import_name(&self) -> String {
        format!("__sprig_import_{}__", self.imports.len())
    }

    /// `__sprig_require__.d(exports, { ... })` for every live export that is
    /// still referenced at runtime.
    fn export_getters(&mut self) -> Result<Option<String>, CodegenError> {
        let ctx = self.ctx;
        let id = &self.module.id;

        let mut exports: Vec<_> = self
            .module
            .exports
            .iter()
            .filter(|export| ctx.usage.export_state(id, &export.name).is_live())
            .filter(|export| !ctx.plan.is_fully_inlined(id, &export.name))
            .collect();
        exports.sort_by(|a, b| a.name.cmp(&b.name));

        if exports.is_empty() {
            return Ok(None);
        }

        let mut getters = Vec::with_capacity(exports.len());
        for export in exports {
            let value = match &export.binding {
                ExportBinding::Local { local, .. } => local.clone(),
                ExportBinding::ReExport { specifier, imported } => {
                    format!("{}{}", self.reexport_base(specifier)?, property_access(imported))
                }
                ExportBinding::Namespace { specifier } => self.reexport_base(specifier)?,
            };
            getters.push(format!(
                "  {}: function () {{ return {value}; }},",
                js_string(&export.name)
            ));
        }

        self.runtime.insert(RuntimeFeature::DefineGetters);
        Ok(Some(format!(
            "__sprig_require__.d(exports, {{\n{}\n}});",
            getters.join("\n")
        )))
    }

    /// Import binding backing a re-export of `specifier`.
    fn reexport_base(&self, specifier: &str) -> Result<String, CodegenError> {
        let graph = &self.ctx.graph;
        let edge_idx = graph
            .reexport_edge(self.idx, specifier)
            .map(|(edge_idx, _)| edge_idx)
            .or_else(|| {
                graph
                    .outgoing_edges(self.idx)
                    .find(|(edge_idx, edge)| {
                        edge.edge.specifier == specifier
                            && matches!(self.bases.get(edge_idx), Some(Base::Import(_)))
                    })
                    .map(|(edge_idx, _)| edge_idx)
            });

        match edge_idx.and_then(|edge_idx| self.bases.get(&edge_idx)) {
            Some(Base::Import(name)) => Ok(name.clone()),
            _ => Err(CodegenError::integrity(
                &self.module.id,
                format!("live re-export from '{specifier}' has no import to read from"),
            )),
        }
    }

    /// Strip `export` keywords and drop declarations nothing reads.
    fn export_declarations(&mut self) {
        let ctx = self.ctx;
        let id = &self.module.id;
        let has_getter = |name: &str| {
            ctx.usage.export_state(id, name).is_live() && !ctx.plan.is_fully_inlined(id, name)
        };

        // Locals still read by a getter, under their own name or an alias.
        let read_by_getters: HashSet<&str> = self
            .module
            .exports
            .iter()
            .filter(|export| has_getter(&export.name))
            .filter_map(|export| match &export.binding {
                ExportBinding::Local { local, .. } => Some(local.as_str()),
                _ => None,
            })
            .collect();

        for export in self.module.exports.iter() {
            let ExportBinding::Local { local, .. } = &export.binding else {
                continue;
            };

            if !read_by_getters.contains(local.as_str()) && export.is_removable_when_unused() {
                if let Some(declaration) = export.declaration {
                    self.edits.remove(declaration);
                }
                continue;
            }

            if let Some(keyword) = export.keyword {
                if keyword.default_expression {
                    self.edits.replace(keyword.span, format!("var {local} = "));
                } else {
                    self.edits.remove(keyword.span);
                }
            }
        }
    }

    fn star_reexports(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        for specifier in &self.module.star_reexports {
            let Some((edge_idx, _)) = self.ctx.graph.reexport_edge(self.idx, specifier) else {
                continue;
            };
            if let Some(Base::Import(name)) = self.bases.get(&edge_idx) {
                lines.push(format!("__sprig_require__.s(exports, {name});"));
                self.runtime.insert(RuntimeFeature::ExportStar);
            }
        }
        lines
    }
}

/// `/* inlined export .NAME */<literal>`.
fn inlined(export: &str, value: &InlineValue) -> String {
    format!("/* inlined export {} */{}", property_access(export), value.to_js())
}

fn destructure(
    declaration: DeclarationKind,
    properties: &[DestructuredProperty],
    base: &str,
    terminator: &str,
) -> String {
    let pattern: Vec<String> = properties
        .iter()
        .map(|property| {
            if property.export == property.local {
                property.local.clone()
            } else {
                format!("{}: {}", pattern_key(&property.export), property.local)
            }
        })
        .collect();
    format!(
        "{} {{ {} }} = {base}{terminator}",
        declaration.keyword(),
        pattern.join(", ")
    )
}

fn pattern_key(name: &str) -> String {
    let access = property_access(name);
    match access.strip_prefix('.') {
        Some(identifier) => identifier.to_string(),
        None => access,
    }
}

/// Keep the statement terminator of the replaced declaration.
fn terminator(original: &str) -> &'static str {
    if original.trim_end().ends_with(';') {
        ";"
    } else {
        ""
    }
}

/// Promise rejected with the module-not-found error.
fn rejected_import(specifier: &str) -> String {
    format!(
        "Promise.reject(Object.assign(new Error({}), {{ code: \"MODULE_NOT_FOUND\" }}))",
        js_string(&format!("Cannot find module '{specifier}'"))
    )
}

/// Expression that throws the module-not-found error when evaluated.
fn missing_module(specifier: &str) -> String {
    format!(
        "(function () {{ throw Object.assign(new Error({}), {{ code: \"MODULE_NOT_FOUND\" }}); }})()",
        js_string(&format!("Cannot find module '{specifier}'"))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inlined_values_carry_a_marker() {
        assert_eq!(inlined("CONST_A", &InlineValue::Number(1.0)), "/* inlined export .CONST_A */1");
        assert_eq!(
            inlined("my-key", &InlineValue::Bool(true)),
            "/* inlined export [\"my-key\"] */true"
        );
    }

    #[test]
    fn destructure_renames_and_quotes_keys() {
        let properties = vec![
            DestructuredProperty::new("CONST_A", "CONST_A"),
            DestructuredProperty::new("LIVE_B", "b"),
            DestructuredProperty::new("my-key", "k"),
        ];
        assert_eq!(
            destructure(DeclarationKind::Const, &properties, "m", ";"),
            "const { CONST_A, LIVE_B: b, [\"my-key\"]: k } = m;"
        );
    }

    #[test]
    fn missing_module_stub_throws() {
        let stub = missing_module("./nope");
        assert!(stub.contains("Cannot find module './nope'"));
        assert!(stub.contains("MODULE_NOT_FOUND"));
    }
}
