use super::{Fixture, id};
use crate::{
    DependencyEdge, EdgeCategory, Export, ImportedNames, InlineValue, ModuleContent, ModuleKind,
    RetainReason, UsageAnalyzer, UsageState, UseSite, UseSiteKind,
};

fn esm(source: &str) -> crate::ModuleContentBuilder {
    ModuleContent::builder(ModuleKind::Esm, source)
}

#[test]
fn reexport_chain_marks_origin_used() {
    let mut fx = Fixture::new(&["/entry.js", "/b.js", "/a.js"]);
    fx.load(
        "/entry.js",
        esm("import { x } from './b'; console.log(x);")
            .dependency(DependencyEdge::esm_named("./b", ["x"]).with_use_site(UseSite::reference(0, "x")))
            .build(),
    );
    fx.load(
        "/b.js",
        esm("export { x } from './a';")
            .export(Export::re_export("x", "./a", "x"))
            .dependency(DependencyEdge::re_export("./a"))
            .side_effects(false)
            .build(),
    );
    fx.load(
        "/a.js",
        esm("export const x = 1; export const y = 2;")
            .export(Export::constant("x", InlineValue::Number(1.0)))
            .export(Export::constant("y", InlineValue::Number(2.0)))
            .side_effects(false)
            .build(),
    );

    let usage = fx.usage(&["/entry.js"]);

    assert!(usage.is_retained(&id("/a.js")), "origin of a re-export must be kept");
    assert_eq!(usage.export_state(&id("/a.js"), "x"), UsageState::Used);
    assert_eq!(usage.export_state(&id("/a.js"), "y"), UsageState::Unused);
    assert_eq!(usage.export_state(&id("/b.js"), "x"), UsageState::Used);
    assert_eq!(
        usage.get(&id("/a.js")).unwrap().reason,
        Some(RetainReason::UsedExports)
    );
}

#[test]
fn side_effect_free_module_without_used_exports_is_dropped() {
    let mut fx = Fixture::new(&["/entry.js", "/dead.js"]);
    fx.load(
        "/entry.js",
        esm("import { unused } from './dead';")
            .dependency(DependencyEdge::side_effect("./dead"))
            .build(),
    );
    fx.load(
        "/dead.js",
        esm("export const unused = 1;")
            .export(Export::constant("unused", InlineValue::Number(1.0)))
            .side_effects(false)
            .build(),
    );

    let usage = fx.usage(&["/entry.js"]);
    let dead = usage.get(&id("/dead.js")).unwrap();
    assert!(!dead.retained);
    assert_eq!(dead.reason, None);
    assert_eq!(usage.retained_modules().count(), 1);
}

#[test]
fn side_effects_retain_module_without_used_exports() {
    let mut fx = Fixture::new(&["/entry.js", "/polyfill.js", "/undeclared.js"]);
    fx.load(
        "/entry.js",
        esm("import './polyfill'; import './undeclared';")
            .dependency(DependencyEdge::side_effect("./polyfill"))
            .dependency(DependencyEdge::side_effect("./undeclared"))
            .build(),
    );
    fx.load(
        "/polyfill.js",
        esm("globalThis.patched = true; export const version = 1;")
            .export(Export::constant("version", InlineValue::Number(1.0)))
            .side_effects(true)
            .build(),
    );
    fx.load("/undeclared.js", esm("init();").build());

    let usage = fx.usage(&["/entry.js"]);

    for path in ["/polyfill.js", "/undeclared.js"] {
        let module = usage.get(&id(path)).unwrap();
        assert!(module.retained, "{path} must be retained");
        assert_eq!(module.reason, Some(RetainReason::SideEffects));
    }
    assert_eq!(usage.export_state(&id("/polyfill.js"), "version"), UsageState::Unused);
}

#[test]
fn critical_edge_retains_pure_module() {
    let mut fx = Fixture::new(&["/entry.js", "/pure.js"]);
    fx.load(
        "/entry.js",
        esm("import './pure';")
            .dependency(DependencyEdge::side_effect("./pure").critical())
            .build(),
    );
    fx.load("/pure.js", esm("").side_effects(false).build());

    let usage = fx.usage(&["/entry.js"]);
    assert_eq!(
        usage.get(&id("/pure.js")).unwrap().reason,
        Some(RetainReason::Critical)
    );
}

#[test]
fn namespace_imports_are_precise_only_for_static_sites() {
    let mut fx = Fixture::new(&["/entry.js", "/static.js", "/escaped.js"]);
    fx.load(
        "/entry.js",
        esm("import * as s from './static'; import * as e from './escaped'; s.a; leak(e);")
            .dependency(
                DependencyEdge::esm_namespace("./static")
                    .with_use_site(UseSite::reference(0, "a")),
            )
            .dependency(
                DependencyEdge::esm_namespace("./escaped")
                    .with_use_site(UseSite::new(1, UseSiteKind::NamespaceEscape)),
            )
            .build(),
    );
    for path in ["/static.js", "/escaped.js"] {
        fx.load(
            path,
            esm("export const a = 1; export const b = 2;")
                .export(Export::constant("a", InlineValue::Number(1.0)))
                .export(Export::constant("b", InlineValue::Number(2.0)))
                .side_effects(false)
                .build(),
        );
    }

    let usage = fx.usage(&["/entry.js"]);

    assert_eq!(usage.export_state(&id("/static.js"), "a"), UsageState::Used);
    assert_eq!(usage.export_state(&id("/static.js"), "b"), UsageState::Unused);
    assert_eq!(usage.export_state(&id("/escaped.js"), "a"), UsageState::Unknown);
    assert_eq!(usage.export_state(&id("/escaped.js"), "b"), UsageState::Unknown);
}

#[test]
fn unknown_category_edges_mark_everything_unknown() {
    let mut fx = Fixture::new(&["/entry.js", "/target.js"]);
    let mut edge = DependencyEdge::esm_named("./target", ["a"]);
    edge.category = EdgeCategory::Unknown;
    fx.load("/entry.js", esm("").dependency(edge).build());
    fx.load(
        "/target.js",
        esm("")
            .export(Export::local("a", "a"))
            .export(Export::local("b", "b"))
            .side_effects(false)
            .build(),
    );

    let usage = fx.usage(&["/entry.js"]);
    assert_eq!(usage.export_state(&id("/target.js"), "b"), UsageState::Unknown);
}

#[test]
fn star_reexports_forward_requested_names() {
    let mut fx = Fixture::new(&["/entry.js", "/barrel.js", "/impl.js", "/other.js"]);
    fx.load(
        "/entry.js",
        esm("import { helper } from './barrel';")
            .dependency(DependencyEdge::esm_named("./barrel", ["helper"]))
            .build(),
    );
    fx.load(
        "/barrel.js",
        esm("export * from './impl'; export * from './other';")
            .star_reexport("./impl")
            .dependency(DependencyEdge::re_export("./impl"))
            .star_reexport("./other")
            .dependency(DependencyEdge::re_export("./other"))
            .side_effects(false)
            .build(),
    );
    fx.load(
        "/impl.js",
        esm("")
            .export(Export::local("helper", "helper"))
            .export(Export::local("internal", "internal"))
            .side_effects(false)
            .build(),
    );
    fx.load(
        "/other.js",
        esm("").export(Export::local("unrelated", "unrelated")).side_effects(false).build(),
    );

    let usage = fx.usage(&["/entry.js"]);

    assert_eq!(usage.export_state(&id("/impl.js"), "helper"), UsageState::Used);
    assert_eq!(usage.export_state(&id("/impl.js"), "internal"), UsageState::Unused);
    assert!(usage.is_retained(&id("/barrel.js")));
    assert_eq!(
        usage.get(&id("/barrel.js")).unwrap().reason,
        Some(RetainReason::UsedExports)
    );
    assert!(!usage.is_retained(&id("/other.js")));
}

#[test]
fn dynamic_imports_treat_target_namespace_as_unknown() {
    let mut fx = Fixture::new(&["/entry.js", "/lazy.js"]);
    fx.load(
        "/entry.js",
        esm("import('./lazy');")
            .dependency(DependencyEdge::dynamic("./lazy"))
            .build(),
    );
    fx.load(
        "/lazy.js",
        esm("").export(Export::local("page", "page")).side_effects(false).build(),
    );

    let usage = fx.usage(&["/entry.js"]);
    assert_eq!(usage.export_state(&id("/lazy.js"), "page"), UsageState::Unknown);
}

#[test]
fn entries_expose_all_exports() {
    let mut fx = Fixture::new(&["/lib.js"]);
    fx.load(
        "/lib.js",
        esm("").export(Export::local("api", "api")).side_effects(false).build(),
    );

    let usage = fx.usage(&["/lib.js"]);
    assert_eq!(usage.export_state(&id("/lib.js"), "api"), UsageState::Used);
    assert_eq!(usage.get(&id("/lib.js")).unwrap().reason, Some(RetainReason::Entry));
    assert!(usage.is_entry(&id("/lib.js")));
}

#[test]
fn cycles_terminate_and_propagate() {
    let mut fx = Fixture::new(&["/a.js", "/b.js"]);
    fx.load(
        "/a.js",
        esm("")
            .export(Export::local("fromA", "fromA"))
            .dependency(DependencyEdge::esm_named("./b", ["fromB"]))
            .side_effects(false)
            .build(),
    );
    fx.load(
        "/b.js",
        esm("")
            .export(Export::local("fromB", "fromB"))
            .export(Export::local("spare", "spare"))
            .dependency(DependencyEdge::esm_named("./a", ["fromA"]))
            .side_effects(false)
            .build(),
    );

    let usage = fx.usage(&["/a.js"]);
    assert_eq!(usage.export_state(&id("/b.js"), "fromB"), UsageState::Used);
    assert_eq!(usage.export_state(&id("/b.js"), "spare"), UsageState::Unused);
    assert_eq!(usage.export_state(&id("/a.js"), "fromA"), UsageState::Used);
}

#[test]
fn pending_modules_have_unknown_exports() {
    let mut fx = Fixture::new(&["/entry.js", "/pending.js"]);
    fx.load(
        "/entry.js",
        esm("").dependency(DependencyEdge::esm_named("./pending", ["x"])).build(),
    );

    let usage = fx.usage(&["/entry.js"]);
    let pending = usage.get(&id("/pending.js")).unwrap();
    assert!(pending.retained);
    assert!(pending.exports_unknown);
    assert_eq!(pending.state("anything"), UsageState::Unknown);
}

#[test]
fn disabled_tree_shaking_keeps_everything_reachable() {
    let mut fx = Fixture::new(&["/entry.js", "/dead.js"]);
    fx.load(
        "/entry.js",
        esm("").dependency(DependencyEdge::side_effect("./dead")).build(),
    );
    fx.load(
        "/dead.js",
        esm("").export(Export::local("x", "x")).side_effects(false).build(),
    );

    let entries = [id("/entry.js")];
    let usage = UsageAnalyzer::new(&fx.graph)
        .tree_shake(false)
        .analyze(&entries)
        .unwrap();

    assert!(!usage.is_tree_shaken());
    assert!(usage.is_retained(&id("/dead.js")));
    assert_eq!(usage.export_state(&id("/dead.js"), "x"), UsageState::Unknown);
}

#[test]
fn unknown_entry_is_an_error() {
    let fx = Fixture::new(&[]);
    let result = UsageAnalyzer::new(&fx.graph).analyze(&[id("/missing.js")]);
    assert!(matches!(result, Err(crate::GraphError::UnknownModule(_))));
}

#[test]
fn commonjs_destructure_marks_named_exports() {
    let mut fx = Fixture::new(&["/entry.js", "/lib.js"]);
    fx.load(
        "/entry.js",
        ModuleContent::builder(ModuleKind::CommonJs, "const { a } = require('./lib');")
            .dependency(
                DependencyEdge::require("./lib").with_use_site(UseSite::new(
                    0,
                    UseSiteKind::Destructure {
                        declaration: crate::DeclarationKind::Const,
                        properties: vec![crate::DestructuredProperty::new("a", "a")],
                    },
                )),
            )
            .build(),
    );
    fx.load(
        "/lib.js",
        esm("")
            .export(Export::local("a", "a"))
            .export(Export::local("b", "b"))
            .side_effects(false)
            .build(),
    );

    let usage = fx.usage(&["/entry.js"]);
    assert_eq!(usage.export_state(&id("/lib.js"), "a"), UsageState::Used);
    assert_eq!(usage.export_state(&id("/lib.js"), "b"), UsageState::Unused);

    let edge = fx
        .graph
        .outgoing_edges(fx.graph.index_of(&id("/entry.js")).unwrap())
        .next()
        .unwrap()
        .1;
    assert_eq!(edge.edge.imported, ImportedNames::Namespace);
}
