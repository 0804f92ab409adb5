use super::{Fixture, id};
use crate::{
    DeclarationKind, DependencyEdge, DestructuredProperty, Export, InlineDecision,
    InlineValue, Inliner, ModuleContent, ModuleKind, Mutation, NotInlinable, Rewrite, UseSite,
    UseSiteId, UseSiteKind,
};

const PATHS: &[&str] = &["/entry.js", "/consts.js", "/cjs-consumer.js", "/esm-consumer.js"];

fn consts(side_effects: bool) -> ModuleContent {
    ModuleContent::builder(
        ModuleKind::Esm,
        "export const CONST_A = 1;\nexport const LIVE_B = computeAtRuntime();\n",
    )
    .export(Export::constant("CONST_A", InlineValue::Number(1.0)))
    .export(Export::local("LIVE_B", "LIVE_B"))
    .side_effects(side_effects)
    .build()
}

fn destructure_both() -> UseSite {
    UseSite::new(
        0,
        UseSiteKind::Destructure {
            declaration: DeclarationKind::Const,
            properties: vec![
                DestructuredProperty::new("CONST_A", "CONST_A"),
                DestructuredProperty::new("LIVE_B", "LIVE_B"),
            ],
        },
    )
}

/// Entry pulls in a CommonJS consumer that destructures both exports and an
/// ESM consumer that references `CONST_A` directly.
fn mixed_consumers(consts_side_effects: bool, extra_entry_edge: Option<DependencyEdge>) -> Fixture {
    let mut fx = Fixture::new(PATHS);

    let mut entry = ModuleContent::builder(ModuleKind::Esm, "")
        .dependency(DependencyEdge::side_effect("./cjs-consumer"))
        .dependency(DependencyEdge::side_effect("./esm-consumer"));
    if let Some(edge) = extra_entry_edge {
        entry = entry.dependency(edge);
    }
    fx.load("/entry.js", entry.build());

    fx.load(
        "/cjs-consumer.js",
        ModuleContent::builder(
            ModuleKind::CommonJs,
            "const { CONST_A, LIVE_B } = require('./consts');",
        )
        .dependency(DependencyEdge::require("./consts").with_use_site(destructure_both()))
        .build(),
    );
    fx.load(
        "/esm-consumer.js",
        ModuleContent::builder(ModuleKind::Esm, "import { CONST_A } from './consts'; use(CONST_A);")
            .dependency(
                DependencyEdge::esm_named("./consts", ["CONST_A"])
                    .with_use_site(UseSite::reference(0, "CONST_A")),
            )
            .build(),
    );
    fx.load("/consts.js", consts(consts_side_effects));
    fx
}

#[test]
fn mixed_destructure_keeps_site_but_direct_reference_inlines() {
    let fx = mixed_consumers(false, None);
    let usage = fx.usage(&["/entry.js"]);
    let plan = Inliner::new(&fx.graph, &usage).plan();

    assert_eq!(plan.rewrite(&id("/cjs-consumer.js"), UseSiteId(0)), &Rewrite::Keep);
    assert_eq!(
        plan.rewrite(&id("/esm-consumer.js"), UseSiteId(0)),
        &Rewrite::Inline {
            export: "CONST_A".into(),
            value: InlineValue::Number(1.0),
        }
    );

    let decisions = plan.decisions(&id("/consts.js")).unwrap();
    assert_eq!(decisions["CONST_A"], InlineDecision::Inlinable(InlineValue::Number(1.0)));
    assert_eq!(decisions["LIVE_B"], InlineDecision::NotInlinable(NotInlinable::Opaque));

    // The destructure still needs the getter.
    assert!(!plan.is_fully_inlined(&id("/consts.js"), "CONST_A"));
}

#[test]
fn unknown_usage_in_mixed_destructure_disables_module() {
    let escape = DependencyEdge::esm_namespace("./consts")
        .with_use_site(UseSite::new(7, UseSiteKind::NamespaceEscape));
    let fx = mixed_consumers(false, Some(escape));
    let usage = fx.usage(&["/entry.js"]);
    let plan = Inliner::new(&fx.graph, &usage).plan();

    assert_eq!(plan.rewrite(&id("/esm-consumer.js"), UseSiteId(0)), &Rewrite::Keep);
    assert_eq!(
        plan.decision(&id("/consts.js"), "CONST_A"),
        Some(&InlineDecision::NotInlinable(NotInlinable::MixedDestructure))
    );
}

#[test]
fn escaped_namespace_of_side_effect_module_disables_inlining() {
    let escape = DependencyEdge::esm_namespace("./consts")
        .with_use_site(UseSite::new(7, UseSiteKind::NamespaceEscape));
    let fx = mixed_consumers(true, Some(escape));
    let usage = fx.usage(&["/entry.js"]);

    let decisions = Inliner::new(&fx.graph, &usage)
        .compute_inline_decisions(&id("/consts.js"))
        .unwrap();
    assert_eq!(
        decisions["CONST_A"],
        InlineDecision::NotInlinable(NotInlinable::NamespaceEscapes)
    );
}

#[test]
fn direct_references_only_are_fully_inlined() {
    let mut fx = Fixture::new(&["/entry.js", "/flags.js"]);
    fx.load(
        "/entry.js",
        ModuleContent::builder(ModuleKind::Esm, "")
            .dependency(
                DependencyEdge::esm_named("./flags", ["DEBUG", "NAME"])
                    .with_use_site(UseSite::reference(0, "DEBUG"))
                    .with_use_site(UseSite::reference(1, "NAME"))
                    .with_use_site(UseSite::reference(2, "DEBUG")),
            )
            .build(),
    );
    fx.load(
        "/flags.js",
        ModuleContent::builder(ModuleKind::Esm, "")
            .export(Export::constant("DEBUG", InlineValue::Bool(false)))
            .export(Export::constant("NAME", InlineValue::String("app".into())).with_mutation(Mutation::ConditionallyReassigned))
            .side_effects(false)
            .build(),
    );

    let usage = fx.usage(&["/entry.js"]);
    let plan = Inliner::new(&fx.graph, &usage).plan();

    assert!(plan.is_fully_inlined(&id("/flags.js"), "DEBUG"));
    assert!(!plan.is_fully_inlined(&id("/flags.js"), "NAME"));
    assert_eq!(
        plan.decision(&id("/flags.js"), "NAME"),
        Some(&InlineDecision::NotInlinable(NotInlinable::Mutated))
    );
    assert_eq!(plan.inlined_site_count(), 2);
}

#[test]
fn computed_access_blocks_frozen_objects() {
    let mut fx = Fixture::new(&["/entry.js", "/table.js"]);
    let table = InlineValue::FrozenObject(vec![("a".into(), InlineValue::Number(1.0))]);
    fx.load(
        "/entry.js",
        ModuleContent::builder(ModuleKind::Esm, "")
            .dependency(
                DependencyEdge::esm_named("./table", ["TABLE"])
                    .with_use_site(UseSite::reference(0, "TABLE"))
                    .with_use_site(UseSite::new(
                        1,
                        UseSiteKind::ComputedMember {
                            export: Some("TABLE".into()),
                        },
                    )),
            )
            .build(),
    );
    fx.load(
        "/table.js",
        ModuleContent::builder(ModuleKind::Esm, "")
            .export(Export::constant("TABLE", table))
            .side_effects(false)
            .build(),
    );

    let usage = fx.usage(&["/entry.js"]);
    let plan = Inliner::new(&fx.graph, &usage).plan();

    assert_eq!(plan.rewrite(&id("/entry.js"), UseSiteId(0)), &Rewrite::Keep);
    assert_eq!(
        plan.decision(&id("/table.js"), "TABLE"),
        Some(&InlineDecision::NotInlinable(NotInlinable::ComputedAccess))
    );
}

#[test]
fn commonjs_exports_are_never_inlined() {
    let mut fx = Fixture::new(&["/entry.js", "/legacy.js"]);
    fx.load(
        "/entry.js",
        ModuleContent::builder(ModuleKind::CommonJs, "")
            .dependency(DependencyEdge::require("./legacy").with_use_site(UseSite::reference(0, "VERSION")))
            .build(),
    );
    fx.load(
        "/legacy.js",
        ModuleContent::builder(ModuleKind::CommonJs, "exports.VERSION = 3;")
            .export(Export::constant("VERSION", InlineValue::Number(3.0)))
            .build(),
    );

    let usage = fx.usage(&["/entry.js"]);
    let plan = Inliner::new(&fx.graph, &usage).plan();
    assert_eq!(plan.rewrite(&id("/entry.js"), UseSiteId(0)), &Rewrite::Keep);
    assert_eq!(
        plan.decision(&id("/legacy.js"), "VERSION"),
        Some(&InlineDecision::NotInlinable(NotInlinable::ExportsIdentityObserved))
    );
}

#[test]
fn inlining_follows_reexports_and_all_inlinable_destructures() {
    let mut fx = Fixture::new(&["/entry.js", "/barrel.js", "/consts.js"]);
    fx.load(
        "/entry.js",
        ModuleContent::builder(ModuleKind::CommonJs, "")
            .dependency(DependencyEdge::require("./barrel").with_use_site(UseSite::new(
                0,
                UseSiteKind::Destructure {
                    declaration: DeclarationKind::Let,
                    properties: vec![
                        DestructuredProperty::new("A", "a"),
                        DestructuredProperty::new("B", "b"),
                    ],
                },
            )))
            .build(),
    );
    fx.load(
        "/barrel.js",
        ModuleContent::builder(ModuleKind::Esm, "")
            .export(Export::re_export("A", "./consts", "A"))
            .export(Export::re_export("B", "./consts", "B"))
            .dependency(DependencyEdge::re_export("./consts"))
            .side_effects(false)
            .build(),
    );
    fx.load(
        "/consts.js",
        ModuleContent::builder(ModuleKind::Esm, "")
            .export(Export::constant("A", InlineValue::Null))
            .export(Export::constant("B", InlineValue::String("b".into())))
            .side_effects(false)
            .build(),
    );

    let usage = fx.usage(&["/entry.js"]);
    let plan = Inliner::new(&fx.graph, &usage).plan();

    match plan.rewrite(&id("/entry.js"), UseSiteId(0)) {
        Rewrite::InlineDestructure {
            declaration,
            bindings,
        } => {
            assert_eq!(*declaration, DeclarationKind::Let);
            let locals: Vec<_> = bindings.iter().map(|b| (b.local.as_str(), b.value.to_js())).collect();
            assert_eq!(locals, [("a", "null".to_string()), ("b", "\"b\"".to_string())]);
        }
        other => panic!("expected destructure to be inlined, got {other:?}"),
    }

    // The barrel re-exports the origin, so only the barrel's names go away.
    assert!(plan.is_fully_inlined(&id("/barrel.js"), "A"));
    assert!(!plan.is_fully_inlined(&id("/consts.js"), "A"));
}

#[test]
fn disabled_inliner_keeps_every_site() {
    let fx = mixed_consumers(false, None);
    let usage = fx.usage(&["/entry.js"]);
    let plan = Inliner::new(&fx.graph, &usage).enabled(false).plan();

    assert_eq!(plan.rewrite(&id("/esm-consumer.js"), UseSiteId(0)), &Rewrite::Keep);
    assert_eq!(plan.inlined_site_count(), 0);
}

#[test]
fn async_edges_are_not_rewritten() {
    let mut fx = Fixture::new(&["/entry.js", "/lazy.js"]);
    let edge = DependencyEdge::dynamic("./lazy").with_use_site(UseSite::reference(0, "X"));
    fx.load("/entry.js", ModuleContent::builder(ModuleKind::Esm, "").dependency(edge).build());
    fx.load(
        "/lazy.js",
        ModuleContent::builder(ModuleKind::Esm, "")
            .export(Export::constant("X", InlineValue::Number(1.0)))
            .side_effects(false)
            .build(),
    );

    let usage = fx.usage(&["/entry.js"]);
    let plan = Inliner::new(&fx.graph, &usage).plan();
    assert_eq!(plan.rewrite(&id("/entry.js"), UseSiteId(0)), &Rewrite::Keep);
}
