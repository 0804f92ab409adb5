//! Rebuilds over a persistent module graph.
//!
//! These tests verify that:
//! - Unchanged modules are neither re-applied nor regenerated
//! - Edits regenerate only the edited module
//! - Dropped imports prune the graph
//! - The persistent cache serves a fresh compiler
//! - Cancelled builds leave the compiler usable

mod helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use helpers::*;
use sprig_bundler::sprig_config::SprigConfig;
use sprig_bundler::{
    BuildError, CancellationFlag, CompilerBuilder, DependencyEdge, DiagnosticKind, Export, Loader,
    MemoryLoader, ModuleContent, ModuleId, ModuleKind, UseSite,
};
use tempfile::TempDir;

fn main_source(import_util: bool) -> ModuleContent {
    if !import_util {
        return ModuleContent::builder(ModuleKind::Esm, "start();\n").build();
    }
    let main = "import { format } from './util';\nstart(format);\n";
    ModuleContent::builder(ModuleKind::Esm, main)
        .dependency(
            DependencyEdge::esm_named("./util", ["format"])
                .at(span(main, "import { format } from './util';"))
                .with_use_site(UseSite::reference(0, "format").at(span_within(main, "start(format)", "format"))),
        )
        .build()
}

fn util_source(body: &str) -> ModuleContent {
    let source = format!("export function format() {{ {body} }}\n");
    ModuleContent::builder(ModuleKind::Esm, source.as_str())
        .export(Export::local("format", "format").with_keyword(span(&source, "export ")))
        .build()
}

fn project() -> Project {
    let project = Project::new();
    project.module("/src/main.js", main_source(true));
    project.module("/src/util.js", util_source("return 1;"));
    project
}

#[tokio::test]
async fn test_unchanged_rebuild_is_served_from_the_graph_and_cache() {
    let project = project();
    let mut compiler = project.compiler("/src/main.js");

    let first = compiler.build().await.unwrap();
    assert_eq!(first.stats.loaded, 2);
    assert_eq!(first.stats.cache.computations, 2);

    let second = compiler.build().await.unwrap();
    assert_eq!(second.stats.loaded, 0);
    assert_eq!(second.stats.reused, 2);
    assert_eq!(second.stats.cache.hits, 2);
    assert_eq!(second.stats.cache.computations, 0);
    assert_eq!(first.chunks, second.chunks);
}

#[tokio::test]
async fn test_editing_one_module_regenerates_only_that_module() {
    let project = project();
    let mut compiler = project.compiler("/src/main.js");
    compiler.build().await.unwrap();

    project.module("/src/util.js", util_source("return 2;"));
    let output = compiler.build().await.unwrap();

    assert_eq!(output.stats.loaded, 1);
    assert_eq!(output.stats.reused, 1);
    assert_eq!(output.stats.cache.computations, 1);
    assert_eq!(output.stats.cache.hits, 1);
    assert_contains(body(&output, "/src/util.js"), "function format() { return 2; }");
}

#[tokio::test]
async fn test_dropped_import_prunes_the_module() {
    let project = project();
    let mut compiler = project.compiler("/src/main.js");
    compiler.build().await.unwrap();
    assert_eq!(compiler.graph().module_count(), 2);

    project.module("/src/main.js", main_source(false));
    let output = compiler.build().await.unwrap();

    assert_eq!(output.stats.removed, 1);
    assert_eq!(compiler.graph().module_count(), 1);
    assert!(compiler.graph().index_of(&id("/src/util.js")).is_none());
    assert!(!output.modules().contains(&id("/src/util.js")));
    compiler.graph().validate().unwrap();
}

#[tokio::test]
async fn test_unresolved_import_resolves_once_the_module_appears() {
    let project = Project::new();
    project.module("/src/main.js", main_source(true));
    let mut compiler = project.compiler("/src/main.js");

    let first = compiler.build().await.unwrap();
    assert_eq!(first.diagnostics.len(), 1);
    assert_eq!(first.diagnostics[0].kind, DiagnosticKind::UnresolvedImport);

    project.module("/src/util.js", util_source("return 1;"));
    let second = compiler.build().await.unwrap();

    assert!(second.diagnostics.is_empty(), "{:?}", second.diagnostics);
    assert_eq!(second.stats.unresolved, 0);
    assert_contains(
        body(&second, "/src/main.js"),
        "var __sprig_import_0__ = __sprig_require__(\"/src/util.js\");",
    );
}

#[tokio::test]
async fn test_parallel_jobs_produce_identical_output() {
    let project = project();

    let default = project.compiler("/src/main.js").build().await.unwrap();
    let pooled = project
        .builder(main_options("/src/main.js"))
        .parallel_jobs(2)
        .build()
        .unwrap()
        .build()
        .await
        .unwrap();

    assert_eq!(default.chunks, pooled.chunks);
}

#[tokio::test]
async fn test_persistent_cache_serves_a_new_compiler() {
    let temp = TempDir::new().unwrap();
    let project = project();

    let mut config = SprigConfig::default();
    config.bundle = main_options("/src/main.js");
    config.cache.dir = Some(temp.path().join("cache"));

    let build = |config: &SprigConfig| {
        CompilerBuilder::from_config(config)
            .unwrap()
            .loader(project.loader.clone())
            .resolver(project.resolver())
            .build()
            .unwrap()
    };

    let first = {
        let mut compiler = build(&config);
        compiler.build().await.unwrap()
    };
    assert_eq!(first.stats.cache.computations, 2);

    let mut compiler = build(&config);
    let second = compiler.build().await.unwrap();
    assert_eq!(second.stats.loaded, 2, "a new compiler starts from an empty graph");
    assert_eq!(second.stats.cache.computations, 0);
    assert_eq!(second.stats.cache.hits, 2);
    assert_eq!(first.chunks, second.chunks);
}

#[tokio::test]
async fn test_disabled_cache_always_regenerates() {
    let project = project();
    let mut config = SprigConfig::default();
    config.bundle = main_options("/src/main.js");
    config.cache.enabled = false;

    let mut compiler = CompilerBuilder::from_config(&config)
        .unwrap()
        .loader(project.loader.clone())
        .resolver(project.resolver())
        .build()
        .unwrap();
    compiler.build().await.unwrap();
    let second = compiler.build().await.unwrap();

    assert_eq!(second.stats.cache.computations, 2);
    assert_eq!(second.stats.cache.hits, 0);
}

#[tokio::test]
async fn test_stale_generations_are_collected_after_a_build() {
    let project = project();
    let mut compiler = project
        .builder(main_options("/src/main.js"))
        .max_generations(1)
        .build()
        .unwrap();
    compiler.build().await.unwrap();

    project.module("/src/util.js", util_source("return 2;"));
    compiler.build().await.unwrap();

    // The entry for the first version of util.js was not touched by the
    // second build.
    assert_eq!(compiler.cache().len().unwrap(), 2);
}

#[tokio::test]
async fn test_cancelled_build_can_be_retried() {
    let project = project();
    let mut compiler = project.compiler("/src/main.js");
    let flag = compiler.cancellation();

    flag.cancel();
    let error = compiler.build().await.unwrap_err();
    assert!(matches!(error, BuildError::Cancelled), "{error}");

    flag.reset();
    let output = compiler.build().await.unwrap();
    assert_eq!(output.modules().len(), 2);
}

/// Cancels the build the first time one module is loaded.
struct CancellingLoader {
    inner: Arc<MemoryLoader>,
    flag: CancellationFlag,
    trigger: ModuleId,
    fired: AtomicBool,
}

#[async_trait]
impl Loader for CancellingLoader {
    async fn load(&self, id: &ModuleId) -> anyhow::Result<ModuleContent> {
        if *id == self.trigger && !self.fired.swap(true, Ordering::SeqCst) {
            self.flag.cancel();
        }
        self.inner.load(id).await
    }
}

#[tokio::test]
async fn test_cancellation_between_layers_keeps_the_graph_consistent() {
    let project = project();
    let flag = CancellationFlag::new();
    let loader = CancellingLoader {
        inner: project.loader.clone(),
        flag: flag.clone(),
        trigger: id("/src/util.js"),
        fired: AtomicBool::new(false),
    };
    let mut compiler = project
        .builder(main_options("/src/main.js"))
        .loader(Arc::new(loader))
        .cancellation(flag.clone())
        .build()
        .unwrap();

    let error = compiler.build().await.unwrap_err();
    assert!(matches!(error, BuildError::Cancelled), "{error}");
    compiler.graph().validate().unwrap();
    assert!(project.writer.is_empty());

    flag.reset();
    let output = compiler.build().await.unwrap();
    assert_eq!(output.stats.reused, 1, "the entry was applied before cancellation");
    assert_eq!(output.stats.loaded, 1);
    assert_eq!(output.modules().len(), 2);
}
