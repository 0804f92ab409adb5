//! Shared test utilities for sprig-bundler tests
//!
//! Modules live in a [`MemoryLoader`] and are resolved against whatever the
//! loader currently holds, so tests can add, edit and remove modules between
//! builds.

#![allow(dead_code)]

use std::sync::Arc;

use sprig_bundler::sprig_config::BundleOptions;
use sprig_bundler::{
    BuildOutput, CollectingSink, Compiler, CompilerBuilder, MemoryLoader, MemoryWriter,
    ModuleContent, ModuleId, Resolver, SourceSpan, StaticResolver,
};

pub fn id(path: &str) -> ModuleId {
    ModuleId::new(path).unwrap()
}

/// Span of the first occurrence of `needle` in `source`.
pub fn span(source: &str, needle: &str) -> SourceSpan {
    let start = source
        .find(needle)
        .unwrap_or_else(|| panic!("'{needle}' does not occur in {source:?}"));
    SourceSpan::new(start as u32, (start + needle.len()) as u32)
}

/// Span of `needle` inside the first occurrence of `context`.
pub fn span_within(source: &str, context: &str, needle: &str) -> SourceSpan {
    let outer = span(source, context);
    let inner = span(context, needle);
    SourceSpan::new(outer.start + inner.start, outer.start + inner.end)
}

/// Bundle options with a single `main` entry.
pub fn main_options(entry: &str) -> BundleOptions {
    BundleOptions::default().with_entry("main", entry)
}

/// In-memory project: loader, writer and a sink collecting diagnostics.
pub struct Project {
    pub loader: Arc<MemoryLoader>,
    pub writer: Arc<MemoryWriter>,
    pub sink: Arc<CollectingSink>,
}

impl Project {
    pub fn new() -> Self {
        Self {
            loader: Arc::new(MemoryLoader::new()),
            writer: Arc::new(MemoryWriter::new()),
            sink: Arc::new(CollectingSink::new()),
        }
    }

    /// Add or replace a module.
    pub fn module(&self, path: &str, content: ModuleContent) -> &Self {
        self.loader.insert(id(path), content);
        self
    }

    pub fn remove(&self, path: &str) {
        self.loader.remove(&id(path));
    }

    /// Resolver over the modules the loader holds at resolution time.
    pub fn resolver(&self) -> Arc<dyn Resolver> {
        let loader = self.loader.clone();
        Arc::new(move |importer: &ModuleId, specifier: &str| {
            StaticResolver::new()
                .with_modules(loader.ids())
                .resolve(importer, specifier)
        })
    }

    pub fn builder(&self, options: BundleOptions) -> CompilerBuilder {
        Compiler::builder(options)
            .loader(self.loader.clone())
            .resolver(self.resolver())
            .writer(self.writer.clone())
            .diagnostics(self.sink.clone())
    }

    /// Compiler with a single `main` entry and an in-memory cache.
    pub fn compiler(&self, entry: &str) -> Compiler {
        self.builder(main_options(entry)).build().unwrap()
    }
}

/// Generated body of `path`, failing with the list of bundled modules when
/// it is absent.
pub fn body<'a>(output: &'a BuildOutput, path: &str) -> &'a str {
    output.module_body(&id(path)).unwrap_or_else(|| {
        panic!(
            "expected {path} in the output, bundled modules: {:?}",
            output.modules()
        )
    })
}

pub fn assert_contains(haystack: &str, needle: &str) {
    assert!(
        haystack.contains(needle),
        "Expected to find '{needle}', but it was missing.\nText:\n{haystack}"
    );
}

pub fn assert_not_contains(haystack: &str, needle: &str) {
    assert!(
        !haystack.contains(needle),
        "Expected NOT to find '{needle}', but it was present.\nText:\n{haystack}"
    );
}
