use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use futures::channel::oneshot;
use futures::future::try_join_all;
use parking_lot::Mutex;
use rayon::prelude::*;
use rustc_hash::FxHashSet as HashSet;
use sprig_config::{BundleOptions, SprigConfig, validate_schema};
use sprig_graph::{
    EdgeCategory, ExportResolution, Inliner, ModuleGraph, ModuleId, ModuleIdx, Resolver,
    UsageAnalyzer, UsageMap,
};
use tracing::{debug, info, trace, warn};

use super::{BuildOutput, BuildStats, CancellationFlag, ChunkOutput, DirWriter, Loader, OutputWriter};
use crate::cache::{
    CacheError, CacheHandle, CacheKey, CacheStats, ChangeDetector, Etag, RedbStore, chunk_etag,
    codegen_etag, content_hash, module_etag,
};
use crate::chunk::{ChunkAssembler, SplitPolicy, policy_from_options};
use crate::codegen::{
    ChunkCode, CodegenContext, CodegenError, GeneratedModule, RuntimeContext, generate_module,
    render_chunk,
};
use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::{BuildError, Result};

const CODEGEN_SCOPE: &str = "codegen";

/// Forwards diagnostics to the configured sink and keeps a copy for the
/// build output.
struct Reporter {
    sink: Arc<dyn DiagnosticSink>,
    reported: Mutex<Vec<Diagnostic>>,
}

impl Reporter {
    fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            sink,
            reported: Mutex::new(Vec::new()),
        }
    }

    fn report(&self, diagnostic: Diagnostic) {
        self.sink.report(diagnostic.clone());
        self.reported.lock().push(diagnostic);
    }

    /// Report every diagnostic and fail the build with them.
    fn fail(&self, diagnostics: Vec<Diagnostic>) -> BuildError {
        for diagnostic in &diagnostics {
            self.report(diagnostic.clone());
        }
        BuildError::Failed { diagnostics }
    }

    fn into_inner(self) -> Vec<Diagnostic> {
        self.reported.into_inner()
    }
}

struct ModuleWork {
    id: ModuleId,
    idx: ModuleIdx,
    etag: Etag,
    codegen_etag: Etag,
}

/// Builder for [`Compiler`].
pub struct CompilerBuilder {
    options: BundleOptions,
    loader: Option<Arc<dyn Loader>>,
    resolver: Option<Arc<dyn Resolver>>,
    writer: Option<Arc<dyn OutputWriter>>,
    diagnostics: Arc<dyn DiagnosticSink>,
    cache: CacheHandle,
    max_generations: u64,
    policy: Option<Box<dyn SplitPolicy>>,
    cancellation: CancellationFlag,
    parallel_jobs: Option<usize>,
}

impl CompilerBuilder {
    pub fn new(options: BundleOptions) -> Self {
        Self {
            options,
            loader: None,
            resolver: None,
            writer: None,
            diagnostics: Arc::new(TracingSink),
            cache: CacheHandle::memory(),
            max_generations: sprig_config::CacheOptions::default().max_generations,
            policy: None,
            cancellation: CancellationFlag::new(),
            parallel_jobs: None,
        }
    }

    /// Builder configured from a validated config file.
    ///
    /// The cache is persisted to `cache.dir` when set and kept in memory
    /// otherwise. Collaborators still have to be supplied.
    pub fn from_config(config: &SprigConfig) -> Result<Self> {
        validate_schema(config)?;

        let cache = match &config.cache.dir {
            _ if !config.cache.enabled => CacheHandle::disabled(),
            Some(dir) => CacheHandle::new(RedbStore::open(dir)?),
            None => CacheHandle::memory(),
        };

        let mut builder = Self::new(config.bundle.clone())
            .cache(cache)
            .max_generations(config.cache.max_generations);
        builder.parallel_jobs = config.settings.parallel_jobs;
        Ok(builder)
    }

    pub fn loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn writer(mut self, writer: Arc<dyn OutputWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Write chunks below `output_dir` of the bundle options.
    pub fn write_to_output_dir(self) -> Self {
        let writer = DirWriter::new(self.options.output_dir.clone());
        self.writer(Arc::new(writer))
    }

    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    pub fn cache(mut self, cache: CacheHandle) -> Self {
        self.cache = cache;
        self
    }

    /// Builds an entry may go untouched before it is collected.
    pub fn max_generations(mut self, max_generations: u64) -> Self {
        self.max_generations = max_generations;
        self
    }

    /// Override the split policy chosen by `split_chunks`.
    pub fn split_policy(mut self, policy: Box<dyn SplitPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = flag;
        self
    }

    /// Worker threads for code generation. Uses the global rayon pool when unset.
    pub fn parallel_jobs(mut self, jobs: usize) -> Self {
        self.parallel_jobs = Some(jobs);
        self
    }

    pub fn build(self) -> Result<Compiler> {
        let loader = self
            .loader
            .ok_or_else(|| BuildError::Setup("a loader is required".into()))?;
        let resolver = self
            .resolver
            .ok_or_else(|| BuildError::Setup("a resolver is required".into()))?;

        if self.options.entries.is_empty() {
            return Err(BuildError::Setup("at least one entry is required".into()));
        }
        let entries = self
            .options
            .entries
            .iter()
            .map(|(name, path)| {
                let id = ModuleId::new(path.to_string_lossy())
                    .map_err(|err| BuildError::Setup(format!("entry '{name}': {err}")))?;
                Ok((name.clone(), id))
            })
            .collect::<Result<Vec<_>>>()?;

        let pool = match self.parallel_jobs {
            Some(jobs) => Some(Arc::new(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(jobs)
                    .thread_name(|index| format!("sprig-codegen-{index}"))
                    .build()
                    .map_err(|err| BuildError::Setup(err.to_string()))?,
            )),
            None => None,
        };

        let policy = self
            .policy
            .unwrap_or_else(|| policy_from_options(&self.options.split_chunks));

        Ok(Compiler {
            options: self.options,
            entries,
            graph: ModuleGraph::new(),
            changes: ChangeDetector::new(),
            loader,
            resolver,
            writer: self.writer,
            diagnostics: self.diagnostics,
            cache: self.cache,
            max_generations: self.max_generations,
            policy,
            cancellation: self.cancellation,
            pool,
        })
    }
}

/// Runs builds over a module graph that persists between them.
///
/// Each [`build`](Self::build) runs the phases in order: update the graph
/// from the loader (the only phase that mutates it), prune, validate,
/// analyze usage, plan inlining, assemble chunks, generate module code in
/// parallel through the cache, render and write. Modules whose loader output
/// did not change since the previous build are not touched in the graph, and
/// modules whose code generation inputs did not change are served from the
/// cache.
pub struct Compiler {
    options: BundleOptions,
    entries: Vec<(String, ModuleId)>,
    graph: ModuleGraph,
    changes: ChangeDetector,
    loader: Arc<dyn Loader>,
    resolver: Arc<dyn Resolver>,
    writer: Option<Arc<dyn OutputWriter>>,
    diagnostics: Arc<dyn DiagnosticSink>,
    cache: CacheHandle,
    max_generations: u64,
    policy: Box<dyn SplitPolicy>,
    cancellation: CancellationFlag,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("entries", &self.entries)
            .field("modules", &self.graph.module_count())
            .field("policy", &self.policy.version())
            .field("cache", &self.cache)
            .finish()
    }
}

impl Compiler {
    pub fn builder(options: BundleOptions) -> CompilerBuilder {
        CompilerBuilder::new(options)
    }

    pub fn graph(&self) -> &ModuleGraph {
        &self.graph
    }

    pub fn entries(&self) -> &[(String, ModuleId)] {
        &self.entries
    }

    pub fn options(&self) -> &BundleOptions {
        &self.options
    }

    pub fn cache(&self) -> &CacheHandle {
        &self.cache
    }

    /// A handle that cancels builds of this compiler.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    /// Run one build.
    ///
    /// Unresolved imports are reported and replaced by throwing stubs; the
    /// build continues. Missing exports and conflicting chunk requirements
    /// fail the build with [`BuildError::Failed`] after every one of them has
    /// been reported.
    pub async fn build(&mut self) -> Result<BuildOutput> {
        let started = Instant::now();
        self.cancellation.check()?;

        let generation = self.cache.begin_generation();
        let cache_before = self.cache.stats();
        let reporter = Reporter::new(self.diagnostics.clone());
        let mut stats = BuildStats::default();
        debug!(generation, entries = self.entries.len(), "build started");

        self.update_graph(&mut stats, &reporter).await?;

        let entry_indices = self
            .entries
            .iter()
            .map(|(_, id)| self.graph.require_index(id))
            .collect::<sprig_graph::Result<Vec<_>>>()?;
        let removed = self.graph.prune_unreachable(&entry_indices);
        for id in &removed {
            self.changes.forget(id);
        }
        stats.removed = removed.len();
        self.graph.validate()?;
        debug!(
            modules = self.graph.module_count(),
            removed = stats.removed,
            "module graph updated"
        );

        // Frozen for analysis and generation; restored even when a phase fails.
        let graph = Arc::new(std::mem::take(&mut self.graph));
        let outcome = self.build_frozen(&graph, &mut stats, &reporter).await;
        self.graph = Arc::try_unwrap(graph).unwrap_or_else(|shared| (*shared).clone());
        let chunks = outcome?;

        if let Some(writer) = &self.writer {
            for chunk in &chunks {
                self.cancellation.check()?;
                writer
                    .write_chunk(chunk)
                    .await
                    .map_err(|source| BuildError::Write {
                        file: chunk.file_name.clone(),
                        source,
                    })?;
            }
        }

        self.cache.collect_garbage(self.max_generations)?;
        self.cache.flush()?;

        stats.cache = stats_since(self.cache.stats(), cache_before);
        stats.duration = started.elapsed();
        info!(
            modules = stats.retained,
            chunks = stats.chunks,
            loaded = stats.loaded,
            reused = stats.reused,
            cache_hits = stats.cache.hits,
            cache_misses = stats.cache.misses,
            inlined = stats.inlined_sites,
            duration_ms = stats.duration.as_millis() as u64,
            "build finished"
        );

        Ok(BuildOutput {
            chunks,
            diagnostics: reporter.into_inner(),
            stats,
        })
    }

    /// Load every module reachable from the entries, layer by layer, and
    /// apply the ones whose content changed.
    async fn update_graph(&mut self, stats: &mut BuildStats, reporter: &Reporter) -> Result<()> {
        let mut seen: HashSet<ModuleIdx> = HashSet::default();
        let mut frontier: Vec<ModuleIdx> = Vec::new();
        for (_, id) in &self.entries {
            let idx = self.graph.add_module(id.clone());
            if seen.insert(idx) {
                frontier.push(idx);
            }
        }

        while !frontier.is_empty() {
            self.cancellation.check()?;

            let ids: Vec<ModuleId> = frontier
                .iter()
                .filter_map(|idx| self.graph.module(*idx))
                .map(|module| module.id.clone())
                .collect();
            let loader = &self.loader;
            let contents = try_join_all(ids.into_iter().map(|id| async move {
                match loader.load(&id).await {
                    Ok(content) => Ok((id, content)),
                    Err(err) => Err(BuildError::Load {
                        module: id,
                        source: err.into(),
                    }),
                }
            }))
            .await?;

            let mut next = Vec::new();
            for (id, content) in contents {
                self.cancellation.check()?;

                let idx = self.graph.require_index(&id)?;
                let hash = ChangeDetector::hash_content(&content);
                let loaded = self.graph.module(idx).is_some_and(|module| module.is_loaded());
                let has_unresolved = self
                    .graph
                    .outgoing_edges(idx)
                    .any(|(_, edge)| edge.target.module().is_none());

                if loaded && !has_unresolved && !self.changes.has_changed(&id, &hash) {
                    stats.reused += 1;
                    next.extend(
                        self.graph
                            .dependencies(idx)
                            .into_iter()
                            .filter(|target| seen.insert(*target)),
                    );
                    continue;
                }

                if loaded {
                    self.graph.invalidate_module(idx)?;
                }
                trace!(module = %id, "applying module content");
                let outcomes = self
                    .graph
                    .set_module_content(idx, content, self.resolver.as_ref())?;
                self.changes.record(id, hash);
                stats.loaded += 1;

                for outcome in outcomes {
                    if let Some(error) = outcome.resolution_error {
                        stats.unresolved += 1;
                        warn!(
                            importer = %error.importer,
                            specifier = %error.specifier,
                            "unresolved import"
                        );
                        reporter.report(Diagnostic::unresolved_import(&error));
                    }
                    if let Some(target) = outcome.target.module() {
                        if seen.insert(target) {
                            next.push(target);
                        }
                    }
                }
            }
            frontier = next;
        }

        Ok(())
    }

    /// Every phase that only reads the graph.
    async fn build_frozen(
        &self,
        graph: &Arc<ModuleGraph>,
        stats: &mut BuildStats,
        reporter: &Reporter,
    ) -> Result<Vec<ChunkOutput>> {
        let entry_ids: Vec<ModuleId> = self.entries.iter().map(|(_, id)| id.clone()).collect();
        let usage = UsageAnalyzer::new(graph)
            .tree_shake(self.options.tree_shake)
            .analyze(&entry_ids)?;
        stats.retained = usage.retained_modules().count();
        debug!(retained = stats.retained, "usage analysis complete");

        let missing = missing_exports(graph, &usage);
        if !missing.is_empty() {
            return Err(reporter.fail(missing));
        }

        let plan = Inliner::new(graph, &usage)
            .enabled(self.options.inline_exports)
            .plan();
        stats.inlined_sites = plan.inlined_site_count();

        let assembler = ChunkAssembler::new(graph, &usage, self.policy.as_ref());
        let conflicts: Vec<Diagnostic> = assembler
            .conflicts()
            .iter()
            .map(|conflict| {
                Diagnostic::conflicting_requirements(&conflict.importer, &conflict.module, conflict.span)
            })
            .collect();
        if !conflicts.is_empty() {
            return Err(reporter.fail(conflicts));
        }
        let chunk_set = assembler.assemble(&self.entries)?;
        stats.chunks = chunk_set.len();

        let ctx = CodegenContext::new(
            graph.clone(),
            Arc::new(usage),
            Arc::new(plan),
            Arc::new(chunk_set),
        );

        let ids: Vec<ModuleId> = ctx
            .chunks
            .chunks()
            .iter()
            .flat_map(|chunk| chunk.modules.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let fingerprint = self.options.options_fingerprint();
        let work = self.install(|| {
            ids.par_iter()
                .map(|id| {
                    let idx = ctx.graph.index_of(id).ok_or_else(|| {
                        CodegenError::integrity(id, "chunk references a module missing from the graph")
                    })?;
                    let etag = module_etag(&ctx.graph, idx, &fingerprint)
                        .ok_or_else(|| CodegenError::integrity(id, "module vanished while hashing"))?;
                    let codegen_etag = codegen_etag(&etag, &ctx, idx);
                    Ok(ModuleWork {
                        id: id.clone(),
                        idx,
                        etag,
                        codegen_etag,
                    })
                })
                .collect::<std::result::Result<Vec<_>, CodegenError>>()
        })?;

        let generated = try_join_all(
            work.iter()
                .map(|item| self.generate_cached(&ctx, item, reporter)),
        )
        .await?;
        let generated: BTreeMap<ModuleId, GeneratedModule> = generated
            .into_iter()
            .map(|module| (module.id.clone(), module))
            .collect();
        debug!(modules = generated.len(), "code generation complete");

        let codes = ctx
            .chunks
            .chunks()
            .iter()
            .map(|chunk| {
                let modules = chunk
                    .modules
                    .iter()
                    .map(|id| {
                        generated
                            .get(id)
                            .cloned()
                            .ok_or_else(|| CodegenError::integrity(id, "module was not generated"))
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(ChunkCode::from_modules(chunk, modules))
            })
            .collect::<std::result::Result<Vec<_>, CodegenError>>()?;

        let runtime = RuntimeContext::for_build(ctx.chunks.chunks().iter().zip(&codes));
        let module_etags: BTreeMap<&ModuleId, &Etag> =
            work.iter().map(|item| (&item.id, &item.etag)).collect();

        let outputs = ctx
            .chunks
            .chunks()
            .iter()
            .zip(codes)
            .map(|(chunk, code)| {
                let text = render_chunk(chunk, &code, &runtime);
                let etag = chunk_etag(
                    chunk.modules.iter().filter_map(|id| module_etags.get(id).copied()),
                    ctx.chunks.policy_version(),
                );
                ChunkOutput {
                    id: chunk.id.clone(),
                    name: chunk.name.clone(),
                    kind: chunk.kind,
                    file_name: chunk.file_name(),
                    etag,
                    content_hash: content_hash(text.as_bytes()),
                    module_bodies: code.module_bodies,
                    runtime: code.runtime_requirements,
                    code: text,
                }
            })
            .collect();

        Ok(outputs)
    }

    async fn generate_cached(
        &self,
        ctx: &CodegenContext,
        work: &ModuleWork,
        reporter: &Reporter,
    ) -> Result<GeneratedModule> {
        self.cancellation.check()?;

        let key = CacheKey::new(CODEGEN_SCOPE, work.id.as_str(), work.codegen_etag.clone());
        match self
            .cache
            .get_or_compute(&key, || self.spawn_codegen(ctx.clone(), work.idx))
            .await
        {
            Ok(module) => Ok(module),
            Err(err) => Err(self.codegen_failure(&work.id, err, reporter)),
        }
    }

    /// Generate one module on the rayon pool. A panic in the worker resumes
    /// on the awaiting task.
    fn spawn_codegen(
        &self,
        ctx: CodegenContext,
        idx: ModuleIdx,
    ) -> impl Future<Output = std::result::Result<GeneratedModule, CodegenError>> {
        let (tx, rx) = oneshot::channel();
        let cancellation = self.cancellation.clone();
        let job = move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                if cancellation.is_cancelled() {
                    Err(CodegenError::Cancelled)
                } else {
                    generate_module(&ctx, idx)
                }
            }));
            let _ = tx.send(outcome);
        };
        match &self.pool {
            Some(pool) => pool.spawn(job),
            None => rayon::spawn(job),
        }

        async move {
            match rx.await {
                Ok(Ok(result)) => result,
                Ok(Err(payload)) => panic::resume_unwind(payload),
                Err(_) => Err(CodegenError::Cancelled),
            }
        }
    }

    fn codegen_failure(&self, module: &ModuleId, err: CacheError, reporter: &Reporter) -> BuildError {
        match err.compute_source::<CodegenError>() {
            Some(CodegenError::Cancelled) => return BuildError::Cancelled,
            Some(error) => {
                reporter.report(Diagnostic::graph_integrity(error.to_string(), Some(module.clone())));
                return BuildError::Codegen(error.clone());
            }
            None => {}
        }
        if matches!(err, CacheError::Cancelled { .. }) && self.cancellation.is_cancelled() {
            return BuildError::Cancelled;
        }
        reporter.report(Diagnostic::cache_compute(CODEGEN_SCOPE, module, &err));
        BuildError::Cache(err)
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

/// ESM named imports of retained modules whose name the target provably
/// does not export.
fn missing_exports(graph: &ModuleGraph, usage: &UsageMap) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for (idx, module) in graph.modules_sorted() {
        if !usage.is_retained(&module.id) {
            continue;
        }
        for (_, edge) in graph.outgoing_edges(idx) {
            if edge.edge.category != EdgeCategory::Esm {
                continue;
            }
            let Some(target) = edge.target.module() else {
                continue;
            };
            for binding in edge.edge.named_bindings() {
                let ExportResolution::Missing { module: owner } =
                    graph.resolve_export(target, &binding.imported)
                else {
                    continue;
                };
                let Some(owner) = graph.module(owner) else {
                    continue;
                };
                diagnostics.push(Diagnostic::missing_export(
                    &module.id,
                    &owner.id,
                    &binding.imported,
                    owner.exports.names().map(str::to_string).collect(),
                    edge.edge.span,
                ));
            }
        }
    }
    diagnostics
}

fn stats_since(after: CacheStats, before: CacheStats) -> CacheStats {
    CacheStats {
        hits: after.hits.saturating_sub(before.hits),
        misses: after.misses.saturating_sub(before.misses),
        coalesced: after.coalesced.saturating_sub(before.coalesced),
        computations: after.computations.saturating_sub(before.computations),
        failures: after.failures.saturating_sub(before.failures),
    }
}
