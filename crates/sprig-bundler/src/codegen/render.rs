use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::chunk::{Chunk, ChunkId};

use super::{ChunkCode, RuntimeFeature, js_string};

/// Build-wide facts every entry chunk embeds.
#[derive(Debug, Clone, Default)]
pub struct RuntimeContext {
    /// Runtime helpers needed by any chunk of the build.
    pub features: BTreeSet<RuntimeFeature>,
    /// File name of every chunk, for the async chunk loader.
    pub chunk_files: BTreeMap<ChunkId, String>,
}

impl RuntimeContext {
    /// Union of the requirements of every chunk, with the file names of all
    /// chunks.
    pub fn for_build<'a>(chunks: impl IntoIterator<Item = (&'a Chunk, &'a ChunkCode)>) -> Self {
        let mut context = Self::default();
        for (chunk, code) in chunks {
            context.features.extend(code.runtime_requirements.iter().copied());
            context.chunk_files.insert(chunk.id.clone(), chunk.file_name());
        }
        context.features = RuntimeFeature::closure(context.features);
        context
    }
}

fn write_module_map(out: &mut String, code: &ChunkCode) {
    out.push_str("{\n");
    for (id, body) in &code.module_bodies {
        let keyword = if code.async_modules.contains(id) {
            "async function"
        } else {
            "function"
        };
        let _ = writeln!(
            out,
            "{}: {keyword} (module, exports, __sprig_require__) {{",
            js_string(id.as_str())
        );
        out.push_str(body);
        if !body.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("},\n");
    }
    out.push('}');
}

/// Final text of one chunk file.
///
/// Entry chunks are a self-contained script: module map, runtime helpers and
/// a call requiring the entry module. Other chunks push their module map onto
/// the global chunk queue the entry runtime drains.
pub fn render_chunk(chunk: &Chunk, code: &ChunkCode, runtime: &RuntimeContext) -> String {
    let mut out = String::new();

    if !chunk.is_entry() {
        let _ = write!(
            out,
            "(globalThis.__sprig_chunks__ = globalThis.__sprig_chunks__ || []).push([{}, ",
            js_string(chunk.id.as_str())
        );
        write_module_map(&mut out, code);
        out.push_str("]);\n");
        return out;
    }

    let features = RuntimeFeature::closure(
        runtime
            .features
            .iter()
            .chain(&code.runtime_requirements)
            .copied()
            .chain([RuntimeFeature::Require]),
    );

    out.push_str("(function () {\nvar __sprig_modules__ = ");
    write_module_map(&mut out, code);
    out.push_str(";\n");

    for feature in &features {
        out.push_str(feature.snippet());
    }

    if features.contains(&RuntimeFeature::EnsureChunk) {
        out.push_str("var __sprig_chunk_files__ = {");
        for (i, (id, file)) in runtime.chunk_files.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{}: {}", js_string(id.as_str()), js_string(file));
        }
        out.push_str("};\n");
    }

    for root in &chunk.roots {
        let _ = writeln!(out, "__sprig_require__({});", js_string(root.as_str()));
    }
    out.push_str("})();\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkGroup, ChunkKind};
    use sprig_graph::ModuleId;

    fn chunk(kind: ChunkKind, name: &str, module: &str) -> Chunk {
        let id = ModuleId::new(module).unwrap();
        Chunk::from_group(ChunkGroup::new(name, kind, vec![id.clone()], [id].into_iter().collect()))
    }

    fn code_for(module: &str, body: &str) -> ChunkCode {
        ChunkCode {
            module_bodies: BTreeMap::from([(ModuleId::new(module).unwrap(), body.to_string())]),
            runtime_requirements: BTreeSet::new(),
            async_modules: BTreeSet::new(),
        }
    }

    #[test]
    fn entry_chunk_embeds_runtime_and_requires_entry() {
        let entry = chunk(ChunkKind::Entry, "main", "/src/main.js");
        let code = code_for("/src/main.js", "console.log(1);");
        let output = render_chunk(&entry, &code, &RuntimeContext::default());

        assert!(output.starts_with("(function () {\nvar __sprig_modules__ = {"));
        assert!(output.contains("\"/src/main.js\": function (module, exports, __sprig_require__) {\nconsole.log(1);\n},"));
        assert!(output.contains("function __sprig_require__(id)"));
        assert!(output.contains("__sprig_require__(\"/src/main.js\");\n})();"));
        assert!(!output.contains("__sprig_require__.e ="));
    }

    #[test]
    fn async_chunk_pushes_onto_queue() {
        let lazy = chunk(ChunkKind::Async, "lazy", "/src/lazy.js");
        let mut code = code_for("/src/lazy.js", "await setup();");
        code.async_modules.insert(ModuleId::new("/src/lazy.js").unwrap());

        let output = render_chunk(&lazy, &code, &RuntimeContext::default());
        assert!(output.starts_with(&format!(
            "(globalThis.__sprig_chunks__ = globalThis.__sprig_chunks__ || []).push([\"{}\", {{",
            lazy.id
        )));
        assert!(output.contains("async function (module, exports, __sprig_require__)"));
        assert!(!output.contains("function __sprig_require__(id)"));
    }

    #[test]
    fn chunk_file_table_is_emitted_with_the_loader() {
        let entry = chunk(ChunkKind::Entry, "main", "/src/main.js");
        let lazy = chunk(ChunkKind::Async, "lazy", "/src/lazy.js");
        let mut entry_code = code_for("/src/main.js", "");
        entry_code.runtime_requirements.insert(RuntimeFeature::EnsureChunk);
        let lazy_code = code_for("/src/lazy.js", "");

        let runtime = RuntimeContext::for_build([(&entry, &entry_code), (&lazy, &lazy_code)]);
        assert!(runtime.features.contains(&RuntimeFeature::ChunkRegistry));

        let output = render_chunk(&entry, &entry_code, &runtime);
        assert!(output.contains(&format!("\"{}\": \"{}\"", lazy.id, lazy.file_name())));
        assert!(output.contains("__sprig_require__.e = function (ids)"));
    }
}
