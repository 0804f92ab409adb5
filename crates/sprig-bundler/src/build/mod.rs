//! The build pipeline.
//!
//! [`Compiler`] owns the module graph across builds and drives every phase.
//! The graph is mutated only while loading; analysis, chunk assembly and
//! code generation read a frozen snapshot, which lets code generation fan
//! out over modules on rayon with results coalesced through the
//! [`CacheHandle`](crate::cache::CacheHandle).

mod cancel;
mod collaborators;
mod compiler;
mod output;

pub use cancel::CancellationFlag;
pub use collaborators::{DirWriter, Loader, MemoryLoader, MemoryWriter, OutputWriter};
pub use compiler::{Compiler, CompilerBuilder};
pub use output::{BuildOutput, BuildStats, ChunkOutput};
