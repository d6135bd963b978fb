//! Compilation subsystem.
//!
//! # Data Flow
//! ```text
//! trigger (watcher debounce or /api/reload)
//!     → orchestrator.rs (serialize, build options, call compiler)
//!     → compiler.rs (external collaborator contract)
//!     → inject.rs (dev payload into the emitted HTML)
//!     → artifact.rs (atomic swap of the current artifact)
//!     → reload channel (reload / error event)
//! ```

pub mod artifact;
pub mod compiler;
pub mod inject;
pub mod orchestrator;

pub use artifact::{ArtifactStore, CompileStatus, CompiledArtifact, Timestamp};
pub use compiler::{
    CommandCompiler, CompileOptions, CompileResult, CompileStats, Compiler, InitError,
};
pub use orchestrator::{CompileError, CompileOrchestrator, CompileSettings};
