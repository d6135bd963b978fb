//! The current compiled artifact and compile status.
//!
//! Readers call [`ArtifactStore::current`] from any task; the orchestrator is
//! the only caller of [`ArtifactStore::publish`]. Both go through `ArcSwap`,
//! so a reader sees either the previous artifact or the next one, never a
//! partially written value.

use arc_swap::{ArcSwap, ArcSwapOption};
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::compile::compiler::CompileStats;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}

/// A complete, successfully compiled document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
    /// HTML with the development payload already injected.
    pub html: Arc<str>,
    /// When the compile that produced this artifact started.
    pub compiled_at: Timestamp,
    pub stats: Option<CompileStats>,
    /// When this artifact became the current one.
    pub last_good_at: Timestamp,
}

/// The last error reported by a failed compile.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LastError {
    pub message: String,
    pub warnings: Vec<String>,
    pub at: Timestamp,
}

/// Bookkeeping about compile attempts, successful or not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileStatus {
    pub last_attempt_at: Option<Timestamp>,
    pub last_error: Option<LastError>,
    pub compiling: bool,
}

#[derive(Debug, Default)]
pub struct ArtifactStore {
    current: ArcSwapOption<CompiledArtifact>,
    status: ArcSwap<CompileStatus>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The artifact served to readers, or `None` before the first successful compile.
    pub fn current(&self) -> Option<Arc<CompiledArtifact>> {
        self.current.load_full()
    }

    pub fn status(&self) -> Arc<CompileStatus> {
        self.status.load_full()
    }

    /// Make `html` the current artifact.
    ///
    /// `compiled_at` is bumped if needed so that it is strictly greater than the
    /// previous artifact's, even when two compiles start in the same millisecond.
    pub fn publish(
        &self,
        html: String,
        compiled_at: Timestamp,
        stats: Option<CompileStats>,
    ) -> Arc<CompiledArtifact> {
        let compiled_at = match self.current.load().as_deref() {
            Some(prev) if prev.compiled_at >= compiled_at => prev.compiled_at + 1,
            _ => compiled_at,
        };
        let artifact = Arc::new(CompiledArtifact {
            html: Arc::from(html),
            compiled_at,
            stats,
            last_good_at: now_millis(),
        });
        self.current.store(Some(Arc::clone(&artifact)));
        self.status.rcu(|status| CompileStatus {
            last_error: None,
            ..CompileStatus::clone(status)
        });
        artifact
    }

    pub fn record_failure(&self, message: &str, warnings: &[String]) {
        let error = LastError {
            message: message.to_string(),
            warnings: warnings.to_vec(),
            at: now_millis(),
        };
        self.status.rcu(|status| CompileStatus {
            last_error: Some(error.clone()),
            ..CompileStatus::clone(status)
        });
    }

    pub(crate) fn begin_attempt(&self) -> Timestamp {
        let started = now_millis();
        self.status.rcu(|status| CompileStatus {
            last_attempt_at: Some(started),
            compiling: true,
            ..CompileStatus::clone(status)
        });
        started
    }

    pub(crate) fn end_attempt(&self) {
        self.status.rcu(|status| CompileStatus {
            compiling: false,
            ..CompileStatus::clone(status)
        });
    }
}
