//! Compile orchestration.
//!
//! # Responsibilities
//! - Build compile options from the server configuration
//! - Serialize compiles (at most one in flight)
//! - Read the emitted file, always removing it afterwards
//! - Inject the development payload and publish the artifact
//! - Tell connected browsers about the outcome
//!
//! # Design Decisions
//! - Failures are returned as values and broadcast; the previous artifact stays
//! - A compile that exceeds the configured timeout is abandoned and reported as failed

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::compile::artifact::{ArtifactStore, CompiledArtifact};
use crate::compile::compiler::{CompileOptions, CompileStats, Compiler, InitError};
use crate::compile::inject::inject_dev_payload;
use crate::config::ServerConfig;
use crate::observability::metrics;
use crate::reload::{ReloadChannel, ReloadEvent};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("{message}")]
    Failed { message: String, warnings: Vec<String> },
    #[error("compiled output {path:?} could not be read: {reason}")]
    Output { path: PathBuf, reason: String },
    #[error("compile did not finish within {0:?}")]
    TimedOut(Duration),
}

impl CompileError {
    pub fn warnings(&self) -> &[String] {
        match self {
            CompileError::Failed { warnings, .. } => warnings,
            _ => &[],
        }
    }
}

/// Inputs that stay fixed across every compile of a session.
#[derive(Debug, Clone)]
pub struct CompileSettings {
    pub input: PathBuf,
    pub assets_dir: Option<PathBuf>,
    pub custom_css: Option<PathBuf>,
    pub custom_js: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub metadata: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl CompileSettings {
    /// Options for one compile, with a fresh ephemeral output path.
    pub fn options(&self) -> CompileOptions {
        CompileOptions {
            input: self.input.clone(),
            output: self
                .output_dir
                .join(format!("live-preview-{}.html", Uuid::new_v4())),
            assets_dir: self.assets_dir.clone(),
            custom_css: self.custom_css.clone(),
            custom_js: self.custom_js.clone(),
            minify: false,
            dev: true,
            metadata: self.metadata.clone(),
        }
    }
}

impl From<&ServerConfig> for CompileSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            input: config.project.script.clone(),
            assets_dir: config.project.assets_dir.clone(),
            custom_css: config.project.custom_css.clone(),
            custom_js: config.project.custom_js.clone(),
            output_dir: config.compiler.output_dir(),
            metadata: config.compiler.metadata.clone(),
            timeout: config.compiler.timeout(),
        }
    }
}

/// Removes an emitted file when dropped, whatever happened in between.
struct EphemeralOutput {
    path: PathBuf,
}

impl EphemeralOutput {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for EphemeralOutput {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::debug!(path = ?self.path, error = %e, "Failed to remove ephemeral output"),
        }
    }
}

struct BuildOutput {
    html: String,
    stats: Option<CompileStats>,
    warnings: Vec<String>,
}

pub struct CompileOrchestrator {
    compiler: Arc<dyn Compiler>,
    settings: CompileSettings,
    store: Arc<ArtifactStore>,
    channel: Arc<ReloadChannel>,
    in_flight: Mutex<()>,
}

impl CompileOrchestrator {
    pub fn new(
        compiler: Arc<dyn Compiler>,
        settings: CompileSettings,
        store: Arc<ArtifactStore>,
        channel: Arc<ReloadChannel>,
    ) -> Self {
        Self {
            compiler,
            settings,
            store,
            channel,
            in_flight: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    pub async fn initialize(&self) -> Result<(), InitError> {
        self.compiler.initialize().await
    }

    pub async fn release(&self) {
        // Wait out a running compile so the compiler is not torn down under it.
        let _guard = self.in_flight.lock().await;
        self.compiler.release().await;
    }

    /// Compile once, publish on success and broadcast the outcome.
    ///
    /// Concurrent callers queue behind the compile in flight.
    pub async fn recompile(&self) -> Result<Arc<CompiledArtifact>, CompileError> {
        let _guard = self.in_flight.lock().await;

        let started = Instant::now();
        let compiled_at = self.store.begin_attempt();
        let outcome = self.build().await;
        self.store.end_attempt();
        let elapsed = started.elapsed();

        match outcome {
            Ok(output) => {
                for warning in &output.warnings {
                    tracing::warn!(warning = %warning, "Compiler warning");
                }
                let artifact = self.store.publish(
                    inject_dev_payload(&output.html),
                    compiled_at,
                    output.stats,
                );
                metrics::record_compile(true, elapsed);
                tracing::info!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    bytes = artifact.html.len(),
                    compiled_at = artifact.compiled_at,
                    "Compiled"
                );
                self.channel.broadcast(&ReloadEvent::reload(
                    &artifact,
                    elapsed,
                    output.warnings,
                ));
                Ok(artifact)
            }
            Err(err) => {
                metrics::record_compile(false, elapsed);
                tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %err,
                    "Compile failed, keeping last good artifact"
                );
                let message = err.to_string();
                self.store.record_failure(&message, err.warnings());
                self.channel
                    .broadcast(&ReloadEvent::error(message, err.warnings().to_vec()));
                Err(err)
            }
        }
    }

    async fn build(&self) -> Result<BuildOutput, CompileError> {
        let options = self.settings.options();
        let _requested = EphemeralOutput::new(options.output.clone());

        let compile = self.compiler.compile(&options);
        let result = match self.settings.timeout {
            Some(limit) => tokio::time::timeout(limit, compile)
                .await
                .map_err(|_| CompileError::TimedOut(limit))?,
            None => compile.await,
        };

        if !result.success {
            return Err(CompileError::Failed {
                message: result
                    .error
                    .unwrap_or_else(|| "compilation failed".to_string()),
                warnings: result.warnings,
            });
        }

        let emitted = result
            .output_path
            .clone()
            .unwrap_or_else(|| options.output.clone());
        let _emitted = (emitted != options.output && is_within(&emitted, &self.settings.output_dir))
            .then(|| EphemeralOutput::new(emitted.clone()));

        let html = tokio::fs::read_to_string(&emitted)
            .await
            .map_err(|e| CompileError::Output {
                path: emitted.clone(),
                reason: e.to_string(),
            })?;

        Ok(BuildOutput {
            html,
            stats: result.stats,
            warnings: result.warnings,
        })
    }
}

fn is_within(path: &Path, dir: &Path) -> bool {
    path.parent().is_some_and(|parent| parent == dir)
}
