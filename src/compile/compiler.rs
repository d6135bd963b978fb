//! The external compiler collaborator.
//!
//! The preview server never produces HTML itself. It hands a [`CompileOptions`]
//! to something implementing [`Compiler`] and reads back a [`CompileResult`].
//! [`CommandCompiler`] is the shipped implementation: it runs a configured
//! program, writes the options to its stdin as JSON and parses the result from
//! its stdout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Options for a single compilation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompileOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets_dir: Option<PathBuf>,
    #[serde(rename = "customCSS", skip_serializing_if = "Option::is_none")]
    pub custom_css: Option<PathBuf>,
    #[serde(rename = "customJS", skip_serializing_if = "Option::is_none")]
    pub custom_js: Option<PathBuf>,
    pub minify: bool,
    pub dev: bool,
    pub metadata: BTreeMap<String, String>,
}

/// Numbers reported by the compiler about a successful build.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileStats {
    pub scene_count: u64,
    pub asset_count: u64,
    pub input_helper_count: u64,
    pub output_size: u64,
    /// Milliseconds, as measured by the compiler.
    pub compilation_time: u64,
}

/// Outcome of a compilation as reported by the collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileResult {
    pub success: bool,
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
    pub warnings: Vec<String>,
    pub stats: Option<CompileStats>,
}

impl CompileResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum InitError {
    #[error("compiler command is empty")]
    EmptyCommand,
    #[error("compiler program {program:?} cannot be started: {source}")]
    Unavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Other(String),
}

/// A YAML-to-HTML compiler.
///
/// `compile` must not fail at the Rust level: any problem, including failing
/// to reach the compiler at all, is folded into an unsuccessful [`CompileResult`].
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Acquire whatever the compiler needs before the first build.
    async fn initialize(&self) -> Result<(), InitError> {
        Ok(())
    }

    async fn compile(&self, options: &CompileOptions) -> CompileResult;

    /// Release resources acquired in [`Compiler::initialize`].
    async fn release(&self) {}
}

/// Runs an external program per compilation.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: String,
    args: Vec<String>,
}

impl CommandCompiler {
    pub fn new(command: &[String]) -> Result<Self, InitError> {
        let (program, args) = command.split_first().ok_or(InitError::EmptyCommand)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    async fn run(&self, options: &CompileOptions) -> Result<CompileResult, String> {
        let payload = serde_json::to_vec(options).map_err(|e| e.to_string())?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to start {}: {}", self.program, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A compiler that exits without reading stdin is judged by its output below.
            if let Err(e) = stdin.write_all(&payload).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(format!("failed to write compile options: {}", e));
                }
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| format!("compiler did not finish: {}", e))?;

        match serde_json::from_slice::<CompileResult>(&output.stdout) {
            Ok(result) => Ok(result),
            Err(parse_error) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                if !output.status.success() {
                    Err(if stderr.is_empty() {
                        format!("compiler exited with {}", output.status)
                    } else {
                        stderr
                    })
                } else {
                    Err(format!("unreadable compiler output: {}", parse_error))
                }
            }
        }
    }
}

#[async_trait]
impl Compiler for CommandCompiler {
    async fn initialize(&self) -> Result<(), InitError> {
        // Probe that the program can be spawned at all.
        let probe = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match probe {
            Ok(status) => {
                tracing::debug!(program = %self.program, %status, "Compiler probe finished");
                Ok(())
            }
            Err(source) => Err(InitError::Unavailable {
                program: self.program.clone(),
                source,
            }),
        }
    }

    async fn compile(&self, options: &CompileOptions) -> CompileResult {
        match self.run(options).await {
            Ok(result) => result,
            Err(message) => CompileResult::failure(message),
        }
    }
}
