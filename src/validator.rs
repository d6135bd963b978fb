//! The external script validator collaborator.
//!
//! `/api/validate` reads the script from disk and hands its content to a
//! [`Validator`]. [`CommandValidator`] runs a configured program with the
//! content on stdin and parses a [`ValidationReport`] from its stdout;
//! [`NullValidator`] accepts everything.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::ValidatorConfig;

/// A single problem found in the script.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidationIssue {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn valid() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("validator {program:?} cannot be started: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("validator I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("validator produced unreadable output: {0}")]
    Output(String),
}

#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, content: &str) -> Result<ValidationReport, ValidatorError>;
}

/// Reports every script as valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullValidator;

#[async_trait]
impl Validator for NullValidator {
    async fn validate(&self, _content: &str) -> Result<ValidationReport, ValidatorError> {
        Ok(ValidationReport::valid())
    }
}

#[derive(Debug, Clone)]
pub struct CommandValidator {
    program: String,
    args: Vec<String>,
}

impl CommandValidator {
    /// `None` for an empty command.
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl Validator for CommandValidator {
    async fn validate(&self, content: &str) -> Result<ValidationReport, ValidatorError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ValidatorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(content.as_bytes()).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let output = child.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        match serde_json::from_str::<ValidationReport>(stdout.trim()) {
            Ok(report) => Ok(report),
            Err(e) if output.status.success() => Err(ValidatorError::Output(e.to_string())),
            Err(_) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(ValidatorError::Output(format!(
                    "exited with {}: {}",
                    output.status,
                    stderr.trim()
                )))
            }
        }
    }
}

/// The validator described by `config`.
pub fn from_config(config: &ValidatorConfig) -> Arc<dyn Validator> {
    match CommandValidator::new(&config.command) {
        Some(validator) => Arc::new(validator),
        None => Arc::new(NullValidator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_validator_accepts_anything() {
        let report = NullValidator.validate("not: [valid").await.unwrap();
        assert!(report.valid);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn report_fields_default_when_missing() {
        let report: ValidationReport =
            serde_json::from_str(r#"{"errors":[{"message":"unknown scene","line":4}]}"#).unwrap();
        assert!(!report.valid);
        assert_eq!(report.errors[0].line, Some(4));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn empty_command_falls_back_to_null() {
        assert!(CommandValidator::new(&[]).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_validator_parses_stdout() {
        let command = vec![
            "sh".to_string(),
            "-c".to_string(),
            r#"cat > /dev/null; echo '{"valid":true,"warnings":[{"message":"unused asset"}]}'"#
                .to_string(),
        ];
        let validator = CommandValidator::new(&command).unwrap();
        let report = validator.validate("title: test").await.unwrap();
        assert!(report.valid);
        assert_eq!(report.warnings[0].message, "unused asset");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_validator_reports_garbage_output() {
        let command = vec!["sh".to_string(), "-c".to_string(), "echo nope; exit 2".to_string()];
        let validator = CommandValidator::new(&command).unwrap();
        let err = validator.validate("").await.unwrap_err();
        assert!(matches!(err, ValidatorError::Output(_)));
    }
}
