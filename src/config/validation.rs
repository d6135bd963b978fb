//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that every configured path exists with the right kind
//! - Validate value ranges (debounce > 0, heartbeat timeout >= interval)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::path::PathBuf;
use thiserror::Error;

use crate::config::schema::ServerConfig;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no script file configured")]
    ScriptUnset,
    #[error("script file {0:?} does not exist or is not a file")]
    ScriptMissing(PathBuf),
    #[error("assets directory {0:?} does not exist or is not a directory")]
    AssetsNotDirectory(PathBuf),
    #[error("{kind} file {path:?} does not exist")]
    OverrideMissing { kind: &'static str, path: PathBuf },
    #[error("compiler command is empty")]
    EmptyCompilerCommand,
    #[error("debounce window must be greater than zero")]
    ZeroDebounce,
    #[error("heartbeat timeout ({timeout}s) must not be shorter than the interval ({interval}s)")]
    HeartbeatTimeout { interval: u64, timeout: u64 },
    #[error("client buffer must hold at least one frame")]
    ZeroClientBuffer,
    #[error("metrics address {0:?} is not a socket address")]
    MetricsAddress(String),
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let project = &config.project;

    if project.script.as_os_str().is_empty() {
        errors.push(ValidationError::ScriptUnset);
    } else if !project.script.is_file() {
        errors.push(ValidationError::ScriptMissing(project.script.clone()));
    }

    if let Some(dir) = &project.assets_dir {
        if !dir.is_dir() {
            errors.push(ValidationError::AssetsNotDirectory(dir.clone()));
        }
    }

    for (kind, path) in [("css", &project.custom_css), ("js", &project.custom_js)] {
        if let Some(path) = path {
            if !path.is_file() {
                errors.push(ValidationError::OverrideMissing { kind, path: path.clone() });
            }
        }
    }

    if config.compiler.command.is_empty() {
        errors.push(ValidationError::EmptyCompilerCommand);
    }

    if config.watch.debounce_ms == 0 {
        errors.push(ValidationError::ZeroDebounce);
    }

    let reload = &config.reload;
    if reload.heartbeat_secs > 0 && reload.heartbeat_timeout_secs < reload.heartbeat_secs {
        errors.push(ValidationError::HeartbeatTimeout {
            interval: reload.heartbeat_secs,
            timeout: reload.heartbeat_timeout_secs,
        });
    }
    if reload.client_buffer == 0 {
        errors.push(ValidationError::ZeroClientBuffer);
    }

    if let Some(addr) = &config.observability.metrics_address {
        if addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(ValidationError::MetricsAddress(addr.clone()));
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_every_problem() {
        let mut config = ServerConfig::default();
        config.compiler.command.clear();
        config.watch.debounce_ms = 0;
        config.reload.heartbeat_timeout_secs = 1;
        config.project.assets_dir = Some(PathBuf::from("/no/such/assets"));

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::ScriptUnset));
        assert!(errors.contains(&ValidationError::EmptyCompilerCommand));
        assert!(errors.contains(&ValidationError::ZeroDebounce));
        let assets = PathBuf::from("/no/such/assets");
        assert!(errors.contains(&ValidationError::AssetsNotDirectory(assets)));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::HeartbeatTimeout { .. })));
    }

    #[test]
    fn heartbeat_check_skipped_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("main.yaml");
        std::fs::write(&script, "").unwrap();

        let mut config = ServerConfig::from(script.as_path());
        config.reload.heartbeat_secs = 0;
        config.reload.heartbeat_timeout_secs = 0;
        assert!(validate_config(&config).is_ok());
    }
}
