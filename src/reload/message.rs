//! Live reload wire messages.
//!
//! Every frame is a JSON text frame of the form `{"type": ..., "payload": {...}}`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::compile::artifact::{now_millis, CompiledArtifact, Timestamp};
use crate::compile::compiler::CompileStats;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum ReloadEvent {
    Reload(ReloadPayload),
    Error(ErrorPayload),
    Ping(HeartbeatPayload),
    Pong(HeartbeatPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReloadPayload {
    /// Compile duration in milliseconds.
    pub duration: u64,
    pub stats: Option<CompileStats>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub compiled_at: Timestamp,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HeartbeatPayload {
    pub timestamp: Timestamp,
}

impl ReloadEvent {
    pub fn reload(artifact: &CompiledArtifact, elapsed: Duration, warnings: Vec<String>) -> Self {
        ReloadEvent::Reload(ReloadPayload {
            duration: elapsed.as_millis() as u64,
            stats: artifact.stats,
            warnings,
            compiled_at: artifact.compiled_at,
            timestamp: artifact.last_good_at,
        })
    }

    pub fn error(message: impl Into<String>, warnings: Vec<String>) -> Self {
        ReloadEvent::Error(ErrorPayload {
            message: message.into(),
            warnings,
            timestamp: now_millis(),
        })
    }

    pub fn ping() -> Self {
        ReloadEvent::Ping(HeartbeatPayload { timestamp: now_millis() })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ReloadEvent::Reload(_) => "reload",
            ReloadEvent::Error(_) => "error",
            ReloadEvent::Ping(_) => "ping",
            ReloadEvent::Pong(_) => "pong",
        }
    }
}
