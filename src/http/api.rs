//! JSON API under `/api/`.
//!
//! | Path            | Methods    | Effect                                   |
//! |-----------------|------------|------------------------------------------|
//! | `/api/status`   | GET        | Server and compile status                |
//! | `/api/reload`   | GET, POST  | Schedule a recompile, return immediately |
//! | `/api/validate` | GET        | Run the validator over the script        |

use axum::{
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;

use crate::compile::artifact::LastError;
use crate::compile::{CompileStats, Timestamp};
use crate::http::server::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRoute {
    Status,
    Reload,
    Validate,
    Unknown,
}

impl ApiRoute {
    /// Parse the part of the path after `/api/`.
    pub fn parse(rest: &str) -> Self {
        match rest {
            "status" => ApiRoute::Status,
            "reload" => ApiRoute::Reload,
            "validate" => ApiRoute::Validate,
            _ => ApiRoute::Unknown,
        }
    }

    fn allows(&self, method: &Method) -> bool {
        match self {
            ApiRoute::Reload => method == Method::GET || method == Method::POST,
            _ => method == Method::GET || method == Method::HEAD,
        }
    }

    fn allow_header(&self) -> &'static str {
        match self {
            ApiRoute::Reload => "GET, POST",
            _ => "GET, HEAD",
        }
    }
}

/// Body of `/api/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub version: &'static str,
    pub script: PathBuf,
    /// `compiledAt` of the current artifact.
    pub last_compile_time: Option<Timestamp>,
    pub last_good_at: Option<Timestamp>,
    pub last_attempt_at: Option<Timestamp>,
    pub last_error: Option<LastError>,
    pub compiling: bool,
    pub stats: Option<CompileStats>,
    pub watch: bool,
    pub clients: usize,
}

pub async fn handle(state: &AppState, route: ApiRoute, method: &Method) -> Response {
    if route == ApiRoute::Unknown {
        return json_error(StatusCode::NOT_FOUND, "unknown API endpoint");
    }
    if !route.allows(method) {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, route.allow_header())],
            Json(json!({ "error": "method not allowed" })),
        )
            .into_response();
    }

    match route {
        ApiRoute::Status => Json(status(state)).into_response(),
        ApiRoute::Reload => reload(state),
        ApiRoute::Validate => validate(state).await,
        ApiRoute::Unknown => json_error(StatusCode::NOT_FOUND, "unknown API endpoint"),
    }
}

pub fn status(state: &AppState) -> StatusReport {
    let inner = &state.inner;
    let current = inner.store.current();
    let status = inner.store.status();

    StatusReport {
        version: env!("CARGO_PKG_VERSION"),
        script: inner.config.project.script.clone(),
        last_compile_time: current.as_ref().map(|a| a.compiled_at),
        last_good_at: current.as_ref().map(|a| a.last_good_at),
        last_attempt_at: status.last_attempt_at,
        last_error: status.last_error.clone(),
        compiling: status.compiling,
        stats: current.as_ref().and_then(|a| a.stats),
        watch: inner.watch_enabled,
        clients: inner.channel.client_count(),
    }
}

fn reload(state: &AppState) -> Response {
    let orchestrator = state.inner.orchestrator.clone();
    tokio::spawn(async move {
        // Outcome is logged and broadcast by the orchestrator.
        let _ = orchestrator.recompile().await;
    });
    tracing::info!("Recompile requested over HTTP");
    Json(json!({ "status": "reloading" })).into_response()
}

async fn validate(state: &AppState) -> Response {
    let script = &state.inner.config.project.script;
    let content = match tokio::fs::read_to_string(script).await {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(script = ?script, error = %e, "Cannot read script for validation");
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("cannot read script: {}", e),
            );
        }
    };

    let validation = state.inner.validator.validate(&content);
    let bounded = async {
        match state.inner.config.validator.timeout() {
            Some(limit) => tokio::time::timeout(limit, validation).await.map_err(|_| limit),
            None => Ok(validation.await),
        }
    };
    let mut shutdown = state.inner.shutdown.clone();
    let outcome = tokio::select! {
        bounded = bounded => match bounded {
            Ok(outcome) => outcome,
            Err(limit) => {
                tracing::warn!(timeout_secs = limit.as_secs(), "Validator timed out");
                return json_error(
                    StatusCode::GATEWAY_TIMEOUT,
                    &format!("validator timed out after {}s", limit.as_secs()),
                );
            }
        },
        _ = shutdown.recv() => {
            return json_error(StatusCode::SERVICE_UNAVAILABLE, "server is shutting down");
        }
    };

    match outcome {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Validator failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
