//! HTTP server setup.
//!
//! # Responsibilities
//! - Hold the state shared by every handler
//! - Build the Axum router with its middleware
//! - Run the accept loop until shutdown

use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::compile::{ArtifactStore, CompileOrchestrator};
use crate::config::ServerConfig;
use crate::http::router::dispatch;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::reload::ReloadChannel;
use crate::validator::Validator;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<DevState>,
}

pub struct DevState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<ArtifactStore>,
    pub orchestrator: Arc<CompileOrchestrator>,
    pub channel: Arc<ReloadChannel>,
    pub validator: Arc<dyn Validator>,
    /// Base directory for static files.
    pub script_dir: PathBuf,
    pub watch_enabled: bool,
    pub shutdown: ShutdownSignal,
}

impl AppState {
    pub fn new(state: DevState) -> Self {
        Self {
            inner: Arc::new(state),
        }
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` fires, then stop accepting and let in-flight
/// requests finish.
pub async fn run(
    listener: TcpListener,
    router: Router,
    mut shutdown: ShutdownSignal,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "HTTP server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.recv().await })
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{CompileOptions, CompileResult, CompileSettings, Compiler};
    use crate::lifecycle::shutdown::Shutdown;
    use crate::validator::NullValidator;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    struct NeverCompiles;

    #[async_trait]
    impl Compiler for NeverCompiles {
        async fn compile(&self, _options: &CompileOptions) -> CompileResult {
            CompileResult::failure("not today")
        }
    }

    fn state(dir: &std::path::Path, shutdown: &Shutdown) -> AppState {
        let config = Arc::new(ServerConfig::from(dir.join("main.yaml").as_path()));
        let store = Arc::new(ArtifactStore::new());
        let channel = Arc::new(ReloadChannel::new(8));
        let orchestrator = Arc::new(CompileOrchestrator::new(
            Arc::new(NeverCompiles),
            CompileSettings::from(config.as_ref()),
            store.clone(),
            channel.clone(),
        ));
        AppState::new(DevState {
            script_dir: dir.to_path_buf(),
            config,
            store,
            orchestrator,
            channel,
            validator: Arc::new(NullValidator),
            watch_enabled: false,
            shutdown: shutdown.subscribe(),
        })
    }

    async fn get(router: Router, uri: &str) -> axum::response::Response {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn document_is_unavailable_before_first_compile() {
        let dir = tempfile::tempdir().unwrap();
        let shutdown = Shutdown::new();
        let router = build_router(state(dir.path(), &shutdown));

        let response = get(router, "/").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn document_serves_published_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let shutdown = Shutdown::new();
        let state = state(dir.path(), &shutdown);
        state.inner.store.publish("<html>hi</html>".to_string(), 1, None);
        let router = build_router(state);

        let response = get(router.clone(), "/index.html").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"<html>hi</html>");
    }

    #[tokio::test]
    async fn static_files_resolve_against_script_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("style.css"), "body{}").unwrap();
        let shutdown = Shutdown::new();
        let router = build_router(state(dir.path(), &shutdown));

        let ok = get(router.clone(), "/style.css").await;
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(ok.headers()[header::CONTENT_TYPE], "text/css");

        let missing = get(router.clone(), "/nope.css").await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let traversal = get(router, "/nonexistent/../../etc/passwd").await;
        assert_eq!(traversal.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn plain_request_on_ws_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let shutdown = Shutdown::new();
        let router = build_router(state(dir.path(), &shutdown));

        assert_eq!(get(router, "/ws").await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn api_method_and_path_errors() {
        let dir = tempfile::tempdir().unwrap();
        let shutdown = Shutdown::new();
        let router = build_router(state(dir.path(), &shutdown));

        assert_eq!(get(router.clone(), "/api/unknown").await.status(), StatusCode::NOT_FOUND);

        let delete = Request::builder()
            .method("DELETE")
            .uri("/api/reload")
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let status = get(router, "/api/status").await;
        assert_eq!(status.status(), StatusCode::OK);
        let body = axum::body::to_bytes(status.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["lastCompileTime"], serde_json::Value::Null);
        assert_eq!(json["watch"], false);
        assert_eq!(json["clients"], 0);
    }
}
