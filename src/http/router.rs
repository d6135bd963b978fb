//! Request classification and dispatch.
//!
//! # Responsibilities
//! - Decide which endpoint a path belongs to
//! - Dispatch to the WebSocket, API, asset, document or static handler
//!
//! # Design Decisions
//! - Fixed precedence: `/ws`, `/api/`, `/assets/`, document, static
//! - Classification is a pure function of the path so it can be tested alone
//! - One fallback handler instead of per-path axum routes; `/api/*` and
//!   static paths overlap in ways axum's matcher would reject

use axum::{
    extract::{Request, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
};

use crate::http::api::{self, ApiRoute};
use crate::http::server::AppState;
use crate::http::{static_files, websocket};

/// Where a request path is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint<'a> {
    /// Live reload WebSocket.
    LiveReload,
    Api(ApiRoute),
    /// File under the assets directory; holds the path below `/assets`.
    Asset(&'a str),
    /// The compiled HTML.
    Document,
    /// File relative to the script directory.
    Static(&'a str),
    NotFound,
}

/// Classify `path`. `/assets/` only routes to the asset handler when an
/// assets directory is configured.
pub fn classify(path: &str, assets_enabled: bool) -> Endpoint<'_> {
    if path == "/ws" {
        return Endpoint::LiveReload;
    }
    if let Some(rest) = path.strip_prefix("/api/") {
        return Endpoint::Api(ApiRoute::parse(rest));
    }
    if assets_enabled {
        if let Some(rest) = path.strip_prefix("/assets") {
            if rest.starts_with('/') {
                return Endpoint::Asset(rest);
            }
        }
    }
    match path {
        "/" | "/index.html" => Endpoint::Document,
        p if p.starts_with('/') => Endpoint::Static(p),
        _ => Endpoint::NotFound,
    }
}

/// The single entry point for every request.
pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let path = request.uri().path().to_owned();
    let assets_dir = state.inner.config.project.assets_dir.clone();

    match classify(&path, assets_dir.is_some()) {
        Endpoint::LiveReload => websocket::upgrade(&state, request).await,
        Endpoint::Api(route) => api::handle(&state, route, request.method()).await,
        Endpoint::Asset(rest) => match (readable(request.method()), assets_dir) {
            (true, Some(dir)) => static_files::serve(rest, &dir, request).await,
            (false, _) => method_not_allowed(),
            (true, None) => StatusCode::NOT_FOUND.into_response(),
        },
        Endpoint::Document if readable(request.method()) => serve_document(&state),
        Endpoint::Static(rel) if readable(request.method()) => {
            static_files::serve(rel, &state.inner.script_dir, request).await
        }
        Endpoint::Document | Endpoint::Static(_) => method_not_allowed(),
        Endpoint::NotFound => StatusCode::NOT_FOUND.into_response(),
    }
}

fn readable(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "GET, HEAD")],
        "Method not allowed",
    )
        .into_response()
}

/// Serve the current artifact, or 503 if nothing has compiled yet.
fn serve_document(state: &AppState) -> Response {
    match state.inner.store.current() {
        Some(artifact) => (
            [
                (header::CONTENT_TYPE, "text/html; charset=utf-8"),
                (header::CACHE_CONTROL, "no-store"),
            ],
            artifact.html.to_string(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::RETRY_AFTER, "1")],
            "The preview has not compiled yet",
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_is_ws_api_assets_document_static() {
        assert_eq!(classify("/ws", true), Endpoint::LiveReload);
        assert_eq!(classify("/api/status", true), Endpoint::Api(ApiRoute::Status));
        assert_eq!(classify("/api/nope", true), Endpoint::Api(ApiRoute::Unknown));
        assert_eq!(classify("/assets/bg/forest.png", true), Endpoint::Asset("/bg/forest.png"));
        assert_eq!(classify("/", true), Endpoint::Document);
        assert_eq!(classify("/index.html", true), Endpoint::Document);
        assert_eq!(classify("/scenes/one.yaml", true), Endpoint::Static("/scenes/one.yaml"));
    }

    #[test]
    fn assets_prefix_without_directory_is_static() {
        assert_eq!(classify("/assets/bg.png", false), Endpoint::Static("/assets/bg.png"));
        assert_eq!(classify("/assetsfoo", true), Endpoint::Static("/assetsfoo"));
    }

    #[test]
    fn near_misses_fall_through() {
        assert_eq!(classify("/ws/", true), Endpoint::Static("/ws/"));
        assert_eq!(classify("/api", true), Endpoint::Static("/api"));
        assert_eq!(classify("*", true), Endpoint::NotFound);
    }
}
