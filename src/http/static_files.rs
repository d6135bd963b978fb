//! Static file resolution.
//!
//! # Responsibilities
//! - Map a URL path onto a file under a base directory
//! - Refuse anything that could escape that directory
//! - Stream the file with a content type guessed from its extension
//!
//! # Design Decisions
//! - Reject first, resolve second: a path containing `..` or a doubled
//!   separator is refused before the filesystem is consulted, so there is no
//!   canonicalize-and-compare step to bypass
//! - Directories are refused rather than listed

use axum::{
    body::Body,
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use percent_encoding::percent_decode_str;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tower::ServiceExt;
use tower_http::services::ServeFile;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("path escapes the served directory")]
    Forbidden,
    #[error("directory listings are disabled")]
    Directory,
    #[error("file not found")]
    NotFound,
    #[error("file cannot be read: {0}")]
    Io(String),
}

impl IntoResponse for ResolveError {
    fn into_response(self) -> Response {
        let status = match self {
            ResolveError::Forbidden | ResolveError::Directory => StatusCode::FORBIDDEN,
            ResolveError::NotFound => StatusCode::NOT_FOUND,
            ResolveError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Map `url_path` onto a path under `base_dir` without touching the filesystem.
pub fn resolve(url_path: &str, base_dir: &Path) -> Result<PathBuf, ResolveError> {
    let decoded = percent_decode_str(url_path)
        .decode_utf8()
        .map_err(|_| ResolveError::Forbidden)?;
    let normalized = decoded.replace('\\', "/");

    if normalized.contains("..") || normalized.contains("//") || normalized.contains('\0') {
        return Err(ResolveError::Forbidden);
    }

    let relative = Path::new(normalized.strip_prefix('/').unwrap_or(&normalized));
    let mut sanitized = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => sanitized.push(part),
            Component::CurDir => {}
            _ => return Err(ResolveError::Forbidden),
        }
    }

    Ok(base_dir.join(sanitized))
}

/// Resolve `url_path` under `base_dir` and check what is there.
pub async fn locate(url_path: &str, base_dir: &Path) -> Result<PathBuf, ResolveError> {
    let path = resolve(url_path, base_dir)?;
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_dir() => Err(ResolveError::Directory),
        Ok(_) => Ok(path),
        Err(e) => match e.kind() {
            std::io::ErrorKind::NotFound => Err(ResolveError::NotFound),
            // A path component that is a file ("/main.yaml/x") reads as missing.
            std::io::ErrorKind::NotADirectory => Err(ResolveError::NotFound),
            std::io::ErrorKind::PermissionDenied => Err(ResolveError::Forbidden),
            _ => Err(ResolveError::Io(e.to_string())),
        },
    }
}

/// Serve the file `url_path` maps to under `base_dir`.
pub async fn serve(url_path: &str, base_dir: &Path, request: Request) -> Response {
    let path = match locate(url_path, base_dir).await {
        Ok(path) => path,
        Err(e) => {
            tracing::debug!(path = %url_path, error = %e, "Static file refused");
            return e.into_response();
        }
    };

    match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response.map(Body::new).into_response(),
        Err(e) => ResolveError::Io(e.to_string()).into_response(),
    }
}
