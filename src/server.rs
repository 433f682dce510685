//! Design-file server.
//!
//! Serves `GET /psd/{filename}` for an exact-match allowlist of file names.
//! Anything not on the list is a 404, whether or not it exists on disk, and
//! so is an allowlisted file that is missing or unreadable.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::FileServerConfig;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared state for the file routes.
#[derive(Clone)]
pub struct FileServerState {
    root: Arc<PathBuf>,
    allowlist: Arc<Vec<String>>,
}

impl FileServerState {
    pub fn new(config: &FileServerConfig) -> Self {
        Self {
            root: Arc::new(config.root.clone()),
            allowlist: Arc::new(config.allowlist.clone()),
        }
    }

    pub fn is_allowed(&self, filename: &str) -> bool {
        self.allowlist.iter().any(|f| f == filename)
    }
}

pub fn router(state: FileServerState) -> Router {
    Router::new()
        .route("/psd/{filename}", get(serve_design_file))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "File not found").into_response()
}

async fn serve_design_file(
    State(state): State<FileServerState>,
    Path(filename): Path<String>,
) -> Response {
    if !state.is_allowed(&filename) {
        tracing::info!(%filename, "file not in allowed list");
        return not_found();
    }
    let path = state.root.join(&filename);

    let meta = match tokio::fs::metadata(&path).await {
        Ok(m) if m.is_file() => m,
        Ok(_) => {
            tracing::info!(path = %path.display(), "not a regular file");
            return not_found();
        }
        Err(e) => {
            tracing::info!(path = %path.display(), error = %e, "file does not exist");
            return not_found();
        }
    };
    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read file");
            return not_found();
        }
    };

    tracing::info!(%filename, size = meta.len(), "serving design file");
    (
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{filename}\""),
            ),
            (header::CONTENT_LENGTH, meta.len().to_string()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: FileServerConfig) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind,
            source,
        })?;
    tracing::info!(
        addr = %config.bind,
        root = %config.root.display(),
        files = config.allowlist.len(),
        "design file server listening"
    );
    axum::serve(listener, router(FileServerState::new(&config))).await?;
    Ok(())
}
