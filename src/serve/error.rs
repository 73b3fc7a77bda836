//! Request-level error type for the catalog server.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Failure of a single request; never fatal to the server.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// No route was registered for the requested asset.
    #[error("asset not found: {0}")]
    NotFound(String),

    /// A registered asset's backing file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The catalog directory could not be listed.
    #[error("failed to list catalog directory {path}: {source}")]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServeError::NotFound(_) => StatusCode::NOT_FOUND,
            ServeError::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                StatusCode::NOT_FOUND
            }
            ServeError::Read { .. } | ServeError::Scan { .. } => {
                tracing::error!(error = %self, "catalog request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}
