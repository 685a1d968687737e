use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Unifies every fallible path across the engine, admission gate, and
/// control-plane into the taxonomy fixed by the error handling design: one
/// variant per row, each mapped to the HTTP status and reason the edge must
/// return.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{reason}")]
    BadRequest { reason: String },

    #[error("no free containers")]
    CapacityExhausted,

    #[error("engine error calling {method} {path}: {detail}")]
    EngineError {
        method: String,
        path: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("timing unknown: {0}")]
    TimingUnknown(String),

    #[error("control-plane transport error: {0}")]
    ControlPlane(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn bad_request(reason: impl Into<String>) -> Self {
        AppError::BadRequest {
            reason: reason.into(),
        }
    }

    pub fn engine(method: impl Into<String>, path: impl Into<String>, detail: impl Into<String>) -> Self {
        AppError::EngineError {
            method: method.into(),
            path: path.into(),
            status: None,
            detail: detail.into(),
        }
    }

    pub fn engine_status(
        method: impl Into<String>,
        path: impl Into<String>,
        status: u16,
        detail: impl Into<String>,
    ) -> Self {
        AppError::EngineError {
            method: method.into(),
            path: path.into(),
            status: Some(status),
            detail: detail.into(),
        }
    }

    pub fn timing_unknown(detail: impl Into<String>) -> Self {
        AppError::TimingUnknown(detail.into())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::engine("io", "", e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::engine("json", "", e.to_string())
    }
}

impl From<hyper::Error> for AppError {
    fn from(e: hyper::Error) -> Self {
        AppError::engine("hyper", "", e.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Most of these variants never actually reach a response: the
        // execution engine absorbs timing and cleanup failures into a
        // successful result and only logs them. This mapping exists so any
        // that do escape still produce a sane status instead of panicking.
        let (status, reason) = match &self {
            AppError::BadRequest { reason } => (StatusCode::BAD_REQUEST, reason.clone()),
            AppError::CapacityExhausted => {
                (StatusCode::INTERNAL_SERVER_ERROR, "No free containers".to_string())
            }
            AppError::EngineError { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Docker API error".to_string())
            }
            AppError::TimingUnknown(detail) => {
                (StatusCode::INTERNAL_SERVER_ERROR, detail.clone())
            }
            AppError::ControlPlane(detail) => {
                (StatusCode::INTERNAL_SERVER_ERROR, detail.clone())
            }
            AppError::Config(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail.clone()),
        };

        tracing::error!(%status, %reason, error = %self, "request failed");

        (status, Json(json!({ "error": reason }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
