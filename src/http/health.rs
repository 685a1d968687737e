use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;

use crate::state::AppState;

/// `GET /`: a human-readable version banner.
pub async fn version_banner() -> &'static str {
    concat!("run-api ", env!("CARGO_PKG_VERSION"))
}

/// `OPTIONS /health_check`: 200 while a slot is free, 404 while at capacity,
/// so an external load balancer stops routing new runs here without this
/// service refusing the request itself.
pub async fn health_check(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.admission.busy() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    }
}
