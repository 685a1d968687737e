//! A thin JSON-in/JSON-out dispatcher with no websocket or chunked-streaming
//! surface.

mod health;
mod run;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, options, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health::version_banner))
        .route("/run/{language}", post(run::run_code))
        .route("/health_check", options(health::health_check))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(120)))
        .with_state(state)
}
