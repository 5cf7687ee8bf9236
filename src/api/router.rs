//! Prediction API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//!
//! Layers (outermost → innermost):
//! 1. HTTP trace → 2. Body size limit

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::pipeline::SequenceClassifier;

/// Largest accepted request body (bulk submissions included).
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Build the prediction router around a shared classifier.
pub fn prediction_router(pipeline: Arc<dyn SequenceClassifier>) -> Router {
    build_router(ApiContext::new(pipeline))
}

fn build_router(ctx: ApiContext) -> Router {
    Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/process_text", post(endpoints::process::process_text))
        .route("/process_bulk", post(endpoints::process::process_bulk))
        .with_state(ctx)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}
