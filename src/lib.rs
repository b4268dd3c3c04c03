//! HTTP service that classifies eye-fundus photographs with a pretrained
//! TensorFlow model.

pub mod config;
pub mod error;
pub mod handlers;
pub mod labels;
pub mod model;
pub mod preprocess;
pub mod upload;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use handlers::{health_check, index_handler, predict_handler, AppState, STATIC_PREFIX};

pub fn create_app(state: Arc<AppState>, body_limit_bytes: usize) -> Router {
    let uploads = ServeDir::new(state.uploads.dir());

    Router::new()
        .route("/", get(index_handler))
        .route("/predict", post(predict_handler))
        .route("/health", get(health_check))
        .nest_service(&format!("/{STATIC_PREFIX}"), uploads)
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
