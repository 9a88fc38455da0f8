use std::sync::Arc;

use axum::{
    extract::State,
    routing::{any, get},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::handler::{PipelineError, PipelineOutput, RequestHandler};

pub const ANALYZE_PATH: &str = "/api/analyze";

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<RequestHandler>,
}

impl AppState {
    pub fn new(handler: RequestHandler) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        // method-agnostic; no request body is read
        .route(ANALYZE_PATH, any(analyze))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn analyze(State(state): State<AppState>) -> Result<PipelineOutput, PipelineError> {
    state.handler.handle().await
}
