pub mod health;
pub mod model;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tessera_modeler::Modeler;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The modeling pipeline behind the trigger endpoint.
    pub modeler: Arc<Modeler>,
}

/// Build the Axum router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/model/run", post(model::run))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
