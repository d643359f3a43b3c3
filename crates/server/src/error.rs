use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors that can occur when running the Tessera server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A modeling run failed for one or more realms.
    #[error("model run failed")]
    ModelRun(Vec<String>),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            Self::Config(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({ "error": message })),
            )
                .into_response(),
            // The trigger contract: failures surface as a JSON array of
            // rendered error strings, one per failed realm.
            Self::ModelRun(errors) => {
                (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(errors)).into_response()
            }
        }
    }
}
