use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};
use tracing::info;

use super::AppState;
use crate::error::ServerError;

/// `POST /model/run` -- run the modeling pipeline across all enabled realms.
///
/// Returns `200` with an empty object when the run completed (or was
/// skipped because another replica ran recently), and `500` with an array
/// of per-realm error strings when any realm failed.
pub async fn run(State(state): State<AppState>) -> Result<Json<Value>, ServerError> {
    let report = state
        .modeler
        .rebuild_models()
        .await
        .map_err(|e| ServerError::ModelRun(vec![e.to_string()]))?;

    if report.is_failure() {
        return Err(ServerError::ModelRun(report.failure_messages()));
    }

    if report.too_early {
        info!("model run skipped, another replica ran recently");
    }

    Ok(Json(json!({})))
}
