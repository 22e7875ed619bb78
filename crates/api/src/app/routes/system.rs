use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, Json};

use courier_pipeline::PipelineStats;

use crate::app::AppState;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Counters of the consuming pipeline.
pub async fn stats(Extension(state): Extension<Arc<AppState>>) -> Json<PipelineStats> {
    Json(state.stats().snapshot())
}
