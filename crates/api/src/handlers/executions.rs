use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use engine::{EngineError, ExecutionRecord, ExecutionResult};
use nodes::RunParameters;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Deserialize)]
pub struct ExecutePipelineDto {
    #[serde(default)]
    pub parameters: RunParameters,
}

/// POST /api/v1/pipelines/{name}/execute
///
/// Runs to completion before responding. Step failures are part of the
/// returned result, not an HTTP error.
pub async fn execute(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<ExecutePipelineDto>,
) -> ApiResult<Json<ExecutionResult>> {
    let result = state.service.execute_pipeline(&name, payload.parameters).await;

    // Only the not-found result carries no execution id.
    if result.execution_id.is_none() {
        return Err(ApiError::from(EngineError::PipelineNotFound(name)));
    }
    Ok(Json(result))
}

/// GET /api/v1/executions/{id}
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ExecutionRecord>> {
    let record = state.service.get_execution(id).await?;
    Ok(Json(record))
}
