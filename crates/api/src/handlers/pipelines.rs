use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use engine::{EngineError, Pipeline, Step};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Deserialize)]
pub struct CreatePipelineDto {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<Step>,
}

#[derive(Deserialize)]
pub struct StandardPipelineDto {
    #[serde(default)]
    pub repository_url: String,
}

/// GET /api/v1/pipelines
pub async fn list(State(state): State<AppState>) -> Json<Vec<Pipeline>> {
    Json(state.service.list_pipelines().await)
}

/// GET /api/v1/pipelines/{name}
pub async fn get(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Pipeline>> {
    state
        .service
        .get_pipeline(&name)
        .await
        .map(Json)
        .ok_or_else(|| EngineError::PipelineNotFound(name).into())
}

/// POST /api/v1/pipelines
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreatePipelineDto>,
) -> ApiResult<(StatusCode, Json<Pipeline>)> {
    tracing::info!("creating pipeline '{}'", payload.name);

    let pipeline = state
        .service
        .create_pipeline(&payload.name, &payload.description, payload.steps)
        .await?;

    Ok((StatusCode::CREATED, Json(pipeline)))
}

/// POST /api/v1/pipelines/standard
pub async fn create_standard(
    State(state): State<AppState>,
    Json(payload): Json<StandardPipelineDto>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let name = state
        .service
        .create_standard_pipeline(&payload.repository_url)
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "name": name }))))
}

/// DELETE /api/v1/pipelines/{name}
pub async fn delete(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    if state.service.delete_pipeline(&name).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::from(EngineError::PipelineNotFound(name)))
    }
}
