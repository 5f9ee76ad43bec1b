//! `api` crate — HTTP REST API over a shared `PipelineService`.
//!
//! Exposes:
//!   GET    /health
//!   GET    /api/v1/pipelines
//!   POST   /api/v1/pipelines
//!   POST   /api/v1/pipelines/standard
//!   GET    /api/v1/pipelines/{name}
//!   DELETE /api/v1/pipelines/{name}
//!   POST   /api/v1/pipelines/{name}/execute
//!   GET    /api/v1/executions/{id}

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use engine::PipelineService;
use handlers::{executions, health, pipelines};

pub use error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PipelineService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/pipelines", get(pipelines::list).post(pipelines::create))
        .route("/api/v1/pipelines/standard", post(pipelines::create_standard))
        .route(
            "/api/v1/pipelines/{name}",
            get(pipelines::get).delete(pipelines::delete),
        )
        .route("/api/v1/pipelines/{name}/execute", post(executions::execute))
        .route("/api/v1/executions/{id}", get(executions::get))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve the API until the process is stopped.
pub async fn serve(addr: &str, service: Arc<PipelineService>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(AppState { service })).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use db::DocumentStore;
    use engine::{ExecutorConfig, PipelineExecutor};
    use nodes::mock::{MockBehaviour, MockDispatcher};

    async fn app(dir: &tempfile::TempDir, dispatcher: MockDispatcher) -> Router {
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let executor = PipelineExecutor::new(Arc::new(dispatcher), ExecutorConfig::default());
        let service = PipelineService::new(store, executor).await.unwrap();
        router(AppState { service: Arc::new(service) })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn demo_body() -> Value {
        json!({
            "name": "demo",
            "description": "two steps",
            "steps": [
                {
                    "id": "s1",
                    "name": "Fetch",
                    "action": {
                        "action": "clone",
                        "parameters": { "repository_url": "https://example.com/demo.git" }
                    },
                    "on_failure": "abort"
                },
                {
                    "id": "s2",
                    "name": "Analyze",
                    "action": { "action": "static_analysis", "parameters": {} },
                    "dependencies": ["s1"]
                }
            ]
        })
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir, MockDispatcher::succeeding()).await;

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_list_get_and_delete_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir, MockDispatcher::succeeding()).await;

        let (status, created) = send(&app, "POST", "/api/v1/pipelines", Some(demo_body())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["name"], "demo");
        assert_eq!(created["metadata"]["total_steps"], 2);

        let (status, list) = send(&app, "GET", "/api/v1/pipelines", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, fetched) = send(&app, "GET", "/api/v1/pipelines/demo", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["steps"][1]["dependencies"], json!(["s1"]));

        let (status, _) = send(&app, "DELETE", "/api/v1/pipelines/demo", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, "GET", "/api/v1/pipelines/demo", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "pipeline 'demo' not found");
    }

    #[tokio::test]
    async fn cyclic_pipeline_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir, MockDispatcher::succeeding()).await;
        let body = json!({
            "name": "loop",
            "steps": [
                { "id": "a", "name": "A", "action": { "action": "generic", "parameters": {} }, "dependencies": ["b"] },
                { "id": "b", "name": "B", "action": { "action": "generic", "parameters": {} }, "dependencies": ["a"] }
            ]
        });

        let (status, body) = send(&app, "POST", "/api/v1/pipelines", Some(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("cyclic dependency"));
    }

    #[tokio::test]
    async fn execute_then_fetch_execution_record() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(
            &dir,
            MockDispatcher::succeeding().with("s1", MockBehaviour::Fail("unreachable host".into())),
        )
        .await;
        send(&app, "POST", "/api/v1/pipelines", Some(demo_body())).await;

        let (status, result) = send(
            &app,
            "POST",
            "/api/v1/pipelines/demo/execute",
            Some(json!({ "parameters": { "branch": "main" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["success"], false);
        assert_eq!(result["error"], "Step 'Fetch' failed: unreachable host");

        let id = result["execution_id"].as_str().unwrap();
        let (status, record) = send(&app, "GET", &format!("/api/v1/executions/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["status"], "failed");
        assert_eq!(record["steps_executed"].as_array().unwrap().len(), 1);
        assert_eq!(record["parameters"]["branch"], "main");
    }

    #[tokio::test]
    async fn execute_unknown_pipeline_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir, MockDispatcher::succeeding()).await;

        let (status, _) = send(&app, "POST", "/api/v1/pipelines/ghost/execute", Some(json!({}))).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn standard_pipeline_runs_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir, MockDispatcher::succeeding()).await;

        let (status, created) = send(
            &app,
            "POST",
            "/api/v1/pipelines/standard",
            Some(json!({ "repository_url": "https://example.com/app.git" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let name = created["name"].as_str().unwrap().to_owned();

        let uri = format!("/api/v1/pipelines/{}/execute", name.replace(' ', "%20"));
        let (status, result) = send(&app, "POST", &uri, Some(json!({}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["success"], true);
        assert_eq!(result["results"]["completed_steps"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn unknown_execution_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir, MockDispatcher::succeeding()).await;

        let uri = format!("/api/v1/executions/{}", uuid::Uuid::new_v4());
        let (status, _) = send(&app, "GET", &uri, None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
