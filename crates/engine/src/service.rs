//! `PipelineService` — the application context for pipeline work.
//!
//! Constructed once by the process entry point and shared (behind an `Arc`)
//! with every component that creates, inspects or runs pipelines. It owns the
//! in-memory set of loaded pipelines, the document store, and the executor.
//!
//! Pipeline documents are stored under the slug of the pipeline name, so two
//! loaded names never share a slug. Writes to one document are serialised
//! through a per-slug lock, so concurrent runs of the same pipeline cannot
//! lose history entries.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use db::repository::{executions as exec_repo, pipelines as pipeline_repo};
use db::store::slug;
use db::{DbError, DocumentStore};
use nodes::RunParameters;

use crate::executor::PipelineExecutor;
use crate::factory;
use crate::models::{ExecutionRecord, ExecutionResult, Pipeline, Step};
use crate::resolver::resolve_order;
use crate::EngineError;

pub struct PipelineService {
    store: DocumentStore,
    executor: PipelineExecutor,
    pipelines: RwLock<BTreeMap<String, Pipeline>>,
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PipelineService {
    /// Build the service and load every pipeline already in the store.
    pub async fn new(store: DocumentStore, executor: PipelineExecutor) -> Result<Self, EngineError> {
        let loaded: Vec<Pipeline> = pipeline_repo::load_all_pipelines(&store).await?;
        let mut pipelines: BTreeMap<String, Pipeline> = BTreeMap::new();
        for pipeline in loaded {
            let key = slug(&pipeline.name);
            if let Some(other) = pipelines.keys().find(|k| slug(k) == key) {
                warn!(
                    "skipping pipeline '{}': its document name clashes with '{}'",
                    pipeline.name, other
                );
                continue;
            }
            info!("loaded pipeline '{}' ({} steps)", pipeline.name, pipeline.steps.len());
            pipelines.insert(pipeline.name.clone(), pipeline);
        }

        Ok(Self {
            store,
            executor,
            pipelines: RwLock::new(pipelines),
            write_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Write lock for the document that stores `name`.
    async fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().await;
        Arc::clone(locks.entry(slug(name)).or_default())
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Validate, persist and register a new pipeline.
    ///
    /// A pipeline with the same name is replaced.
    ///
    /// # Errors
    /// - [`EngineError::InvalidPipeline`] for a blank name, or a name whose
    ///   document file already belongs to a different pipeline.
    /// - [`EngineError::DuplicateStepId`] / [`EngineError::CyclicDependency`]
    ///   if the steps do not resolve.
    /// - [`EngineError::Database`] if the document cannot be written.
    pub async fn create_pipeline(
        &self,
        name: &str,
        description: &str,
        steps: Vec<Step>,
    ) -> Result<Pipeline, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidPipeline("pipeline name must not be empty".into()));
        }
        resolve_order(&steps)?;

        let pipeline = Pipeline::new(name, description, steps);

        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;

        let key = slug(name);
        let clash = self
            .pipelines
            .read()
            .await
            .keys()
            .find(|k| k.as_str() != name && slug(k) == key)
            .cloned();
        if let Some(other) = clash {
            return Err(EngineError::InvalidPipeline(format!(
                "name '{name}' is stored in the same document as existing pipeline '{other}'"
            )));
        }

        pipeline_repo::save_pipeline(&self.store, name, &pipeline).await?;
        if self
            .pipelines
            .write()
            .await
            .insert(name.to_owned(), pipeline.clone())
            .is_some()
        {
            warn!("pipeline '{}' replaced an existing definition", name);
        }

        info!("pipeline '{}' created with {} steps", name, pipeline.steps.len());
        Ok(pipeline)
    }

    /// Create the standard six-stage DevOps pipeline and return its name.
    pub async fn create_standard_pipeline(&self, repository_url: &str) -> Result<String, EngineError> {
        let pipeline = self
            .create_pipeline(
                &factory::standard_pipeline_name(),
                &factory::standard_pipeline_description(repository_url),
                factory::standard_steps(repository_url),
            )
            .await?;
        Ok(pipeline.name)
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Run a pipeline by name.
    ///
    /// Never fails: an unknown name yields a not-found result, and step or
    /// persistence problems are reported through the result's fields.
    pub async fn execute_pipeline(&self, name: &str, parameters: RunParameters) -> ExecutionResult {
        let Some(pipeline) = self.get_pipeline(name).await else {
            warn!("execute requested for unknown pipeline '{}'", name);
            return ExecutionResult::not_found(name);
        };

        let record = self.executor.run(&pipeline, parameters).await;

        let mut persist_errors = Vec::new();
        if let Err(e) = exec_repo::save_execution(
            &self.store,
            &record.execution_id.to_string(),
            &record,
        )
        .await
        {
            error!("failed to save execution record {}: {}", record.execution_id, e);
            persist_errors.push(format!("failed to save execution record: {e}"));
        }
        if let Err(e) = self.append_history(name, &record).await {
            error!("failed to update history of '{}': {}", name, e);
            persist_errors.push(format!("failed to update pipeline history: {e}"));
        }

        let mut result = ExecutionResult::from_record(record, pipeline.steps.len());
        if !persist_errors.is_empty() {
            let joined = persist_errors.join("; ");
            result.summary.push_str(&format!("\nWarning: {joined}"));
            result.error = Some(match result.error.take() {
                Some(e) => format!("{e}; {joined}"),
                None => joined,
            });
        }
        result
    }

    async fn append_history(&self, name: &str, record: &ExecutionRecord) -> Result<(), DbError> {
        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;

        let snapshot = {
            let mut pipelines = self.pipelines.write().await;
            let Some(pipeline) = pipelines.get_mut(name) else {
                warn!("pipeline '{}' was deleted during execution, history not recorded", name);
                return Ok(());
            };
            pipeline.execution_history.push(record.history_entry());
            pipeline.clone()
        };

        pipeline_repo::save_pipeline(&self.store, name, &snapshot).await
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// All loaded pipelines, sorted by name.
    pub async fn list_pipelines(&self) -> Vec<Pipeline> {
        self.pipelines.read().await.values().cloned().collect()
    }

    pub async fn get_pipeline(&self, name: &str) -> Option<Pipeline> {
        self.pipelines.read().await.get(name).cloned()
    }

    /// Remove a pipeline and its document. Returns `false` for an unknown name.
    ///
    /// Execution records of past runs are kept.
    pub async fn delete_pipeline(&self, name: &str) -> Result<bool, EngineError> {
        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;

        if self.pipelines.write().await.remove(name).is_none() {
            return Ok(false);
        }
        pipeline_repo::delete_pipeline(&self.store, name).await?;
        info!("pipeline '{}' deleted", name);
        Ok(true)
    }

    /// Load a persisted execution record.
    pub async fn get_execution(&self, execution_id: Uuid) -> Result<ExecutionRecord, EngineError> {
        let id = execution_id.to_string();
        exec_repo::load_execution(&self.store, &id).await.map_err(|e| match e {
            DbError::NotFound => EngineError::ExecutionNotFound(id),
            other => other.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorConfig;
    use crate::models::{ExecutionStatus, Routing};
    use nodes::mock::{MockBehaviour, MockDispatcher};
    use nodes::StepAction;
    use serde_json::Map;

    async fn service_with(dir: &tempfile::TempDir, dispatcher: MockDispatcher) -> PipelineService {
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let executor = PipelineExecutor::new(Arc::new(dispatcher), ExecutorConfig::default());
        PipelineService::new(store, executor).await.unwrap()
    }

    fn generic(id: &str) -> Step {
        Step::new(id, format!("Step {id}"), StepAction::Generic(Map::new()))
    }

    #[tokio::test]
    async fn created_pipeline_is_listed_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, MockDispatcher::succeeding()).await;

        let pipeline = service
            .create_pipeline("demo", "a demo", vec![generic("s1"), generic("s2").depends_on(["s1"])])
            .await
            .unwrap();

        assert_eq!(pipeline.metadata.total_steps, 2);
        assert_eq!(service.list_pipelines().await.len(), 1);
        assert!(dir.path().join("workflows/demo.json").exists());
    }

    #[tokio::test]
    async fn pipelines_survive_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let created = {
            let service = service_with(&dir, MockDispatcher::succeeding()).await;
            service.create_pipeline("keep me", "", vec![generic("a")]).await.unwrap()
        };

        let service = service_with(&dir, MockDispatcher::succeeding()).await;
        assert_eq!(service.get_pipeline("keep me").await, Some(created));
    }

    #[tokio::test]
    async fn blank_name_and_cycles_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, MockDispatcher::succeeding()).await;

        assert!(matches!(
            service.create_pipeline("  ", "", vec![generic("a")]).await,
            Err(EngineError::InvalidPipeline(_))
        ));
        assert!(matches!(
            service
                .create_pipeline(
                    "loop",
                    "",
                    vec![generic("a").depends_on(["b"]), generic("b").depends_on(["a"])]
                )
                .await,
            Err(EngineError::CyclicDependency { .. })
        ));
        assert!(service.list_pipelines().await.is_empty());
    }

    #[tokio::test]
    async fn names_sharing_a_document_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, MockDispatcher::succeeding()).await;
        service.create_pipeline("Build A", "", vec![generic("first")]).await.unwrap();

        let res = service.create_pipeline("build_a", "", vec![generic("second")]).await;
        assert!(matches!(res, Err(EngineError::InvalidPipeline(_))));
        let names: Vec<String> = service.list_pipelines().await.into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Build A"]);

        // Re-creating under the exact same name still replaces it.
        service.create_pipeline("Build A", "v2", vec![generic("first")]).await.unwrap();
        drop(service);

        let service = service_with(&dir, MockDispatcher::succeeding()).await;
        let kept = service.get_pipeline("Build A").await.unwrap();
        assert_eq!(kept.description, "v2");
        assert_eq!(kept.steps[0].id, "first");
        assert!(service.get_pipeline("build_a").await.is_none());

        assert!(service.delete_pipeline("Build A").await.unwrap());
        drop(service);
        let service = service_with(&dir, MockDispatcher::succeeding()).await;
        assert!(service.list_pipelines().await.is_empty());
    }

    #[tokio::test]
    async fn clashing_documents_on_disk_load_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let first = Pipeline::new("Build A", "", vec![generic("a")]);
        let second = Pipeline::new("build_a", "", vec![generic("b")]);
        // Hand-placed under different file names, bypassing the service.
        db::store::write_json(&store.workflows_dir().join("1.json"), &first).await.unwrap();
        db::store::write_json(&store.workflows_dir().join("2.json"), &second).await.unwrap();

        let service = service_with(&dir, MockDispatcher::succeeding()).await;

        let names: Vec<String> = service.list_pipelines().await.into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Build A"]);
    }

    #[tokio::test]
    async fn unknown_pipeline_operations_report_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, MockDispatcher::succeeding()).await;

        let res = service.execute_pipeline("ghost", Map::new()).await;
        assert!(!res.success);
        assert!(res.execution_id.is_none());
        assert!(service.get_pipeline("ghost").await.is_none());
        assert!(!service.delete_pipeline("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn execution_appends_history_and_persists_record() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, MockDispatcher::succeeding()).await;
        service.create_pipeline("demo", "", vec![generic("s1")]).await.unwrap();

        let first = service.execute_pipeline("demo", Map::new()).await;
        let second = service.execute_pipeline("demo", Map::new()).await;
        assert!(first.success && second.success);

        let pipeline = service.get_pipeline("demo").await.unwrap();
        let ids: Vec<Uuid> = pipeline.execution_history.iter().map(|h| h.execution_id).collect();
        assert_eq!(ids, vec![first.execution_id.unwrap(), second.execution_id.unwrap()]);

        let on_disk: Pipeline = pipeline_repo::load_pipeline(&service.store, "demo").await.unwrap();
        assert_eq!(on_disk.execution_history.len(), 2);

        let record = service.get_execution(first.execution_id.unwrap()).await.unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(record.steps_executed.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_runs_keep_every_history_entry() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(service_with(&dir, MockDispatcher::succeeding()).await);
        service.create_pipeline("busy", "", vec![generic("s1")]).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service.execute_pipeline("busy", Map::new()).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().success);
        }

        let on_disk: Pipeline = pipeline_repo::load_pipeline(&service.store, "busy").await.unwrap();
        assert_eq!(on_disk.execution_history.len(), 8);
    }

    #[tokio::test]
    async fn failed_run_is_recorded_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = MockDispatcher::succeeding().with("s1", MockBehaviour::Fail("boom".into()));
        let service = service_with(&dir, dispatcher).await;
        service
            .create_pipeline("demo", "", vec![generic("s1").on_failure(Routing::Abort), generic("s2").depends_on(["s1"])])
            .await
            .unwrap();

        let res = service.execute_pipeline("demo", Map::new()).await;
        assert!(!res.success);
        assert_eq!(res.error.as_deref(), Some("Step 'Step s1' failed: boom"));

        let pipeline = service.get_pipeline("demo").await.unwrap();
        assert_eq!(pipeline.execution_history[0].status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn delete_keeps_past_execution_records() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, MockDispatcher::succeeding()).await;
        service.create_pipeline("temp", "", vec![generic("s1")]).await.unwrap();
        let run = service.execute_pipeline("temp", Map::new()).await;

        assert!(service.delete_pipeline("temp").await.unwrap());
        assert!(service.get_pipeline("temp").await.is_none());
        assert!(!dir.path().join("workflows/temp.json").exists());
        assert!(service.get_execution(run.execution_id.unwrap()).await.is_ok());
    }

    #[tokio::test]
    async fn standard_pipeline_is_created_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, MockDispatcher::succeeding()).await;

        let name = service.create_standard_pipeline("https://example.com/r.git").await.unwrap();
        let pipeline = service.get_pipeline(&name).await.unwrap();
        assert_eq!(pipeline.steps.len(), 6);
        assert_eq!(pipeline.metadata.estimated_duration_secs, 60 + 45 + 90 + 30 + 45 + 60);
    }

    #[tokio::test]
    async fn unknown_execution_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&dir, MockDispatcher::succeeding()).await;
        assert!(matches!(
            service.get_execution(Uuid::new_v4()).await,
            Err(EngineError::ExecutionNotFound(_))
        ));
    }
}
