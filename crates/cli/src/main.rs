//! `rusty-automation-tool` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the API server.
//! - `create`   — register a pipeline from a JSON definition file.
//! - `standard` — create the standard six-stage DevOps pipeline.
//! - `run`      — execute a pipeline and print its summary.
//! - `list`     — list stored pipelines.
//! - `show`     — print one pipeline document.
//! - `delete`   — remove a pipeline.
//! - `validate` — check a pipeline definition file without storing it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use db::DocumentStore;
use engine::{ExecutorConfig, PipelineExecutor, PipelineService, Step};
use nodes::llm::{client_from_config, LlmConfig, LlmMode};
use nodes::{AgentDispatcher, RunParameters};

#[derive(Parser)]
#[command(
    name = "rusty-automation-tool",
    about = "Dependency-ordered DevOps pipeline engine",
    version
)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Settings {
    /// Directory holding `workflows/` and `workflow_executions/`.
    #[arg(long, global = true, env = "AUTOMATION_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// `cloud` (Gemini) or `offline` canned responses.
    #[arg(long, global = true, env = "LLM_MODE", default_value = "cloud")]
    llm_mode: LlmMode,

    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    /// Default per-attempt timeout, in seconds, for steps without their own.
    #[arg(long, global = true)]
    step_timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },
    /// Register a pipeline from a JSON definition file.
    Create {
        /// Path to a `{ "name", "description", "steps" }` document.
        path: PathBuf,
    },
    /// Create the standard DevOps pipeline for a repository.
    Standard {
        #[arg(long, default_value = "")]
        repo: String,
    },
    /// Execute a pipeline by name.
    Run {
        name: String,
        /// Run parameter as `key=value`; values that parse as JSON keep their type.
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
    /// List stored pipelines.
    List,
    /// Print a pipeline document.
    Show { name: String },
    /// Delete a pipeline (its execution records are kept).
    Delete { name: String },
    /// Validate a pipeline definition file.
    Validate {
        /// Path to the pipeline JSON file.
        path: PathBuf,
    },
}

#[derive(Deserialize)]
struct PipelineDefinition {
    name: String,
    #[serde(default)]
    description: String,
    steps: Vec<Step>,
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((key.to_owned(), value))
}

fn read_definition(path: &Path) -> anyhow::Result<PipelineDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid pipeline JSON in {}", path.display()))
}

async fn build_service(settings: &Settings) -> anyhow::Result<PipelineService> {
    let llm = LlmConfig {
        mode: settings.llm_mode,
        api_key: settings.gemini_api_key.clone(),
        ..LlmConfig::default()
    };
    let client = client_from_config(&llm)?;
    let executor = PipelineExecutor::new(
        Arc::new(AgentDispatcher::new(client)),
        ExecutorConfig {
            default_step_timeout: settings.step_timeout.map(Duration::from_secs),
            ..ExecutorConfig::default()
        },
    );

    let store = DocumentStore::open(&settings.data_dir)
        .await
        .with_context(|| format!("cannot open data directory {}", settings.data_dir.display()))?;
    Ok(PipelineService::new(store, executor).await?)
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let definition = read_definition(path)?;
    match engine::resolve_order(&definition.steps) {
        Ok(order) => {
            println!("✅ Pipeline '{}' is valid. Execution order: {order:?}", definition.name);
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Validation failed: {e}");
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Cli { settings, command } = Cli::parse();

    if let Command::Validate { path } = &command {
        return validate(path);
    }

    let service = build_service(&settings).await?;

    match command {
        Command::Serve { bind } => {
            info!("Starting API server on {bind}");
            api::serve(&bind, Arc::new(service)).await?;
        }
        Command::Create { path } => {
            let definition = read_definition(&path)?;
            let pipeline = service
                .create_pipeline(&definition.name, &definition.description, definition.steps)
                .await?;
            println!("Created pipeline '{}' ({} steps)", pipeline.name, pipeline.steps.len());
        }
        Command::Standard { repo } => {
            let name = service.create_standard_pipeline(&repo).await?;
            println!("Created pipeline '{name}'");
        }
        Command::Run { name, params } => {
            let parameters: RunParameters = params.into_iter().collect();
            let result = service.execute_pipeline(&name, parameters).await;
            println!("{}", result.summary);
            if !result.success {
                std::process::exit(1);
            }
        }
        Command::List => {
            let pipelines = service.list_pipelines().await;
            if pipelines.is_empty() {
                println!("No pipelines stored in {}", settings.data_dir.display());
            }
            for p in pipelines {
                println!(
                    "{}\t{} steps\t{} runs\t{}",
                    p.name,
                    p.steps.len(),
                    p.execution_history.len(),
                    p.description
                );
            }
        }
        Command::Show { name } => {
            let Some(pipeline) = service.get_pipeline(&name).await else {
                bail!("pipeline '{name}' not found");
            };
            println!("{}", serde_json::to_string_pretty(&pipeline)?);
        }
        Command::Delete { name } => {
            if !service.delete_pipeline(&name).await? {
                bail!("pipeline '{name}' not found");
            }
            println!("Deleted pipeline '{name}'");
        }
        Command::Validate { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_values_keep_json_types() {
        assert_eq!(parse_param("retries=3").unwrap(), ("retries".into(), Value::from(3)));
        assert_eq!(parse_param("dry_run=true").unwrap(), ("dry_run".into(), Value::Bool(true)));
        assert_eq!(
            parse_param("repository_url=https://x/y.git").unwrap(),
            ("repository_url".into(), Value::String("https://x/y.git".into()))
        );
    }

    #[test]
    fn malformed_params_are_rejected() {
        assert!(parse_param("no-separator").is_err());
        assert!(parse_param("=value").is_err());
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "rusty-automation-tool",
            "run",
            "demo",
            "--param",
            "branch=main",
            "--llm-mode",
            "offline",
        ])
        .unwrap();
        assert_eq!(cli.settings.llm_mode, LlmMode::Offline);
        match cli.command {
            Command::Run { name, params } => {
                assert_eq!(name, "demo");
                assert_eq!(params, vec![("branch".to_owned(), Value::from("main"))]);
            }
            _ => panic!("expected run"),
        }
    }
}
