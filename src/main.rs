use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use omics_runner::config::OmicsRunnerConfig;
use omics_runner::orchestrator::{
    ExecutionContext, Failure, InvocationStatus, Orchestrator, OrchestratorError,
    OrchestratorState, Outcome,
};
use omics_runner::persistence::FileSystemContinuationStore;
use omics_runner::scheduler::ResumptionScheduler;
use omics_runner::services::{
    EmailNotifier, LogMailTransport, RetryingJobService, SimulatedJobService,
    SubOrchestratorRegistry,
};
use omics_runner::shutdown::ShutdownCoordinator;
use omics_runner::telemetry::{init_telemetry, shutdown_telemetry};

#[derive(Parser)]
#[command(name = "omics-runner")]
#[command(about = "Durable orchestration of genomics workflow runs")]
#[command(long_about = "omics-runner submits a workflow run (or picks up an existing one), \
                       waits for it with durable checkpoints, optionally runs a visualization \
                       sub-orchestration and sends a completion notice.")]
struct Cli {
    /// Configuration file to load instead of omics-runner.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an invocation and drive it in-process until it finishes
    Run {
        /// Execution context document, or `-` for stdin
        #[arg(long, short)]
        input: String,
    },
    /// Start an invocation and return at its first suspension
    Start {
        /// Execution context document, or `-` for stdin
        #[arg(long, short)]
        input: String,
    },
    /// Resume a checkpointed invocation
    Resume {
        analysis_id: String,
        /// Resume even if the wait has not elapsed yet
        #[arg(long)]
        force: bool,
    },
    /// Resume due invocations until interrupted
    Worker,
    /// Show the stored continuation of an invocation
    Status { analysis_id: String },
    /// List stored continuations
    List,
    /// Stop the job behind an invocation and discard it
    Cancel { analysis_id: String },
    /// Print the orchestration graph
    Graph,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Graph = cli.command {
        return print_json(&graph());
    }

    let _ = OmicsRunnerConfig::load_env_file();
    let config = match &cli.config {
        Some(path) => OmicsRunnerConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => OmicsRunnerConfig::load()?,
    };

    tokio::runtime::Runtime::new()?.block_on(async {
        init_telemetry(&config.observability)?;
        let result = run_command(cli.command, &config).await;
        shutdown_telemetry();
        result
    })
}

/// A printed document plus the failure of an invocation that ended in `Failed`
struct CommandOutput {
    document: serde_json::Value,
    failure: Option<Failure>,
}

impl CommandOutput {
    fn document(document: serde_json::Value) -> Self {
        Self {
            document,
            failure: None,
        }
    }

    fn invocation(status: InvocationStatus) -> Self {
        let failure = match status.outcome() {
            Some(Outcome::Failed(failure)) => Some(failure.clone()),
            _ => None,
        };
        Self {
            document: to_json(&status),
            failure,
        }
    }
}

async fn run_command(command: Commands, config: &OmicsRunnerConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config);

    let result = match command {
        Commands::Run { input } => {
            let context = read_context(&input)?;
            let coordinator = ShutdownCoordinator::new();
            coordinator.install_signal_handlers()?;
            orchestrator
                .run_to_completion(context, coordinator.signal())
                .await
                .map(CommandOutput::invocation)
        }
        Commands::Start { input } => {
            let context = read_context(&input)?;
            orchestrator.start(context).await.map(CommandOutput::invocation)
        }
        Commands::Resume { analysis_id, force } => orchestrator
            .resume(&analysis_id, force)
            .await
            .map(CommandOutput::invocation),
        Commands::Worker => {
            let coordinator = ShutdownCoordinator::new();
            coordinator.install_signal_handlers()?;
            let scheduler =
                ResumptionScheduler::new(orchestrator.clone(), config.scheduler.tick_interval());
            scheduler
                .run(coordinator.signal())
                .await
                .map(|_| CommandOutput::document(json!({ "status": "stopped" })))
        }
        Commands::Status { analysis_id } => orchestrator
            .status(&analysis_id)
            .await
            .map(|continuation| CommandOutput::document(to_json(&continuation))),
        Commands::List => orchestrator.list().await.map(|continuations| {
            CommandOutput::document(json!(continuations
                .iter()
                .map(|continuation| json!({
                    "analysisId": continuation.analysis_id,
                    "state": continuation.state,
                    "phase": continuation.phase,
                    "resumeAt": continuation.resume_at,
                    "pollCount": continuation.poll_count,
                }))
                .collect::<Vec<_>>()))
        }),
        Commands::Cancel { analysis_id } => orchestrator
            .cancel(&analysis_id)
            .await
            .map(CommandOutput::invocation),
        Commands::Graph => Ok(CommandOutput::document(graph())),
    };

    if config.observability.metrics_enabled {
        orchestrator.metrics().log_stats();
    }

    match result {
        Ok(output) => {
            print_json(&output.document)?;
            match output.failure {
                Some(failure) => anyhow::bail!(
                    "Analysis failed with {}: {}",
                    failure.category,
                    failure.detail.as_deref().unwrap_or("no detail")
                ),
                None => Ok(()),
            }
        }
        Err(error) => {
            print_json(&error_document(&error))?;
            Err(error.into())
        }
    }
}

fn build_orchestrator(config: &OmicsRunnerConfig) -> Orchestrator {
    let jobs = RetryingJobService::new(
        SimulatedJobService::new(config.simulation.clone()),
        config.retry.clone(),
    );

    Orchestrator::new(
        Arc::new(jobs),
        Arc::new(SubOrchestratorRegistry::new()),
        Arc::new(EmailNotifier::new(LogMailTransport)),
        Arc::new(FileSystemContinuationStore::new(config.persistence.clone())),
    )
    .with_config(config.orchestrator.clone())
}

fn read_context(input: &str) -> Result<ExecutionContext> {
    let document = if input == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {input}"))?
    };

    ExecutionContext::from_json(&document).context("Invalid execution context document")
}

fn error_document(error: &OrchestratorError) -> serde_json::Value {
    let failure = error.failure();
    json!({
        "status": "error",
        "category": failure.category,
        "detail": failure.detail,
    })
}

fn graph() -> serde_json::Value {
    json!(OrchestratorState::ALL
        .iter()
        .map(|state| json!({
            "state": state,
            "initial": *state == OrchestratorState::INITIAL,
            "choice": state.is_choice(),
            "terminal": state.is_terminal(),
            "next": state.successors(),
        }))
        .collect::<Vec<_>>())
}

fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value)
        .unwrap_or_else(|e| json!({ "status": "error", "detail": e.to_string() }))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
