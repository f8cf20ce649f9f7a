// omics-runner library - durable orchestration of genomics workflow runs
// This exposes the core components for testing and integration

pub mod config;
pub mod observability;
pub mod orchestrator;
pub mod persistence;
pub mod scheduler;
pub mod services;
pub mod shutdown;
pub mod telemetry;

// Re-export key types for easy access
pub use config::{config, OmicsRunnerConfig};
pub use observability::{OperationTimer, OrchestratorMetrics, OrchestratorStats};
pub use orchestrator::{
    ExecutionContext, InvocationStatus, JobRecord, JobStatus, Orchestrator, OrchestratorError,
    OrchestratorState, Outcome,
};
pub use persistence::{
    Continuation, ContinuationStore, FileSystemContinuationStore, InMemoryContinuationStore,
};
pub use scheduler::ResumptionScheduler;
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
pub use telemetry::{
    create_orchestration_span, generate_correlation_id, init_telemetry, shutdown_telemetry,
};
