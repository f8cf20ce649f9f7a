//! Workflow orchestration graph
//!
//! `state` and `transition` describe the graph, `context` the document threaded
//! through it, and `executor` performs the side effects and durable waits.

pub mod context;
pub mod errors;
pub mod executor;
pub mod state;
pub mod status;
pub mod transition;

pub use context::{
    EmailDelivery, ExecutionContext, JobRecord, Notification, NotificationResult, StartRequest,
    Visualization,
};
pub use errors::{Failure, InvocationStatus, OrchestratorError, Outcome};
pub use executor::Orchestrator;
pub use state::OrchestratorState;
pub use status::JobStatus;
pub use transition::{resolve_choices, transition, Effect, Transition, TransitionError};
