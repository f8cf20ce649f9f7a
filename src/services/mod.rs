//! Collaborators driven by the orchestrator
//!
//! Each concern is a trait so the executor can be wired to real adapters, the
//! local simulator, or test doubles.

pub mod job_service;
pub mod notifier;
pub mod retry;
pub mod simulated;
pub mod visualization;

pub use job_service::{JobExecutionService, JobHandle, JobServiceError, JobSubmission};
pub use notifier::{
    EmailMessage, EmailNotifier, LogMailTransport, MailTransport, NotificationRequest, Notifier,
    NotifierError, TransportError,
};
pub use retry::RetryingJobService;
pub use simulated::SimulatedJobService;
pub use visualization::{
    InvocationError, ProcessSubOrchestrator, SubOrchestrator, SubOrchestratorInvoker,
    SubOrchestratorRegistry, VisualizationInput,
};

#[cfg(any(test, feature = "testing"))]
pub use job_service::MockJobExecutionService;
#[cfg(any(test, feature = "testing"))]
pub use notifier::{MockMailTransport, MockNotifier};
#[cfg(any(test, feature = "testing"))]
pub use visualization::MockSubOrchestratorInvoker;
