use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::context::ExecutionContext;
use super::transition::TransitionError;
use crate::persistence::PersistenceError;
use crate::services::{InvocationError, JobServiceError, NotifierError};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Job submission for {analysis_id} failed: {source}")]
    Submission {
        analysis_id: String,
        #[source]
        source: JobServiceError,
    },

    #[error("Status query for job {job_id} of {analysis_id} failed: {source}")]
    Polling {
        analysis_id: String,
        job_id: String,
        #[source]
        source: JobServiceError,
    },

    #[error("Visualization for {analysis_id} failed: {source}")]
    SubOrchestration {
        analysis_id: String,
        #[source]
        source: InvocationError,
    },

    #[error("Notification for {analysis_id} failed: {source}")]
    Notification {
        analysis_id: String,
        #[source]
        source: NotifierError,
    },

    #[error("Stopping job {job_id} of {analysis_id} failed: {source}")]
    Cancellation {
        analysis_id: String,
        job_id: String,
        #[source]
        source: JobServiceError,
    },

    #[error("Invalid execution context for {analysis_id}: {reason}")]
    InvalidContext { analysis_id: String, reason: String },

    #[error("Invalid transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Continuation store failure: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("No invocation found for {analysis_id}")]
    NotFound { analysis_id: String },

    #[error("An invocation for {analysis_id} already exists")]
    AlreadyExists { analysis_id: String },

    #[error("Invocation {analysis_id} is already being driven")]
    InFlight { analysis_id: String },

    #[error("Cannot schedule resumption of {analysis_id} after {poll_interval_seconds}s")]
    Scheduling {
        analysis_id: String,
        poll_interval_seconds: u64,
    },
}

impl OrchestratorError {
    /// Stable name of the error kind, used as the failure category
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Submission { .. } => "SubmissionError",
            Self::Polling { .. } => "PollingError",
            Self::SubOrchestration { .. } => "SubOrchestrationFailure",
            Self::Notification { .. } => "NotificationError",
            Self::Cancellation { .. } => "CancellationError",
            Self::InvalidContext { .. } => "InvalidContext",
            Self::Transition(_) => "TransitionError",
            Self::Persistence(_) => "PersistenceError",
            Self::NotFound { .. } => "NotFound",
            Self::AlreadyExists { .. } => "AlreadyExists",
            Self::InFlight { .. } => "InFlight",
            Self::Scheduling { .. } => "SchedulingError",
        }
    }

    pub fn failure(&self) -> Failure {
        Failure {
            category: self.kind().to_string(),
            detail: Some(self.to_string()),
        }
    }
}

/// Why an invocation ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub category: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum Outcome {
    Succeeded,
    Failed(Failure),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// What a call to start, resume or cancel handed back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum InvocationStatus {
    #[serde(rename_all = "camelCase")]
    Suspended {
        analysis_id: String,
        resume_at: Option<DateTime<Utc>>,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        analysis_id: String,
        outcome: Outcome,
        context: ExecutionContext,
    },
    #[serde(rename_all = "camelCase")]
    Cancelled { analysis_id: String },
}

impl InvocationStatus {
    pub fn analysis_id(&self) -> &str {
        match self {
            Self::Suspended { analysis_id, .. }
            | Self::Completed { analysis_id, .. }
            | Self::Cancelled { analysis_id } => analysis_id,
        }
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            Self::Completed { outcome, .. } => Some(outcome),
            _ => None,
        }
    }
}
