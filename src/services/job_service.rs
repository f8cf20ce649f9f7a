//! Job execution service abstraction
//!
//! The orchestrator only ever talks to a job service through this trait, so a
//! real workflow engine, the local simulator and test doubles are interchangeable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::orchestrator::context::{JobRecord, StartRequest};

/// Everything the service needs to launch a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmission {
    pub analysis_id: String,
    pub user_id: Option<String>,
    pub request: StartRequest,
}

/// Identifies a previously submitted job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub job_id: String,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
        }
    }
}

impl From<&JobRecord> for JobHandle {
    fn from(record: &JobRecord) -> Self {
        Self::new(record.job_id.clone())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobServiceError {
    #[error("Job submission rejected: {reason}")]
    Rejected { reason: String },
    #[error("Job {job_id} not found")]
    NotFound { job_id: String },
    #[error("Job service temporarily unavailable: {message}")]
    Transient { message: String },
}

impl JobServiceError {
    /// Only transient failures are worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait JobExecutionService: Send + Sync {
    /// Launch a run; the returned record carries the new job id and initial status
    async fn submit(&self, submission: &JobSubmission) -> Result<JobRecord, JobServiceError>;

    /// Current snapshot of the job, derived flags included
    async fn get_status(&self, handle: &JobHandle) -> Result<JobRecord, JobServiceError>;

    /// Ask the service to stop the run
    async fn cancel(&self, handle: &JobHandle) -> Result<(), JobServiceError>;
}

#[async_trait]
impl<T: JobExecutionService + ?Sized> JobExecutionService for std::sync::Arc<T> {
    async fn submit(&self, submission: &JobSubmission) -> Result<JobRecord, JobServiceError> {
        (**self).submit(submission).await
    }

    async fn get_status(&self, handle: &JobHandle) -> Result<JobRecord, JobServiceError> {
        (**self).get_status(handle).await
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), JobServiceError> {
        (**self).cancel(handle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::status::JobStatus;

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(JobServiceError::Transient { message: "503".into() }.is_transient());
        assert!(!JobServiceError::Rejected { reason: "bad".into() }.is_transient());
        assert!(!JobServiceError::NotFound { job_id: "1".into() }.is_transient());
    }

    #[test]
    fn test_handle_from_record() {
        let record = JobRecord::new("1234", JobStatus::Running);
        assert_eq!(JobHandle::from(&record), JobHandle::new("1234"));
    }
}
