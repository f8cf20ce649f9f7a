// Retry policy for job service calls
//
// Transient failures are retried with exponential backoff; rejections and
// missing jobs surface immediately.

use async_trait::async_trait;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use super::job_service::{JobExecutionService, JobHandle, JobServiceError, JobSubmission};
use crate::config::RetryConfig;
use crate::orchestrator::context::JobRecord;

/// Wraps any job service with the configured retry policy
pub struct RetryingJobService<J> {
    inner: J,
    config: RetryConfig,
}

impl<J: JobExecutionService> RetryingJobService<J> {
    pub fn new(inner: J, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &J {
        &self.inner
    }

    /// Delays between attempts; one fewer than `max_attempts`
    fn delays(&self) -> Vec<Duration> {
        let retries = self.config.max_attempts.saturating_sub(1) as usize;
        let backoff = ExponentialBackoff::from_millis(2)
            .factor(self.config.base_delay_millis.max(1))
            .max_delay(self.config.max_delay())
            .take(retries);

        if self.config.jitter {
            backoff.map(jitter).collect()
        } else {
            backoff.collect()
        }
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, JobServiceError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, JobServiceError>>,
    {
        let operation_id = uuid::Uuid::new_v4();
        debug!(
            operation = operation,
            operation_id = %operation_id,
            max_attempts = self.config.max_attempts,
            "Starting job service call"
        );

        RetryIf::spawn(self.delays(), call, |error: &JobServiceError| {
            let retry = error.is_transient();
            if retry {
                warn!(
                    operation = operation,
                    operation_id = %operation_id,
                    error = %error,
                    "Retryable job service failure"
                );
            }
            retry
        })
        .await
    }
}

#[async_trait]
impl<J: JobExecutionService> JobExecutionService for RetryingJobService<J> {
    async fn submit(&self, submission: &JobSubmission) -> Result<JobRecord, JobServiceError> {
        self.with_retry("submit", || self.inner.submit(submission))
            .await
    }

    async fn get_status(&self, handle: &JobHandle) -> Result<JobRecord, JobServiceError> {
        self.with_retry("get_status", || self.inner.get_status(handle))
            .await
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), JobServiceError> {
        self.with_retry("cancel", || self.inner.cancel(handle))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::status::JobStatus;
    use crate::services::job_service::MockJobExecutionService;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_millis: 1,
            max_delay_seconds: 1,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn test_transient_status_failure_is_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let mut mock = MockJobExecutionService::new();
        mock.expect_get_status().times(3).returning(move |handle| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(JobServiceError::Transient {
                    message: "throttled".to_string(),
                })
            } else {
                Ok(JobRecord::new(handle.job_id.clone(), JobStatus::Running))
            }
        });

        let service = RetryingJobService::new(mock, fast_config());
        let record = service.get_status(&JobHandle::new("r-1")).await.unwrap();

        assert_eq!(record.status, Some(JobStatus::Running));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let mut mock = MockJobExecutionService::new();
        mock.expect_submit().times(1).returning(|_| {
            Err(JobServiceError::Rejected {
                reason: "missing workflow".to_string(),
            })
        });

        let service = RetryingJobService::new(mock, fast_config());
        let submission = JobSubmission {
            analysis_id: "a1".to_string(),
            user_id: None,
            request: Default::default(),
        };

        let error = service.submit(&submission).await.unwrap_err();
        assert!(matches!(error, JobServiceError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let mut mock = MockJobExecutionService::new();
        mock.expect_get_status().times(3).returning(|_| {
            Err(JobServiceError::Transient {
                message: "down".to_string(),
            })
        });

        let service = RetryingJobService::new(mock, fast_config());
        let error = service.get_status(&JobHandle::new("r-1")).await.unwrap_err();
        assert!(error.is_transient());
    }

    #[test]
    fn test_delays_grow_and_respect_cap() {
        let service = RetryingJobService::new(
            MockJobExecutionService::new(),
            RetryConfig {
                max_attempts: 4,
                base_delay_millis: 500,
                max_delay_seconds: 3,
                jitter: false,
            },
        );

        assert_eq!(
            service.delays(),
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(3000)
            ]
        );
    }
}
