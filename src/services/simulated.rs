// Local stand-in for a workflow engine
//
// Each submitted job is a small JSON file. Status is derived from wall-clock
// time since submission, so separate CLI processes observe the same job
// progressing without any background worker.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::job_service::{JobExecutionService, JobHandle, JobServiceError, JobSubmission};
use crate::config::SimulationConfig;
use crate::orchestrator::context::JobRecord;
use crate::orchestrator::status::JobStatus;

/// Parameter that makes a simulated run end in `FAILED`
pub const SIMULATE_FAILURE_PARAMETER: &str = "simulateFailure";

/// Fresh ids tried before a submission gives up
const MAX_ID_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulatedJob {
    job_id: String,
    submission: JobSubmission,
    submitted_at: DateTime<Utc>,
    run_duration_seconds: u64,
    #[serde(default)]
    cancelled_at: Option<DateTime<Utc>>,
}

impl SimulatedJob {
    fn should_fail(&self) -> bool {
        self.submission
            .request
            .parameters
            .get(SIMULATE_FAILURE_PARAMETER)
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }

    fn status_at(&self, now: DateTime<Utc>) -> JobStatus {
        if self.cancelled_at.is_some() {
            return JobStatus::Cancelled;
        }

        let total = self.run_duration_seconds as f64;
        let elapsed = (now - self.submitted_at).num_milliseconds().max(0) as f64 / 1000.0;

        if total > 0.0 && elapsed < total * 0.1 {
            JobStatus::Pending
        } else if total > 0.0 && elapsed < total * 0.2 {
            JobStatus::Starting
        } else if elapsed < total {
            JobStatus::Running
        } else if self.should_fail() {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        }
    }

    fn snapshot(&self, now: DateTime<Utc>) -> JobRecord {
        let request = &self.submission.request;
        let status = self.status_at(now);
        let run_duration = Duration::seconds(self.run_duration_seconds as i64);

        let mut record = JobRecord::new(self.job_id.clone(), status);
        record.role_ref = request.role_ref.clone();
        record.workflow_type = request.workflow_type.clone();
        record.workflow_id = request.workflow_id.clone();
        record.output_uri = request.output_uri.clone();
        record.parameters = Some(request.parameters.clone());
        record.name = request.name.clone();
        record.priority = request.priority;
        record.storage_capacity = request.storage_capacity;
        record.run_group_id = request.run_group_id.clone();
        record.log_level = request.log_level.clone();
        record.tags = (!request.tags.is_empty()).then(|| request.tags.clone());
        record.started_by = self.submission.user_id.clone();
        record.creation_time = Some(self.submitted_at);

        if !matches!(status, JobStatus::Pending | JobStatus::Cancelled) {
            record.start_time = Some(self.submitted_at + run_duration / 5);
        }
        match status {
            JobStatus::Completed => record.stop_time = Some(self.submitted_at + run_duration),
            JobStatus::Failed => {
                record.stop_time = Some(self.submitted_at + run_duration);
                record.status_message = Some("Simulated workflow failure".to_string());
            }
            JobStatus::Cancelled => {
                record.stop_time = self.cancelled_at;
                record.status_message = Some("Run cancelled by request".to_string());
            }
            _ => {}
        }

        record
    }
}

/// File-backed job service for local runs and demos
pub struct SimulatedJobService {
    config: SimulationConfig,
}

impl SimulatedJobService {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    fn job_path(&self, job_id: &str) -> PathBuf {
        self.config.state_directory.join(format!("{job_id}.json"))
    }

    fn io_error(error: std::io::Error) -> JobServiceError {
        JobServiceError::Transient {
            message: error.to_string(),
        }
    }

    async fn read_job(&self, job_id: &str) -> Result<SimulatedJob, JobServiceError> {
        if job_id.is_empty() || !job_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(JobServiceError::NotFound {
                job_id: job_id.to_string(),
            });
        }

        let contents = match fs::read_to_string(self.job_path(job_id)).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(JobServiceError::NotFound {
                    job_id: job_id.to_string(),
                })
            }
            Err(e) => return Err(Self::io_error(e)),
        };

        serde_json::from_str(&contents).map_err(|e| JobServiceError::Transient {
            message: format!("Corrupt simulated job {job_id}: {e}"),
        })
    }

    fn serialize(job: &SimulatedJob) -> Result<String, JobServiceError> {
        serde_json::to_string_pretty(job).map_err(|e| JobServiceError::Transient {
            message: e.to_string(),
        })
    }

    async fn write_job(&self, job: &SimulatedJob) -> Result<(), JobServiceError> {
        fs::write(self.job_path(&job.job_id), Self::serialize(job)?)
            .await
            .map_err(Self::io_error)
    }

    /// Writes a new job file, returning false if the id is already taken
    async fn create_job(&self, job: &SimulatedJob) -> Result<bool, JobServiceError> {
        fs::create_dir_all(&self.config.state_directory)
            .await
            .map_err(Self::io_error)?;

        let serialized = Self::serialize(job)?;
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.job_path(&job.job_id))
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(Self::io_error(e)),
        };
        file.write_all(serialized.as_bytes())
            .await
            .map_err(Self::io_error)?;
        file.flush().await.map_err(Self::io_error)?;
        Ok(true)
    }

    async fn submit_with_ids(
        &self,
        submission: &JobSubmission,
        candidates: impl IntoIterator<Item = String>,
    ) -> Result<JobRecord, JobServiceError> {
        let has_workflow = submission
            .request
            .workflow_id
            .as_deref()
            .map(|id| !id.trim().is_empty())
            .unwrap_or(false);
        if !has_workflow {
            return Err(JobServiceError::Rejected {
                reason: "workflowId is required".to_string(),
            });
        }

        for job_id in candidates {
            let job = SimulatedJob {
                job_id,
                submission: submission.clone(),
                submitted_at: Utc::now(),
                run_duration_seconds: self.config.run_duration_seconds,
                cancelled_at: None,
            };
            if !self.create_job(&job).await? {
                debug!(job_id = %job.job_id, "Simulated job id taken, drawing another");
                continue;
            }

            info!(
                analysis_id = %submission.analysis_id,
                job_id = %job.job_id,
                workflow_id = ?submission.request.workflow_id,
                "Simulated job submitted"
            );
            return Ok(job.snapshot(job.submitted_at));
        }

        Err(JobServiceError::Transient {
            message: "no free simulated job id".to_string(),
        })
    }
}

#[async_trait]
impl JobExecutionService for SimulatedJobService {
    async fn submit(&self, submission: &JobSubmission) -> Result<JobRecord, JobServiceError> {
        let ids: Vec<String> = (0..MAX_ID_ATTEMPTS)
            .map(|_| rand::rng().random_range(1_000_000u32..10_000_000).to_string())
            .collect();
        self.submit_with_ids(submission, ids).await
    }

    async fn get_status(&self, handle: &JobHandle) -> Result<JobRecord, JobServiceError> {
        let job = self.read_job(&handle.job_id).await?;
        let record = job.snapshot(Utc::now());
        debug!(job_id = %handle.job_id, status = ?record.status, "Simulated job status");
        Ok(record)
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), JobServiceError> {
        let mut job = self.read_job(&handle.job_id).await?;
        if job.status_at(Utc::now()).is_finished() {
            return Ok(());
        }

        job.cancelled_at = Some(Utc::now());
        self.write_job(&job).await?;
        info!(job_id = %handle.job_id, "Simulated job cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::context::StartRequest;
    use serde_json::json;
    use tempfile::TempDir;

    fn service(dir: &TempDir, run_duration_seconds: u64) -> SimulatedJobService {
        SimulatedJobService::new(SimulationConfig {
            state_directory: dir.path().to_path_buf(),
            run_duration_seconds,
        })
    }

    fn submission(parameters: serde_json::Value) -> JobSubmission {
        JobSubmission {
            analysis_id: "a1".to_string(),
            user_id: Some("u1".to_string()),
            request: StartRequest {
                workflow_id: Some("1234567".to_string()),
                name: Some("demo".to_string()),
                parameters: parameters.as_object().cloned().unwrap_or_default(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_taken_job_id_is_never_overwritten() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, 3600);

        let first = service
            .submit_with_ids(&submission(json!({})), ["1234567".to_string()])
            .await
            .unwrap();
        let before = std::fs::read_to_string(service.job_path("1234567")).unwrap();

        let mut other = submission(json!({ "simulateFailure": true }));
        other.analysis_id = "a2".to_string();
        let second = service
            .submit_with_ids(&other, ["1234567".to_string(), "7654321".to_string()])
            .await
            .unwrap();

        assert_eq!(first.job_id, "1234567");
        assert_eq!(second.job_id, "7654321");
        assert_eq!(
            std::fs::read_to_string(service.job_path("1234567")).unwrap(),
            before
        );

        let exhausted = service
            .submit_with_ids(&other, ["1234567".to_string()])
            .await
            .unwrap_err();
        assert!(exhausted.is_transient());
    }

    #[tokio::test]
    async fn test_missing_workflow_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut bad = submission(json!({}));
        bad.request.workflow_id = None;

        let error = service(&dir, 0).submit(&bad).await.unwrap_err();
        assert!(matches!(error, JobServiceError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_zero_duration_job_completes() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, 0);

        let submitted = service.submit(&submission(json!({}))).await.unwrap();
        let polled = service.get_status(&JobHandle::from(&submitted)).await.unwrap();

        assert_eq!(polled.status, Some(JobStatus::Completed));
        assert!(polled.is_finished);
        assert_eq!(polled.name.as_deref(), Some("demo"));
        assert_eq!(polled.started_by.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_failure_parameter_ends_in_failed() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, 0);

        let submitted = service
            .submit(&submission(json!({ "simulateFailure": true })))
            .await
            .unwrap();
        let polled = service.get_status(&JobHandle::from(&submitted)).await.unwrap();

        assert!(polled.is_error);
        assert_eq!(polled.failure_category(), "FAILED");
    }

    #[tokio::test]
    async fn test_long_job_starts_pending_and_can_be_cancelled() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, 3600);

        let submitted = service.submit(&submission(json!({}))).await.unwrap();
        assert_eq!(submitted.status, Some(JobStatus::Pending));

        let handle = JobHandle::from(&submitted);
        service.cancel(&handle).await.unwrap();
        let polled = service.get_status(&handle).await.unwrap();
        assert_eq!(polled.status, Some(JobStatus::Cancelled));
        assert!(polled.is_error);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let dir = TempDir::new().unwrap();
        let error = service(&dir, 0)
            .get_status(&JobHandle::new("9999999"))
            .await
            .unwrap_err();
        assert_eq!(error, JobServiceError::NotFound { job_id: "9999999".to_string() });
    }
}
