// Recording fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use omics_runner::config::OrchestratorConfig;
use omics_runner::orchestrator::{
    EmailDelivery, JobRecord, JobStatus, NotificationResult, Orchestrator,
};
use omics_runner::persistence::{ContinuationStore, InMemoryContinuationStore};
use omics_runner::services::{
    InvocationError, JobExecutionService, JobHandle, JobServiceError, JobSubmission,
    NotificationRequest, Notifier, NotifierError, SubOrchestratorInvoker, VisualizationInput,
};

/// Job service that replays scripted status snapshots
#[derive(Default)]
pub struct ScriptedJobService {
    submit_result: Mutex<Option<Result<JobRecord, JobServiceError>>>,
    statuses: Mutex<VecDeque<Result<JobRecord, JobServiceError>>>,
    pub submissions: Mutex<Vec<JobSubmission>>,
    pub status_queries: Mutex<Vec<JobHandle>>,
    pub cancellations: Mutex<Vec<JobHandle>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedJobService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_submit(self, result: Result<JobRecord, JobServiceError>) -> Self {
        *self.submit_result.lock().unwrap() = Some(result);
        self
    }

    pub fn then_status(self, result: Result<JobRecord, JobServiceError>) -> Self {
        self.statuses.lock().unwrap().push_back(result);
        self
    }

    /// Hold every status query until the gate is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn submit_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    pub fn status_count(&self) -> usize {
        self.status_queries.lock().unwrap().len()
    }
}

#[async_trait]
impl JobExecutionService for ScriptedJobService {
    async fn submit(&self, submission: &JobSubmission) -> Result<JobRecord, JobServiceError> {
        self.submissions.lock().unwrap().push(submission.clone());
        self.submit_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(JobRecord::new("1000001", JobStatus::Pending)))
    }

    async fn get_status(&self, handle: &JobHandle) -> Result<JobRecord, JobServiceError> {
        self.status_queries.lock().unwrap().push(handle.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(JobServiceError::NotFound { job_id: handle.job_id.clone() }))
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), JobServiceError> {
        self.cancellations.lock().unwrap().push(handle.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub address: String,
    pub execution_name: String,
    pub input: VisualizationInput,
}

#[derive(Default)]
pub struct RecordingInvoker {
    pub invocations: Mutex<Vec<Invocation>>,
    pub fail_with: Mutex<Option<InvocationError>>,
}

impl RecordingInvoker {
    pub fn failing(error: InvocationError) -> Self {
        Self {
            invocations: Mutex::new(Vec::new()),
            fail_with: Mutex::new(Some(error)),
        }
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubOrchestratorInvoker for RecordingInvoker {
    async fn invoke(
        &self,
        address: &str,
        execution_name: &str,
        input: &VisualizationInput,
    ) -> Result<Value, InvocationError> {
        self.invocations.lock().unwrap().push(Invocation {
            address: address.to_string(),
            execution_name: execution_name.to_string(),
            input: input.clone(),
        });

        match self.fail_with.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(json!({ "rendered": true, "execution": execution_name })),
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub requests: Mutex<Vec<NotificationRequest>>,
}

impl RecordingNotifier {
    pub fn calls(&self) -> Vec<NotificationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        request: &NotificationRequest,
    ) -> Result<NotificationResult, NotifierError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(NotificationResult {
            email: EmailDelivery {
                message_id: Some(format!("msg-{}", request.analysis_id)),
                sender: "user@example.com".to_string(),
                recipients: vec!["user@example.com".to_string()],
                subject: "done".to_string(),
                ..Default::default()
            },
        })
    }
}

pub struct Harness {
    pub jobs: Arc<ScriptedJobService>,
    pub invoker: Arc<RecordingInvoker>,
    pub notifier: Arc<RecordingNotifier>,
    pub store: Arc<InMemoryContinuationStore>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new(jobs: ScriptedJobService) -> Self {
        Self::with_invoker(jobs, RecordingInvoker::default())
    }

    pub fn with_invoker(jobs: ScriptedJobService, invoker: RecordingInvoker) -> Self {
        Self::build(jobs, invoker, Arc::new(InMemoryContinuationStore::new()))
    }

    /// A second driver over the same continuation store
    pub fn sharing_store(&self, jobs: ScriptedJobService) -> Self {
        Self::build(jobs, RecordingInvoker::default(), self.store.clone())
    }

    fn build(
        jobs: ScriptedJobService,
        invoker: RecordingInvoker,
        store: Arc<InMemoryContinuationStore>,
    ) -> Self {
        let jobs = Arc::new(jobs);
        let invoker = Arc::new(invoker);
        let notifier = Arc::new(RecordingNotifier::default());

        let orchestrator = Orchestrator::new(
            jobs.clone(),
            invoker.clone(),
            notifier.clone(),
            store.clone() as Arc<dyn ContinuationStore>,
        )
        .with_config(OrchestratorConfig {
            poll_interval_seconds: 60,
            ..Default::default()
        });

        Self {
            jobs,
            invoker,
            notifier,
            store,
            orchestrator,
        }
    }
}

pub fn job(job_id: &str, status: JobStatus) -> JobRecord {
    JobRecord::new(job_id, status)
}

pub fn failed_job(job_id: &str, message: &str) -> JobRecord {
    JobRecord::new(job_id, JobStatus::Failed).with_status_message(message)
}
