// Orchestrator executor
//
// Drives a continuation through the graph: asks `transition` what to do,
// performs the side effect against the collaborators, writes the result into
// the context, and checkpoints. At WaitForJob it parks the continuation in the
// store and hands control back to the caller.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

use super::context::ExecutionContext;
use super::errors::{Failure, InvocationStatus, OrchestratorError, Outcome};
use super::state::OrchestratorState;
use super::transition::{transition, Effect};
use crate::config::OrchestratorConfig;
use crate::observability::OrchestratorMetrics;
use crate::persistence::{CheckpointReason, Continuation, ContinuationPhase, ContinuationStore};
use crate::services::{
    JobExecutionService, JobHandle, JobSubmission, NotificationRequest, Notifier,
    SubOrchestratorInvoker, VisualizationInput,
};
use crate::shutdown::ShutdownSignal;
use crate::telemetry::{create_orchestration_span, generate_correlation_id};

#[derive(Clone)]
pub struct Orchestrator {
    jobs: Arc<dyn JobExecutionService>,
    visualizer: Arc<dyn SubOrchestratorInvoker>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn ContinuationStore>,
    config: OrchestratorConfig,
    metrics: Arc<OrchestratorMetrics>,
}

impl Orchestrator {
    pub fn new(
        jobs: Arc<dyn JobExecutionService>,
        visualizer: Arc<dyn SubOrchestratorInvoker>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn ContinuationStore>,
    ) -> Self {
        Self {
            jobs,
            visualizer,
            notifier,
            store,
            config: OrchestratorConfig::default(),
            metrics: Arc::new(OrchestratorMetrics::new()),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<OrchestratorMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<OrchestratorMetrics> {
        &self.metrics
    }

    /// Begin a new invocation and drive it to its first suspension or terminal state
    pub async fn start(
        &self,
        mut context: ExecutionContext,
    ) -> Result<InvocationStatus, OrchestratorError> {
        if context.analysis_id.trim().is_empty() {
            context.analysis_id = uuid::Uuid::new_v4().to_string();
        }
        let analysis_id = context.analysis_id.clone();

        if context.has_start_request() && context.has_job() {
            return Err(OrchestratorError::InvalidContext {
                analysis_id,
                reason: "startRequest and job are mutually exclusive".to_string(),
            });
        }

        if self.store.load(&analysis_id).await?.is_some() {
            return Err(OrchestratorError::AlreadyExists { analysis_id });
        }

        let correlation_id = generate_correlation_id();
        let span = create_orchestration_span("start", &analysis_id, Some(&correlation_id));

        async {
            info!(
                analysis_id = %analysis_id,
                has_start_request = context.has_start_request(),
                has_job = context.has_job(),
                "Starting orchestration"
            );
            self.metrics.record_invocation();

            let continuation = Continuation::new(context);
            self.store.save(&continuation, CheckpointReason::Started).await?;
            self.drive(continuation).await
        }
        .instrument(span)
        .await
    }

    /// Continue a checkpointed invocation.
    ///
    /// Without `force`, a continuation that another driver is running fails with
    /// `InFlight`, and one that is not yet due is left untouched and reported as
    /// still suspended.
    pub async fn resume(
        &self,
        analysis_id: &str,
        force: bool,
    ) -> Result<InvocationStatus, OrchestratorError> {
        self.resume_checked(analysis_id, !force, !force).await
    }

    async fn resume_checked(
        &self,
        analysis_id: &str,
        reject_in_flight: bool,
        wait_until_due: bool,
    ) -> Result<InvocationStatus, OrchestratorError> {
        let mut continuation = self.load(analysis_id).await?;

        if reject_in_flight && continuation.phase == ContinuationPhase::Running {
            return Err(OrchestratorError::InFlight {
                analysis_id: analysis_id.to_string(),
            });
        }
        if wait_until_due && !continuation.is_due(Utc::now()) {
            debug!(
                analysis_id = %analysis_id,
                resume_at = ?continuation.resume_at,
                "Continuation not yet due"
            );
            return Ok(InvocationStatus::Suspended {
                    analysis_id: analysis_id.to_string(),
                resume_at: continuation.resume_at,
            });
        }

        let correlation_id = generate_correlation_id();
        let span = create_orchestration_span("resume", analysis_id, Some(&correlation_id));

        async {
            info!(
                analysis_id = %analysis_id,
                state = %continuation.state,
                poll_count = continuation.poll_count,
                "Resuming orchestration"
            );
            self.metrics.record_resumption();

            continuation.phase = ContinuationPhase::Running;
            continuation.resume_at = None;
            self.store.save(&continuation, CheckpointReason::Resumed).await?;
            self.drive(continuation).await
        }
        .instrument(span)
        .await
    }

    /// Start an invocation and keep resuming it in-process until it ends.
    ///
    /// On shutdown the invocation stays suspended in the store. If another
    /// driver picks the invocation up in the meantime, it is left to that
    /// driver and the last suspension is returned.
    pub async fn run_to_completion(
        &self,
        context: ExecutionContext,
        mut shutdown: ShutdownSignal,
    ) -> Result<InvocationStatus, OrchestratorError> {
        let mut status = self.start(context).await?;

        while let InvocationStatus::Suspended { analysis_id, .. } = &status {
            let analysis_id = analysis_id.clone();
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
                _ = shutdown.wait() => {
                    info!(
                        analysis_id = %analysis_id,
                        "Shutdown requested, leaving invocation suspended"
                    );
                    return Ok(status);
                }
            }
            status = match self.resume_checked(&analysis_id, true, false).await {
                Err(OrchestratorError::InFlight { .. }) => {
                    info!(
                        analysis_id = %analysis_id,
                        "Invocation taken over by another driver"
                    );
                    return Ok(status);
                }
                other => other?,
            };
        }

        Ok(status)
    }

    /// Stop the job behind an invocation and discard its continuation
    pub async fn cancel(&self, analysis_id: &str) -> Result<InvocationStatus, OrchestratorError> {
        let continuation = self.load(analysis_id).await?;

        if let Some(job) = &continuation.context.job {
            let job_id = job.job_id.clone();
            self.jobs
                .cancel(&JobHandle::from(job))
                .await
                .map_err(|source| OrchestratorError::Cancellation {
                    analysis_id: analysis_id.to_string(),
                    job_id,
                    source,
                })?;
        }

        self.store.remove(analysis_id).await?;
        info!(analysis_id = %analysis_id, "Invocation cancelled");

        Ok(InvocationStatus::Cancelled {
            analysis_id: analysis_id.to_string(),
        })
    }

    pub async fn status(&self, analysis_id: &str) -> Result<Continuation, OrchestratorError> {
        self.load(analysis_id).await
    }

    pub async fn list(&self) -> Result<Vec<Continuation>, OrchestratorError> {
        Ok(self.store.list().await?)
    }

    /// Suspended invocations whose wait has elapsed, oldest first
    pub async fn list_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, OrchestratorError> {
        Ok(self.store.list_due(now).await?)
    }

    async fn load(&self, analysis_id: &str) -> Result<Continuation, OrchestratorError> {
        self.store
            .load(analysis_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound {
                analysis_id: analysis_id.to_string(),
            })
    }

    async fn drive(
        &self,
        mut continuation: Continuation,
    ) -> Result<InvocationStatus, OrchestratorError> {
        loop {
            let state = continuation.state;
            if state.is_terminal() {
                return self.finish(continuation).await;
            }

            let step = match transition(state, &continuation.context) {
                Ok(step) => step,
                Err(e) => return self.abort(continuation, e.into()).await,
            };

            debug!(
                analysis_id = %continuation.analysis_id,
                state = %state,
                effect = ?step.effect,
                next = %step.next,
                "Transition"
            );

            if step.effect == Effect::Suspend {
                return match self.resume_time(&continuation.analysis_id) {
                    Ok(resume_at) => self.suspend(continuation, step.next, resume_at).await,
                    Err(e) => self.abort(continuation, e).await,
                };
            }

            if step.effect != Effect::None {
                if let Err(e) = self.perform(step.effect, &mut continuation).await {
                    return self.abort(continuation, e).await;
                }
            }

            continuation.record_transition(
                state,
                step.next,
                step.effect,
                self.config.max_history_entries,
            );
            continuation.state = step.next;

            if step.effect != Effect::None {
                self.store
                    .save(&continuation, CheckpointReason::StepCompleted)
                    .await?;
            }
        }
    }

    async fn perform(
        &self,
        effect: Effect,
        continuation: &mut Continuation,
    ) -> Result<(), OrchestratorError> {
        let analysis_id = continuation.analysis_id.clone();
        let context = &mut continuation.context;

        match effect {
            Effect::SubmitJob => {
                let request = context.start_request.clone().ok_or_else(|| {
                    OrchestratorError::InvalidContext {
                        analysis_id: analysis_id.clone(),
                        reason: "startRequest is required to submit a job".to_string(),
                    }
                })?;
                let submission = JobSubmission {
                    analysis_id: analysis_id.clone(),
                    user_id: context.user_id.clone(),
                    request,
                };

                let job =
                    crate::time_operation!("submit_job", self.jobs.submit(&submission).await)
                        .map_err(|source| OrchestratorError::Submission {
                            analysis_id: analysis_id.clone(),
                            source,
                        })?;

                info!(
                    analysis_id = %analysis_id,
                    job_id = %job.job_id,
                    status = ?job.status,
                    "Job submitted"
                );
                self.metrics.record_submission();
                context.job = Some(job);
            }
            Effect::QueryJobStatus => {
                let handle = context
                    .job
                    .as_ref()
                    .map(JobHandle::from)
                    .ok_or_else(|| OrchestratorError::InvalidContext {
                        analysis_id: analysis_id.clone(),
                        reason: "job is required to query its status".to_string(),
                    })?;

                let job = self.jobs.get_status(&handle).await.map_err(|source| {
                    OrchestratorError::Polling {
                        analysis_id: analysis_id.clone(),
                        job_id: handle.job_id.clone(),
                        source,
                    }
                })?;

                info!(
                    analysis_id = %analysis_id,
                    job_id = %job.job_id,
                    status = ?job.status,
                    is_finished = job.is_finished,
                    is_error = job.is_error,
                    "Job status retrieved"
                );
                self.metrics.record_status_query();
                continuation.poll_count += 1;
                context.job = Some(job);
            }
            Effect::RunVisualization => {
                let (visualization, job) = match (&context.visualization, &context.job) {
                    (Some(visualization), Some(job)) => (visualization.clone(), job.clone()),
                    _ => {
                        return Err(OrchestratorError::InvalidContext {
                            analysis_id,
                            reason: "visualization requires a job and a visualization reference"
                                .to_string(),
                        })
                    }
                };

                let execution_name =
                    format!("{}-{}", analysis_id, self.config.visualization_name_suffix);
                let input = VisualizationInput {
                    analysis_id: analysis_id.clone(),
                    user_id: context.user_id.clone(),
                    job,
                    visualization: visualization.clone(),
                    started_by: analysis_id.clone(),
                };

                let result = crate::time_operation!(
                    "run_visualization",
                    self.visualizer
                        .invoke(&visualization.address, &execution_name, &input)
                        .await
                )
                .map_err(|source| OrchestratorError::SubOrchestration {
                    analysis_id: analysis_id.clone(),
                    source,
                })?;

                info!(
                    analysis_id = %analysis_id,
                    address = %visualization.address,
                    execution_name = %execution_name,
                    "Visualization completed"
                );
                self.metrics.record_visualization();
                context.visualization_result = Some(result);
            }
            Effect::SendNotification => {
                let (notification, job) = match (&context.notification, &context.job) {
                    (Some(notification), Some(job)) => (notification.clone(), job.clone()),
                    _ => {
                        return Err(OrchestratorError::InvalidContext {
                            analysis_id,
                            reason: "notification requires both a job and notification parameters"
                                .to_string(),
                        })
                    }
                };

                let request = NotificationRequest {
                    analysis_id: analysis_id.clone(),
                    job,
                    notification,
                };
                let result = self.notifier.notify(&request).await.map_err(|source| {
                    OrchestratorError::Notification {
                        analysis_id: analysis_id.clone(),
                        source,
                    }
                })?;

                if !result.email.delivered() {
                    warn!(
                        analysis_id = %analysis_id,
                        error = ?result.email.error,
                        "Notification was not delivered"
                    );
                }
                self.metrics.record_notification();
                context.notification_result = Some(result);
            }
            Effect::None | Effect::Suspend => {}
        }

        Ok(())
    }

    fn resume_time(&self, analysis_id: &str) -> Result<DateTime<Utc>, OrchestratorError> {
        let seconds = self.config.poll_interval_seconds;
        i64::try_from(seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|wait| Utc::now().checked_add_signed(wait))
            .ok_or_else(|| OrchestratorError::Scheduling {
                analysis_id: analysis_id.to_string(),
                poll_interval_seconds: seconds,
            })
    }

    async fn suspend(
        &self,
        mut continuation: Continuation,
        next: OrchestratorState,
        resume_at: DateTime<Utc>,
    ) -> Result<InvocationStatus, OrchestratorError> {

        continuation.record_transition(
            continuation.state,
            next,
            Effect::Suspend,
            self.config.max_history_entries,
        );
        continuation.state = next;
        continuation.phase = ContinuationPhase::Suspended;
        continuation.resume_at = Some(resume_at);
        self.store
            .save(&continuation, CheckpointReason::Suspended)
            .await?;

        info!(
            analysis_id = %continuation.analysis_id,
            resume_at = %resume_at,
            poll_count = continuation.poll_count,
            "Orchestration suspended while job runs"
        );
        self.metrics.record_suspension();

        Ok(InvocationStatus::Suspended {
            analysis_id: continuation.analysis_id,
            resume_at: Some(resume_at),
        })
    }

    async fn finish(
        &self,
        continuation: Continuation,
    ) -> Result<InvocationStatus, OrchestratorError> {
        let outcome = match continuation.state {
            OrchestratorState::Failed => {
                let job = continuation.context.job.as_ref();
                Outcome::Failed(Failure {
                    category: job
                        .map(|job| job.failure_category())
                        .unwrap_or_else(|| "UNKNOWN".to_string()),
                    detail: job.and_then(|job| job.status_message.clone()),
                })
            }
            _ => Outcome::Succeeded,
        };

        self.store.remove(&continuation.analysis_id).await?;
        self.metrics.record_outcome(outcome.is_success());

        match &outcome {
            Outcome::Succeeded => {
                info!(analysis_id = %continuation.analysis_id, "Orchestration succeeded")
            }
            Outcome::Failed(failure) => info!(
                analysis_id = %continuation.analysis_id,
                category = %failure.category,
                detail = ?failure.detail,
                "Orchestration failed"
            ),
        }

        Ok(InvocationStatus::Completed {
            analysis_id: continuation.analysis_id,
            outcome,
            context: continuation.context,
        })
    }

    /// Any step error ends the invocation and discards its continuation
    async fn abort(
        &self,
        continuation: Continuation,
        error: OrchestratorError,
    ) -> Result<InvocationStatus, OrchestratorError> {
        self.metrics.record_error();
        error!(
            analysis_id = %continuation.analysis_id,
            state = %continuation.state,
            category = error.kind(),
            error = %error,
            "Orchestration step failed"
        );

        if let Err(e) = self.store.remove(&continuation.analysis_id).await {
            warn!(
                analysis_id = %continuation.analysis_id,
                error = %e,
                "Failed to discard continuation"
            );
        }

        Err(error)
    }
}
