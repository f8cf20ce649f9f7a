// Continuations survive the process: each step builds a fresh orchestrator over
// the same on-disk store, as separate CLI invocations would.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use omics_runner::config::{OrchestratorConfig, PersistenceConfig, SimulationConfig};
use omics_runner::orchestrator::{
    ExecutionContext, InvocationStatus, Notification, OrchestratorState, Outcome, StartRequest,
};
use omics_runner::persistence::{ContinuationPhase, FileSystemContinuationStore};
use omics_runner::scheduler::ResumptionScheduler;
use omics_runner::services::{
    EmailNotifier, LogMailTransport, SimulatedJobService, SubOrchestratorRegistry,
};
use omics_runner::Orchestrator;

fn orchestrator(
    dir: &TempDir,
    poll_interval_seconds: u64,
    run_duration_seconds: u64,
) -> Orchestrator {
    Orchestrator::new(
        Arc::new(SimulatedJobService::new(SimulationConfig {
            state_directory: dir.path().join("jobs"),
            run_duration_seconds,
        })),
        Arc::new(SubOrchestratorRegistry::new()),
        Arc::new(EmailNotifier::new(LogMailTransport)),
        Arc::new(FileSystemContinuationStore::new(PersistenceConfig {
            directory: dir.path().join("continuations"),
            enable_integrity_checks: true,
        })),
    )
    .with_config(OrchestratorConfig {
        poll_interval_seconds,
        ..Default::default()
    })
}

fn context(analysis_id: &str, parameters: serde_json::Value) -> ExecutionContext {
    ExecutionContext::new(analysis_id).with_start_request(StartRequest {
        workflow_id: Some("1234567".to_string()),
        name: Some("demo".to_string()),
        parameters: parameters.as_object().cloned().unwrap_or_default(),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_suspended_invocation_resumes_in_new_instance() {
    let dir = TempDir::new().unwrap();

    let first = orchestrator(&dir, 60, 0)
        .start(context("a1", json!({})))
        .await
        .unwrap();
    assert!(matches!(first, InvocationStatus::Suspended { .. }));

    let later = orchestrator(&dir, 60, 0);
    let stored = later.status("a1").await.unwrap();
    assert_eq!(stored.phase, ContinuationPhase::Suspended);
    assert_eq!(stored.state, OrchestratorState::PollJobStatus);
    assert!(stored.context.job.is_some());

    let not_due = later.resume("a1", false).await.unwrap();
    assert!(matches!(not_due, InvocationStatus::Suspended { .. }));

    let done = later.resume("a1", true).await.unwrap();
    assert_eq!(done.outcome(), Some(&Outcome::Succeeded));
    assert!(later.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_scheduler_resumes_due_invocations() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(&dir, 0, 0);

    orchestrator.start(context("ok", json!({}))).await.unwrap();
    orchestrator
        .start(
            context("bad", json!({ "simulateFailure": true }))
                .with_notification(Notification::email("user@example.com")),
        )
        .await
        .unwrap();

    let scheduler = ResumptionScheduler::new(orchestrator.clone(), Duration::from_millis(10));
    let reports = scheduler.run_once().await.unwrap();
    assert_eq!(reports.len(), 2);

    for report in reports {
        let status = report.result.unwrap();
        match report.analysis_id.as_str() {
            "ok" => assert_eq!(status.outcome(), Some(&Outcome::Succeeded)),
            "bad" => match status {
                InvocationStatus::Completed { outcome: Outcome::Failed(failure), context, .. } => {
                    assert_eq!(failure.category, "FAILED");
                    let email = context.notification_result.unwrap().email;
                    assert!(email.delivered());
                    assert_eq!(email.subject, "Analysis 'demo' failed");
                }
                other => panic!("expected failure, got {other:?}"),
            },
            other => panic!("unexpected analysis {other}"),
        }
    }

    assert!(scheduler.run_once().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_propagates_to_running_job() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(&dir, 60, 3600);

    orchestrator.start(context("a1", json!({}))).await.unwrap();
    let job_id = orchestrator.status("a1").await.unwrap().context.job.unwrap().job_id;

    orchestrator.cancel("a1").await.unwrap();
    assert!(orchestrator.list().await.unwrap().is_empty());

    let record_path = dir.path().join("jobs").join(format!("{job_id}.json"));
    let record = std::fs::read_to_string(record_path).unwrap();
    assert!(!record.contains("\"cancelledAt\": null"));
}
