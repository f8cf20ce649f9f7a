// Resumption scheduler
//
// Scans the continuation store on a fixed tick and resumes every suspended
// invocation whose wait has elapsed. Invocations are resumed one after another;
// a failing invocation is logged and does not stop the loop.

use chrono::Utc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::orchestrator::{InvocationStatus, Orchestrator, OrchestratorError};
use crate::shutdown::ShutdownSignal;

/// Result of resuming one due invocation
#[derive(Debug)]
pub struct ResumeReport {
    pub analysis_id: String,
    pub result: Result<InvocationStatus, OrchestratorError>,
}

pub struct ResumptionScheduler {
    orchestrator: Orchestrator,
    tick_interval: Duration,
}

impl ResumptionScheduler {
    pub fn new(orchestrator: Orchestrator, tick_interval: Duration) -> Self {
        Self {
            orchestrator,
            tick_interval,
        }
    }

    /// Resume everything that is due right now
    pub async fn run_once(&self) -> Result<Vec<ResumeReport>, OrchestratorError> {
        let due = self.orchestrator.list_due(Utc::now()).await?;

        if !due.is_empty() {
            debug!(count = due.len(), "Resuming due invocations");
        }

        let mut reports = Vec::with_capacity(due.len());
        for analysis_id in due {
            let result = self.orchestrator.resume(&analysis_id, false).await;
            match &result {
                Ok(InvocationStatus::Completed { outcome, .. }) => {
                    info!(analysis_id = %analysis_id, outcome = ?outcome, "Invocation completed")
                }
                Ok(_) => {}
                Err(e) => error!(
                    analysis_id = %analysis_id,
                    category = e.kind(),
                    error = %e,
                    "Invocation failed during resumption"
                ),
            }
            reports.push(ResumeReport { analysis_id, result });
        }

        Ok(reports)
    }

    /// Tick until shutdown is requested
    pub async fn run(&self, mut shutdown: ShutdownSignal) -> Result<(), OrchestratorError> {
        info!(tick_ms = self.tick_interval.as_millis() as u64, "Resumption scheduler started");
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "Failed to scan continuation store");
                    }
                }
                _ = shutdown.wait() => {
                    info!("Resumption scheduler stopping");
                    self.orchestrator.metrics().log_stats();
                    return Ok(());
                }
            }
        }
    }
}
