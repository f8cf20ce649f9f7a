use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Counters for orchestration activity
#[derive(Debug, Default)]
pub struct OrchestratorMetrics {
    pub invocations_started: AtomicU64,
    pub suspensions: AtomicU64,
    pub resumptions: AtomicU64,
    pub jobs_submitted: AtomicU64,
    pub status_queries: AtomicU64,
    pub visualizations: AtomicU64,
    pub notifications: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub errors: AtomicU64,
}

impl OrchestratorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_invocation(&self) {
        self.invocations_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suspension(&self) {
        self.suspensions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resumption(&self) {
        self.resumptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_status_query(&self) {
        self.status_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_visualization(&self) {
        self.visualizations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, succeeded: bool) {
        if succeeded {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            invocations_started: self.invocations_started.load(Ordering::Relaxed),
            suspensions: self.suspensions.load(Ordering::Relaxed),
            resumptions: self.resumptions.load(Ordering::Relaxed),
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            status_queries: self.status_queries.load(Ordering::Relaxed),
            visualizations: self.visualizations.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            invocations = stats.invocations_started,
            suspensions = stats.suspensions,
            resumptions = stats.resumptions,
            submissions = stats.jobs_submitted,
            status_queries = stats.status_queries,
            visualizations = stats.visualizations,
            notifications = stats.notifications,
            succeeded = stats.succeeded,
            failed = stats.failed,
            errors = stats.errors,
            "Orchestrator metrics"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorStats {
    pub invocations_started: u64,
    pub suspensions: u64,
    pub resumptions: u64,
    pub jobs_submitted: u64,
    pub status_queries: u64,
    pub visualizations: u64,
    pub notifications: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub errors: u64,
}

/// Time an operation and log its duration on `finish`
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
    }
}

#[macro_export]
macro_rules! time_operation {
    ($operation:expr, $body:expr) => {{
        let timer = $crate::observability::OperationTimer::new($operation);
        let result = $body;
        timer.finish();
        result
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = OrchestratorMetrics::new();
        metrics.record_invocation();
        metrics.record_suspension();
        metrics.record_suspension();
        metrics.record_outcome(true);
        metrics.record_outcome(false);

        let stats = metrics.get_stats();
        assert_eq!(stats.invocations_started, 1);
        assert_eq!(stats.suspensions, 2);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
    }
}
