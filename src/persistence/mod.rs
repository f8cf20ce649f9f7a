//! Continuation store
//!
//! A continuation is everything needed to pick an invocation back up after a
//! durable wait: the execution context, the next state to run, and when it
//! becomes due. Stores are keyed by analysis id.

pub mod filesystem;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::orchestrator::context::ExecutionContext;
use crate::orchestrator::state::OrchestratorState;
use crate::orchestrator::transition::Effect;

pub use filesystem::FileSystemContinuationStore;
pub use memory::InMemoryContinuationStore;

pub const CONTINUATION_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Continuation corruption detected for {analysis_id}: {reason}")]
    Corruption { analysis_id: String, reason: String },

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContinuationPhase {
    /// A step is in flight or the invocation is being driven
    Running,
    /// Parked at the wait state until `resume_at`
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckpointReason {
    Started,
    StepCompleted,
    Suspended,
    Resumed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointMetadata {
    pub checkpoint_id: String,
    pub reason: CheckpointReason,
    pub integrity_hash: String,
    pub pid: Option<u32>,
    pub hostname: String,
}

impl CheckpointMetadata {
    fn pending() -> Self {
        Self {
            checkpoint_id: String::new(),
            reason: CheckpointReason::Started,
            integrity_hash: String::new(),
            pid: None,
            hostname: String::new(),
        }
    }

    /// Fresh metadata identifying this process and save
    pub fn capture(reason: CheckpointReason, integrity_hash: String) -> Self {
        use rand::Rng;

        Self {
            checkpoint_id: format!("{}_{}", Utc::now().timestamp(), rand::rng().random::<u32>()),
            reason,
            integrity_hash,
            pid: Some(std::process::id()),
            hostname: hostname::get()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
        }
    }
}

/// One executed edge of the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub from: OrchestratorState,
    pub to: OrchestratorState,
    pub effect: Effect,
    pub at: DateTime<Utc>,
}

/// Persisted form of an in-flight invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Continuation {
    pub version: String,
    pub analysis_id: String,
    /// Next state to execute on resumption
    pub state: OrchestratorState,
    pub context: ExecutionContext,
    pub phase: ContinuationPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<TransitionRecord>,
    #[serde(default)]
    pub poll_count: u32,
    pub checkpoint: CheckpointMetadata,
    pub created_at: DateTime<Utc>,
    pub last_persisted: DateTime<Utc>,
}

impl Continuation {
    pub fn new(context: ExecutionContext) -> Self {
        let now = Utc::now();
        Self {
            version: CONTINUATION_VERSION.to_string(),
            analysis_id: context.analysis_id.clone(),
            state: OrchestratorState::INITIAL,
            context,
            phase: ContinuationPhase::Running,
            resume_at: None,
            history: Vec::new(),
            poll_count: 0,
            checkpoint: CheckpointMetadata::pending(),
            created_at: now,
            last_persisted: now,
        }
    }

    /// Append an executed edge, dropping the oldest records beyond `max_entries`
    pub fn record_transition(
        &mut self,
        from: OrchestratorState,
        to: OrchestratorState,
        effect: Effect,
        max_entries: usize,
    ) {
        self.history.push(TransitionRecord {
            from,
            to,
            effect,
            at: Utc::now(),
        });

        if self.history.len() > max_entries {
            let excess = self.history.len() - max_entries;
            self.history.drain(0..excess);
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.phase == ContinuationPhase::Suspended
            && self.resume_at.map(|at| at <= now).unwrap_or(true)
    }
}

/// Storage for continuations keyed by analysis id
#[async_trait]
pub trait ContinuationStore: Send + Sync {
    /// Persist the continuation, returning the new checkpoint id
    async fn save(
        &self,
        continuation: &Continuation,
        reason: CheckpointReason,
    ) -> Result<String, PersistenceError>;

    async fn load(&self, analysis_id: &str) -> Result<Option<Continuation>, PersistenceError>;

    /// Returns whether a continuation was removed
    async fn remove(&self, analysis_id: &str) -> Result<bool, PersistenceError>;

    async fn list(&self) -> Result<Vec<Continuation>, PersistenceError>;

    /// Analysis ids of suspended continuations whose resume time has passed
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<String>, PersistenceError> {
        let mut due: Vec<Continuation> = self
            .list()
            .await?
            .into_iter()
            .filter(|continuation| continuation.is_due(now))
            .collect();
        due.sort_by_key(|continuation| continuation.resume_at);
        Ok(due.into_iter().map(|continuation| continuation.analysis_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_history_is_capped() {
        let mut continuation = Continuation::new(ExecutionContext::new("a1"));
        for _ in 0..5 {
            continuation.record_transition(
                OrchestratorState::WaitForJob,
                OrchestratorState::PollJobStatus,
                Effect::Suspend,
                3,
            );
        }
        assert_eq!(continuation.history.len(), 3);
    }

    #[test]
    fn test_only_suspended_past_due_continuations_are_due() {
        let now = Utc::now();
        let mut continuation = Continuation::new(ExecutionContext::new("a1"));
        assert!(!continuation.is_due(now));

        continuation.phase = ContinuationPhase::Suspended;
        continuation.resume_at = Some(now + Duration::seconds(60));
        assert!(!continuation.is_due(now));
        assert!(continuation.is_due(now + Duration::seconds(61)));
    }
}
