use serde::{Deserialize, Serialize};
use std::fmt;

/// States of the workflow orchestration graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum OrchestratorState {
    /// Entry point: decide between submitting and looking up a job
    CheckStartRequest,
    CheckExistingJob,
    FetchJobDetails,
    SubmitJob,
    /// Durable suspension point of the polling loop
    WaitForJob,
    PollJobStatus,
    CheckJobFinished,
    CheckJobFailed,
    CheckVisualization,
    RunVisualization,
    CheckNotification,
    SendNotification,
    CheckFinalOutcome,
    Succeeded,
    Failed,
}

impl OrchestratorState {
    pub const INITIAL: Self = Self::CheckStartRequest;

    pub const ALL: [Self; 15] = [
        Self::CheckStartRequest,
        Self::CheckExistingJob,
        Self::FetchJobDetails,
        Self::SubmitJob,
        Self::WaitForJob,
        Self::PollJobStatus,
        Self::CheckJobFinished,
        Self::CheckJobFailed,
        Self::CheckVisualization,
        Self::RunVisualization,
        Self::CheckNotification,
        Self::SendNotification,
        Self::CheckFinalOutcome,
        Self::Succeeded,
        Self::Failed,
    ];

    /// No outgoing transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Pure branch on the context, no side effect
    pub fn is_choice(&self) -> bool {
        matches!(
            self,
            Self::CheckStartRequest
                | Self::CheckExistingJob
                | Self::CheckJobFinished
                | Self::CheckJobFailed
                | Self::CheckVisualization
                | Self::CheckNotification
                | Self::CheckFinalOutcome
        )
    }

    /// Every state this one may move to, in table order
    pub fn successors(&self) -> &'static [OrchestratorState] {
        use OrchestratorState::*;
        match self {
            CheckStartRequest => &[CheckExistingJob, SubmitJob],
            CheckExistingJob => &[FetchJobDetails, Succeeded],
            FetchJobDetails => &[CheckVisualization],
            SubmitJob => &[WaitForJob],
            WaitForJob => &[PollJobStatus],
            PollJobStatus => &[CheckJobFinished],
            CheckJobFinished => &[WaitForJob, CheckJobFailed],
            CheckJobFailed => &[CheckVisualization, CheckNotification],
            CheckVisualization => &[RunVisualization, CheckNotification],
            RunVisualization => &[CheckNotification],
            CheckNotification => &[SendNotification, CheckFinalOutcome],
            SendNotification => &[CheckFinalOutcome],
            CheckFinalOutcome => &[Failed, Succeeded],
            Succeeded | Failed => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckStartRequest => "CheckStartRequest",
            Self::CheckExistingJob => "CheckExistingJob",
            Self::FetchJobDetails => "FetchJobDetails",
            Self::SubmitJob => "SubmitJob",
            Self::WaitForJob => "WaitForJob",
            Self::PollJobStatus => "PollJobStatus",
            Self::CheckJobFinished => "CheckJobFinished",
            Self::CheckJobFailed => "CheckJobFailed",
            Self::CheckVisualization => "CheckVisualization",
            Self::RunVisualization => "RunVisualization",
            Self::CheckNotification => "CheckNotification",
            Self::SendNotification => "SendNotification",
            Self::CheckFinalOutcome => "CheckFinalOutcome",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrchestratorState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("Invalid orchestrator state: {s}"))
    }
}
