use serde::{Deserialize, Serialize};
use std::fmt;

/// Status vocabulary reported by the job execution service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Accepted but not yet scheduled
    Pending,
    /// Compute is being provisioned
    Starting,
    /// Workflow tasks are executing
    Running,
    /// A stop was requested and is in progress
    Stopping,
    /// Finished without error
    Completed,
    /// Removed before it could finish
    Deleted,
    /// Stopped on request
    Cancelled,
    /// Finished with an error
    Failed,
}

impl JobStatus {
    /// Statuses that end a job abnormally
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Deleted | Self::Cancelled | Self::Failed)
    }

    /// Statuses after which the job will never change again
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed) || self.is_error()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Completed => "COMPLETED",
            Self::Deleted => "DELETED",
            Self::Cancelled => "CANCELLED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "STARTING" => Ok(Self::Starting),
            "RUNNING" => Ok(Self::Running),
            "STOPPING" => Ok(Self::Stopping),
            "COMPLETED" => Ok(Self::Completed),
            "DELETED" => Ok(Self::Deleted),
            "CANCELLED" => Ok(Self::Cancelled),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Invalid job status: {s}")),
        }
    }
}
