// Execution Context - the single document threaded through every transition
//
// Presence or absence of the optional blocks is itself a control signal: the
// graph branches on `startRequest`, `job`, `visualization` and `notification`
// being present, and on the derived `isFinished` / `isError` flags of `job`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::status::JobStatus;

/// Per-invocation record mutated in place by each step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    /// Assigned by the executor when left empty by the caller
    #[serde(default)]
    pub analysis_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_request: Option<StartRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<JobRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization: Option<Visualization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_result: Option<NotificationResult>,
    /// Keys the orchestrator does not interpret, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new(analysis_id: impl Into<String>) -> Self {
        Self {
            analysis_id: analysis_id.into(),
            ..Default::default()
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_start_request(mut self, request: StartRequest) -> Self {
        self.start_request = Some(request);
        self
    }

    pub fn with_job(mut self, job: JobRecord) -> Self {
        self.job = Some(job);
        self
    }

    pub fn with_visualization(mut self, visualization: Visualization) -> Self {
        self.visualization = Some(visualization);
        self
    }

    pub fn with_notification(mut self, notification: Notification) -> Self {
        self.notification = Some(notification);
        self
    }

    pub fn has_start_request(&self) -> bool {
        self.start_request.is_some()
    }

    pub fn has_job(&self) -> bool {
        self.job.is_some()
    }

    /// Parse a context document, e.g. the input file handed to the CLI
    pub fn from_json(document: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(document)
    }
}

/// Parameters for submitting a new workflow run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_uri: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_capacity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// Snapshot of a submitted job as reported by the job execution service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    #[serde(default)]
    pub job_id: String,
    pub role_ref: Option<String>,
    pub status: Option<JobStatus>,
    pub status_message: Option<String>,
    #[serde(default)]
    pub is_finished: bool,
    #[serde(default)]
    pub is_error: bool,
    pub workflow_type: Option<String>,
    pub workflow_id: Option<String>,
    pub output_uri: Option<String>,
    pub parameters: Option<Map<String, Value>>,
    pub name: Option<String>,
    pub priority: Option<u32>,
    pub storage_capacity: Option<u32>,
    pub accelerators: Option<String>,
    pub run_group_id: Option<String>,
    pub log_level: Option<String>,
    pub tags: Option<BTreeMap<String, String>>,
    pub started_by: Option<String>,
    pub creation_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Job record with the derived flags computed from `status`
    pub fn new(job_id: impl Into<String>, status: JobStatus) -> Self {
        let mut record = Self {
            job_id: job_id.into(),
            ..Default::default()
        };
        record.set_status(status);
        record
    }

    /// Overwrite the status and recompute `is_finished` / `is_error`
    pub fn set_status(&mut self, status: JobStatus) {
        self.status = Some(status);
        self.is_finished = status.is_finished();
        self.is_error = status.is_error();
    }

    pub fn with_status_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }

    /// Failure category surfaced by the `Failed` terminal state
    pub fn failure_category(&self) -> String {
        self.status
            .map(|status| status.to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string())
    }
}

/// Reference to the sub-orchestrator that renders results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visualization {
    /// Opaque, late-bound address of the sub-orchestrator
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualizer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_ref: Option<String>,
}

impl Visualization {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }
}

/// Delivery parameters for the completion notice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_language: Option<String>,
}

impl Notification {
    pub fn email(address: impl Into<String>) -> Self {
        Self {
            email: Some(address.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResult {
    pub email: EmailDelivery,
}

/// Outcome of one email dispatch; transport failures land in `error`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailDelivery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl EmailDelivery {
    pub fn delivered(&self) -> bool {
        self.message_id.is_some() && self.error.is_none()
    }
}
