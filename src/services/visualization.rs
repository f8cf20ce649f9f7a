//! Visualization sub-orchestration
//!
//! The address in the execution context is opaque data, resolved only when the
//! visualization step runs: first against the in-process registry, then against
//! the `exec:` scheme which runs a local program.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::orchestrator::context::{JobRecord, Visualization};

/// Address prefix for sub-orchestrators run as local processes
pub const EXEC_SCHEME: &str = "exec:";

/// Input handed to the nested execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationInput {
    pub analysis_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub job: JobRecord,
    pub visualization: Visualization,
    /// Analysis id of the parent invocation
    pub started_by: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("No sub-orchestrator registered at address {address}")]
    UnknownAddress { address: String },
    #[error("Sub-orchestration {execution_name} at {address} failed: {message}")]
    Failed {
        address: String,
        execution_name: String,
        message: String,
    },
    #[error("Sub-orchestrator at {address} returned invalid output: {message}")]
    InvalidOutput { address: String, message: String },
}

/// A nested workflow that can be run to completion
#[async_trait]
pub trait SubOrchestrator: Send + Sync {
    async fn run(
        &self,
        execution_name: &str,
        input: &VisualizationInput,
    ) -> Result<Value, InvocationError>;
}

/// Resolves an address and runs the sub-orchestrator found there
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SubOrchestratorInvoker: Send + Sync {
    async fn invoke(
        &self,
        address: &str,
        execution_name: &str,
        input: &VisualizationInput,
    ) -> Result<Value, InvocationError>;
}

/// Runs `exec:<program> [args...]`, writing the input as JSON on stdin and
/// reading a JSON document from stdout
pub struct ProcessSubOrchestrator {
    address: String,
    program: String,
    args: Vec<String>,
}

impl ProcessSubOrchestrator {
    /// Parse an `exec:` address; `None` for any other scheme
    pub fn from_address(address: &str) -> Option<Self> {
        let command = address.strip_prefix(EXEC_SCHEME)?;
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            address: address.to_string(),
            program,
            args: parts.collect(),
        })
    }

    fn failed(&self, execution_name: &str, message: impl Into<String>) -> InvocationError {
        InvocationError::Failed {
            address: self.address.clone(),
            execution_name: execution_name.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl SubOrchestrator for ProcessSubOrchestrator {
    async fn run(
        &self,
        execution_name: &str,
        input: &VisualizationInput,
    ) -> Result<Value, InvocationError> {
        let payload =
            serde_json::to_vec(input).map_err(|e| self.failed(execution_name, e.to_string()))?;

        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .env("OMICS_RUNNER_EXECUTION_NAME", execution_name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                self.failed(execution_name, format!("failed to start {}: {e}", self.program))
            })?;

        // Feed stdin while draining stdout so neither pipe can fill up and stall
        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(&payload).await {
                // Programs that ignore their input may exit before reading it
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                result => result,
            }
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());

        let output = output.map_err(|e| self.failed(execution_name, e.to_string()))?;
        fed.map_err(|e| self.failed(execution_name, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failed(
                execution_name,
                format!(
                    "exited with status {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(stdout.trim()).map_err(|e| InvocationError::InvalidOutput {
            address: self.address.clone(),
            message: e.to_string(),
        })
    }
}

/// Address table for in-process sub-orchestrators, with `exec:` fallback
#[derive(Default, Clone)]
pub struct SubOrchestratorRegistry {
    entries: Arc<RwLock<HashMap<String, Arc<dyn SubOrchestrator>>>>,
}

impl SubOrchestratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(
        &self,
        address: impl Into<String>,
        orchestrator: Arc<dyn SubOrchestrator>,
    ) {
        let address = address.into();
        debug!(address = %address, "Registering sub-orchestrator");
        self.entries.write().await.insert(address, orchestrator);
    }

    pub async fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.entries.read().await.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    async fn resolve(&self, address: &str) -> Result<Arc<dyn SubOrchestrator>, InvocationError> {
        if let Some(found) = self.entries.read().await.get(address) {
            return Ok(found.clone());
        }

        match ProcessSubOrchestrator::from_address(address) {
            Some(process) => Ok(Arc::new(process)),
            None => Err(InvocationError::UnknownAddress {
                address: address.to_string(),
            }),
        }
    }
}

#[async_trait]
impl SubOrchestratorInvoker for SubOrchestratorRegistry {
    async fn invoke(
        &self,
        address: &str,
        execution_name: &str,
        input: &VisualizationInput,
    ) -> Result<Value, InvocationError> {
        let orchestrator = self.resolve(address).await?;

        info!(
            address = %address,
            execution_name = %execution_name,
            analysis_id = %input.analysis_id,
            "Starting visualization sub-orchestration"
        );

        let result = orchestrator.run(execution_name, input).await;
        if let Err(e) = &result {
            warn!(
                address = %address,
                execution_name = %execution_name,
                error = %e,
                "Sub-orchestration failed"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::status::JobStatus;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl SubOrchestrator for Echo {
        async fn run(
            &self,
            execution_name: &str,
            input: &VisualizationInput,
        ) -> Result<Value, InvocationError> {
            Ok(json!({ "execution": execution_name, "startedBy": input.started_by }))
        }
    }

    fn input() -> VisualizationInput {
        VisualizationInput {
            analysis_id: "a1".to_string(),
            user_id: None,
            job: JobRecord::new("r-1", JobStatus::Completed),
            visualization: Visualization::new("v1"),
            started_by: "a1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_registered_address_is_invoked() {
        let registry = SubOrchestratorRegistry::new();
        registry.register("v1", Arc::new(Echo)).await;

        let result = registry.invoke("v1", "a1-visualization", &input()).await.unwrap();
        assert_eq!(result["execution"], "a1-visualization");
        assert_eq!(result["startedBy"], "a1");
    }

    #[tokio::test]
    async fn test_unknown_address_fails() {
        let registry = SubOrchestratorRegistry::new();
        let error = registry.invoke("nowhere", "x", &input()).await.unwrap_err();
        assert_eq!(
            error,
            InvocationError::UnknownAddress {
                address: "nowhere".to_string()
            }
        );
    }

    #[test]
    fn test_exec_address_parsing() {
        let process = ProcessSubOrchestrator::from_address("exec:render --fast").unwrap();
        assert_eq!(process.program, "render");
        assert_eq!(process.args, vec!["--fast".to_string()]);

        assert!(ProcessSubOrchestrator::from_address("exec:").is_none());
        assert!(ProcessSubOrchestrator::from_address("arn:aws:states:x").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_program_output_and_exit_status() {
        let registry = SubOrchestratorRegistry::new();

        let ok = registry
            .invoke("exec:echo {\"rendered\":true}", "a1-visualization", &input())
            .await
            .unwrap();
        assert_eq!(ok, json!({ "rendered": true }));

        let failed = registry.invoke("exec:false", "a1-visualization", &input()).await;
        assert!(matches!(failed, Err(InvocationError::Failed { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_program_writing_before_reading_large_input() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("render.sh");
        std::fs::write(
            &script,
            "head -c 262144 /dev/zero | tr '\\000' ' '\ncat > /dev/null\nprintf '{\"drained\":true}'\n",
        )
        .unwrap();

        let mut large = input();
        large.visualization.name = Some("x".repeat(300_000));

        let registry = SubOrchestratorRegistry::new();
        let address = format!("exec:sh {}", script.display());
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            registry.invoke(&address, "a1-visualization", &large),
        )
        .await
        .expect("sub-orchestrator stalled")
        .unwrap();

        assert_eq!(result, json!({ "drained": true }));
    }
}
