//! Operation tracking for long-running external operations
//!
//! [`OperationTracker`] models multi-phase operations (workflow sequences,
//! commands, ceremonies) as workflow-execution rows so the surrounding
//! process can offer recovery after a restart. Persistence is best-effort:
//! failures from the store are logged and swallowed, never surfaced to the
//! caller — an operation id is always returned so the work can proceed
//! even when persistence is degraded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db::store::StateTracker;
use crate::types::{WorkflowExecution, WorkflowStatus};

/// Record of an operation in progress or completed
#[derive(Debug, Clone, Serialize)]
pub struct OperationRecord {
    /// Unique operation identifier (UUIDv4)
    pub operation_id: String,
    /// Human-readable description (workflow name)
    pub description: String,
    /// Current status
    pub status: WorkflowStatus,
    /// Start timestamp
    pub started_at: DateTime<Utc>,
    /// Completion timestamp, when terminal
    pub completed_at: Option<DateTime<Utc>>,
    /// Progress percentage (100 when completed, else 0)
    pub progress: u8,
    /// Persisted result payload, if any
    pub result: Option<String>,
}

impl From<WorkflowExecution> for OperationRecord {
    fn from(execution: WorkflowExecution) -> Self {
        let progress = if execution.status == WorkflowStatus::Completed {
            100
        } else {
            0
        };
        Self {
            operation_id: execution.workflow_id,
            description: execution.workflow_name,
            status: execution.status,
            started_at: execution.started_at,
            completed_at: execution.completed_at,
            progress,
            result: execution.result,
        }
    }
}

/// Tracks long-running operations with state persistence.
pub struct OperationTracker {
    tracker: StateTracker,
}

impl OperationTracker {
    pub fn new(tracker: StateTracker) -> Self {
        Self { tracker }
    }

    /// Start a new operation and persist it immediately in `running`
    /// state. Returns the fresh operation id even when persistence fails.
    pub fn start_operation(
        &self,
        operation_type: &str,
        description: &str,
        epic_num: i64,
        story_num: i64,
        metadata: Option<&serde_json::Value>,
    ) -> String {
        let operation_id = Uuid::new_v4().to_string();

        tracing::info!(
            operation_id = %operation_id,
            operation_type = operation_type,
            description = description,
            metadata = ?metadata,
            "Operation started"
        );

        let workflow_name = format!("{}:{}", operation_type, truncate(description, 50));
        if let Err(e) =
            self.tracker
                .track_workflow_execution(&operation_id, epic_num, story_num, &workflow_name)
        {
            tracing::error!(
                operation_id = %operation_id,
                error = %e,
                "Operation persistence failed"
            );
        }

        operation_id
    }

    /// Report progress. This emits structured telemetry only; no database
    /// write happens per tick.
    pub fn update_progress(&self, operation_id: &str, progress: u8, current_step: Option<&str>) {
        tracing::debug!(
            operation_id = %operation_id,
            progress,
            current_step = current_step.unwrap_or(""),
            "Operation progress updated"
        );
    }

    /// Mark an operation as completed, persisting artifacts and result.
    pub fn mark_complete(
        &self,
        operation_id: &str,
        artifacts: Option<&[String]>,
        result: Option<&serde_json::Value>,
    ) {
        tracing::info!(
            operation_id = %operation_id,
            artifact_count = artifacts.map(|a| a.len()).unwrap_or(0),
            "Operation completed"
        );

        let mut payload = result.cloned().unwrap_or_else(|| serde_json::json!({}));
        if let (Some(map), Some(artifacts)) = (payload.as_object_mut(), artifacts) {
            map.insert("artifacts".to_string(), serde_json::json!(artifacts));
        }

        if let Err(e) =
            self.tracker
                .update_workflow_status(operation_id, WorkflowStatus::Completed, Some(&payload))
        {
            tracing::error!(
                operation_id = %operation_id,
                error = %e,
                "Operation completion persistence failed"
            );
        }
    }

    /// Mark an operation as failed with an error message and context.
    pub fn mark_failed(
        &self,
        operation_id: &str,
        error_message: &str,
        context: Option<&serde_json::Value>,
    ) {
        tracing::error!(
            operation_id = %operation_id,
            error = error_message,
            "Operation failed"
        );

        let payload = serde_json::json!({
            "error": error_message,
            "context": context,
        });

        if let Err(e) =
            self.tracker
                .update_workflow_status(operation_id, WorkflowStatus::Failed, Some(&payload))
        {
            tracing::error!(
                operation_id = %operation_id,
                error = %e,
                "Operation failure persistence failed"
            );
        }
    }

    /// Mark an operation as cancelled by the user.
    pub fn mark_cancelled(&self, operation_id: &str) {
        tracing::info!(operation_id = %operation_id, "Operation cancelled");

        if let Err(e) =
            self.tracker
                .update_workflow_status(operation_id, WorkflowStatus::Cancelled, None)
        {
            tracing::error!(
                operation_id = %operation_id,
                error = %e,
                "Operation cancellation persistence failed"
            );
        }
    }

    /// Get an operation record by id, if it was persisted.
    pub fn get_operation(&self, operation_id: &str) -> Option<OperationRecord> {
        match self.tracker.get_workflow_execution(operation_id) {
            Ok(execution) => Some(execution.into()),
            Err(e) => {
                tracing::debug!(
                    operation_id = %operation_id,
                    error = %e,
                    "Operation not found"
                );
                None
            }
        }
    }

    /// All operations still in `running` state — interrupted work a
    /// restarting process may offer to recover.
    pub fn get_interrupted_operations(&self) -> Vec<OperationRecord> {
        match self.tracker.get_running_workflows() {
            Ok(executions) => executions.into_iter().map(OperationRecord::from).collect(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to query interrupted operations");
                Vec::new()
            }
        }
    }
}

fn truncate(s: &str, max_len: usize) -> &str {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
