//! Execution coordinator.
//!
//! Owns at most one bulk execution at a time. Each execution gets a fresh
//! request id; progress pushed by the server is applied only when addressed
//! to that id. State transitions are published through a `watch` channel:
//!
//! ```text
//! Idle → Requested → Running → Completed | Failed → Idle
//! ```
//!
//! Terminal phases are transient: watchers may see them coalesced into the
//! following `Idle`.

use crate::action::ConfiguredOperation;
use crate::channel::{ProgressEvent, PushChannel, ACTION_MESSAGE_TYPE};
use crate::error::{Result, TriageError};
use crate::report::ActionReport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Bulk request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BulkRequest {
    /// Apply the given operations to every item matching `query`.
    Inline {
        request_id: Uuid,
        query: String,
        operations: Vec<ConfiguredOperation>,
    },
    /// Apply a saved action, optionally to a different query.
    ByReference {
        request_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
        action_id: String,
    },
}

impl BulkRequest {
    pub fn request_id(&self) -> Uuid {
        match self {
            BulkRequest::Inline { request_id, .. } | BulkRequest::ByReference { request_id, .. } => {
                *request_id
            }
        }
    }
}

/// The bulk-execution endpoint.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, request: &BulkRequest) -> Result<ActionReport>;
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    #[default]
    Idle,
    Requested,
    Running,
    Completed,
    Failed,
}

impl ExecutionPhase {
    /// True while an execution owns the coordinator.
    pub fn is_active(self) -> bool {
        matches!(self, ExecutionPhase::Requested | ExecutionPhase::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionPhase::Idle => "idle",
            ExecutionPhase::Requested => "requested",
            ExecutionPhase::Running => "running",
            ExecutionPhase::Completed => "completed",
            ExecutionPhase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub processed: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSnapshot {
    pub phase: ExecutionPhase,
    pub request_id: Option<Uuid>,
    pub progress: Progress,
    pub started_at: Option<DateTime<Utc>>,
}

fn apply_progress(state: &watch::Sender<ExecutionSnapshot>, event: &ProgressEvent) -> bool {
    state.send_if_modified(|snap| {
        if !snap.phase.is_active() || snap.request_id != Some(event.request_id) {
            return false;
        }
        snap.phase = ExecutionPhase::Running;
        snap.progress = Progress {
            processed: event.processed,
            total: event.total,
        };
        true
    })
}

/// Returns the coordinator to idle when the owning execution ends, including
/// when its future is dropped mid-flight.
struct Release {
    state: Arc<watch::Sender<ExecutionSnapshot>>,
    request_id: Uuid,
}

impl Drop for Release {
    fn drop(&mut self) {
        let id = self.request_id;
        self.state.send_if_modified(|snap| {
            if snap.request_id != Some(id) {
                return false;
            }
            *snap = ExecutionSnapshot::default();
            true
        });
    }
}

// ---------------------------------------------------------------------------
// ExecutionCoordinator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ExecutionCoordinator {
    executor: Arc<dyn ActionExecutor>,
    channel: Arc<PushChannel>,
    state: Arc<watch::Sender<ExecutionSnapshot>>,
}

impl ExecutionCoordinator {
    pub fn new(executor: Arc<dyn ActionExecutor>, channel: Arc<PushChannel>) -> Self {
        let (state, _) = watch::channel(ExecutionSnapshot::default());
        Self {
            executor,
            channel,
            state: Arc::new(state),
        }
    }

    pub fn snapshot(&self) -> ExecutionSnapshot {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes.
    ///
    /// `Completed` and `Failed` are published just before the return to
    /// `Idle` and a receiver may only observe the `Idle` that follows; the
    /// execute result is the authoritative outcome.
    pub fn watch(&self) -> watch::Receiver<ExecutionSnapshot> {
        self.state.subscribe()
    }

    /// Apply a progress event. Events for any request other than the one in
    /// flight are ignored; returns whether the state changed.
    pub fn apply_progress(&self, event: &ProgressEvent) -> bool {
        apply_progress(&self.state, event)
    }

    /// Apply `operations` to every item matching `query`.
    pub async fn execute(
        &self,
        query: &str,
        operations: &[ConfiguredOperation],
    ) -> Result<ActionReport> {
        let mut report = self
            .run(|request_id| BulkRequest::Inline {
                request_id,
                query: query.to_string(),
                operations: operations.to_vec(),
            })
            .await?;
        for missing in report.complete_for(operations) {
            tracing::warn!(operation = %missing, "backend report has no entry for operation");
        }
        Ok(report)
    }

    /// Apply a saved action. The stored action is not re-checked for readiness.
    pub async fn execute_by_reference(
        &self,
        action_id: &str,
        query_override: Option<&str>,
    ) -> Result<ActionReport> {
        self.run(|request_id| BulkRequest::ByReference {
            request_id,
            query: query_override.map(str::to_string),
            action_id: action_id.to_string(),
        })
        .await
    }

    async fn run(&self, build: impl FnOnce(Uuid) -> BulkRequest) -> Result<ActionReport> {
        let request_id = self.begin()?;
        let release = Release {
            state: Arc::clone(&self.state),
            request_id,
        };

        let state = Arc::clone(&self.state);
        let subscription = self.channel.subscribe(ACTION_MESSAGE_TYPE, move |message| {
            match ProgressEvent::from_message(message) {
                Ok(event) => {
                    if !apply_progress(&state, &event) {
                        tracing::debug!(request_id = %event.request_id, "ignoring progress for another request");
                    }
                }
                Err(e) => tracing::debug!(error = %e, "ignoring malformed progress message"),
            }
        });
        if !self.channel.is_connected() {
            tracing::debug!(request_id = %request_id, "push channel not connected; progress unavailable");
        }

        let request = build(request_id);
        self.state.send_modify(|snap| snap.phase = ExecutionPhase::Running);
        tracing::info!(request_id = %request_id, "bulk execution submitted");

        let result = self.executor.execute(&request).await;
        drop(subscription);

        let outcome = match result {
            Ok(report) => {
                let summary = report.summary();
                tracing::info!(
                    request_id = %request_id,
                    success = summary.success,
                    skipped = summary.skipped,
                    error = summary.error,
                    "bulk execution completed"
                );
                self.state.send_modify(|snap| snap.phase = ExecutionPhase::Completed);
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "bulk execution failed");
                self.state.send_modify(|snap| snap.phase = ExecutionPhase::Failed);
                Err(match e {
                    TriageError::Execution(_) => e,
                    other => TriageError::Execution(other.to_string()),
                })
            }
        };
        drop(release);
        outcome
    }

    /// Claim the coordinator for a new request, or report the one in flight.
    fn begin(&self) -> Result<Uuid> {
        let request_id = Uuid::new_v4();
        let mut busy_with = None;
        self.state.send_if_modified(|snap| {
            if snap.phase.is_active() {
                busy_with = snap.request_id;
                return false;
            }
            *snap = ExecutionSnapshot {
                phase: ExecutionPhase::Requested,
                request_id: Some(request_id),
                progress: Progress::default(),
                started_at: Some(Utc::now()),
            };
            true
        });
        match busy_with {
            Some(current) => Err(TriageError::Busy(current.to_string())),
            None => Ok(request_id),
        }
    }
}

impl std::fmt::Debug for ExecutionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionCoordinator")
            .field("state", &*self.state.borrow())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
