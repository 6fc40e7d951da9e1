//! Run and execution types.

use crate::ids::{InstanceId, RunId};
use crate::pipeline::TriggerType;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The triggering ref/event, visible to every predicate and step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunContext {
    pub event: TriggerType,
    pub git_ref: String,
    pub is_tag: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Run {
    pub id: RunId,
    pub pipeline_name: String,
    pub status: RunStatus,
    pub context: RunContext,
    pub instances: Vec<JobInstance>,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failure,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Success)
    }
}

/// One concrete execution of a job, possibly one of several matrix
/// siblings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobInstance {
    pub id: InstanceId,
    pub job: String,
    pub display_name: String,
    /// Axis values for this instance; empty when the job is unmatrixed.
    pub matrix: BTreeMap<String, String>,
    pub state: InstanceState,
    pub steps: Vec<StepRecord>,
    pub failure: Option<FailureInfo>,
    pub skip_reason: Option<SkipReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Pending,
    Blocked,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl InstanceState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstanceState::Succeeded | InstanceState::Failed | InstanceState::Skipped
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UpstreamFailed,
    UpstreamSkipped,
    ConditionUnmet,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepRecord {
    pub name: String,
    pub status: StepStatus,
    pub exit_code: Option<i32>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failure,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Success | StepStatus::Failure | StepStatus::Skipped
        )
    }
}

/// Diagnosis for a failed instance: which step broke and how.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FailureInfo {
    pub step: String,
    pub exit_code: Option<i32>,
    pub message: String,
}
