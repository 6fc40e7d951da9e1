//! Run lifecycle events.

use crate::ids::{InstanceId, RunId};
use crate::run::{InstanceState, RunStatus, SkipReason};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Everything observable about a run, in the order it happens.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    RunStarted {
        run_id: RunId,
        pipeline: String,
    },
    RunCompleted {
        run_id: RunId,
        status: RunStatus,
    },
    JobStarted {
        run_id: RunId,
        instance_id: InstanceId,
        job: String,
        display_name: String,
    },
    JobCompleted {
        run_id: RunId,
        instance_id: InstanceId,
        job: String,
        display_name: String,
        state: InstanceState,
    },
    JobSkipped {
        run_id: RunId,
        job: String,
        display_name: String,
        reason: SkipReason,
    },
    StepStarted {
        run_id: RunId,
        instance_id: InstanceId,
        step: String,
    },
    StepOutput {
        run_id: RunId,
        instance_id: InstanceId,
        step: String,
        line: String,
    },
    StepCompleted {
        run_id: RunId,
        instance_id: InstanceId,
        step: String,
        exit_code: i32,
        duration_ms: u64,
    },
    ArtifactStored {
        run_id: RunId,
        slot: String,
        producer: String,
        digest: String,
    },
    ArtifactPublished {
        run_id: RunId,
        name: String,
    },
    PublishSkipped {
        run_id: RunId,
        name: String,
    },
}

impl Event {
    /// Routing subject for sinks that fan events out by pattern.
    pub fn subject(&self) -> String {
        match self {
            Event::RunStarted { run_id, .. } => format!("run.started.{}", run_id),
            Event::RunCompleted { run_id, .. } => format!("run.completed.{}", run_id),
            Event::JobStarted { run_id, job, .. } => {
                format!("run.{}.job.{}.started", run_id, job)
            }
            Event::JobCompleted { run_id, job, .. } => {
                format!("run.{}.job.{}.completed", run_id, job)
            }
            Event::JobSkipped { run_id, job, .. } => {
                format!("run.{}.job.{}.skipped", run_id, job)
            }
            Event::StepStarted { run_id, step, .. } => {
                format!("run.{}.step.{}.started", run_id, step)
            }
            Event::StepOutput { run_id, step, .. } => {
                format!("run.{}.step.{}.output", run_id, step)
            }
            Event::StepCompleted { run_id, step, .. } => {
                format!("run.{}.step.{}.completed", run_id, step)
            }
            Event::ArtifactStored { run_id, slot, .. } => {
                format!("run.{}.artifact.{}.stored", run_id, slot)
            }
            Event::ArtifactPublished { run_id, name } => {
                format!("run.{}.publish.{}.stored", run_id, name)
            }
            Event::PublishSkipped { run_id, name } => {
                format!("run.{}.publish.{}.skipped", run_id, name)
            }
        }
    }
}
