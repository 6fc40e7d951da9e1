//! Pipeline definition types.
//!
//! These types represent the user-authored pipeline YAML configuration.

use crate::patterns::glob_match;
use crate::run::RunContext;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineDefinition {
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    pub jobs: Vec<JobDefinition>,
}

impl PipelineDefinition {
    /// The job carrying the publish spec, if the pipeline has one.
    pub fn publish_job(&self) -> Option<&JobDefinition> {
        self.jobs.iter().find(|j| j.publish.is_some())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TriggerConfig {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Push,
    PullRequest,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobDefinition {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    #[schemars(with = "Option<StartCondition>")]
    pub condition: Option<StartCondition>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub matrix: Option<MatrixConfig>,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub artifacts: Option<ArtifactSpec>,
    #[serde(default)]
    pub publish: Option<PublishSpec>,
}

/// Start predicate evaluated against the run context.
///
/// Predicates are data, not interpolated expressions: each variant is a
/// closed-form check over the triggering ref/event.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StartCondition {
    Always,
    TagMatch { pattern: String },
    BranchMatch { patterns: Vec<String> },
    EventIs { event: TriggerType },
    AllOf { conditions: Vec<StartCondition> },
}

impl StartCondition {
    pub fn evaluate(&self, ctx: &RunContext) -> bool {
        match self {
            StartCondition::Always => true,
            StartCondition::TagMatch { pattern } => {
                ctx.is_tag && glob_match(pattern, &ctx.git_ref)
            }
            StartCondition::BranchMatch { patterns } => {
                !ctx.is_tag && patterns.iter().any(|p| glob_match(p, &ctx.git_ref))
            }
            StartCondition::EventIs { event } => ctx.event == *event,
            StartCondition::AllOf { conditions } => {
                conditions.iter().all(|c| c.evaluate(ctx))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepDefinition {
    pub name: String,
    /// Shell line, executed via the configured shell.
    #[serde(default)]
    pub run: Option<String>,
    /// Argv form: program followed by arguments. Takes precedence over `run`.
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    /// Whether the run's publish credentials are exported into this
    /// step's environment. Only valid inside the publish job.
    #[serde(default)]
    pub credentials: bool,
}

fn default_shell() -> String {
    "sh".to_string()
}

/// Matrix axes expanded into one job instance per combination.
///
/// A BTreeMap keeps axis order stable, so expansion order and display
/// names are deterministic.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MatrixConfig {
    pub axes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub include: Vec<BTreeMap<String, String>>,
    #[serde(default)]
    pub exclude: Vec<BTreeMap<String, String>>,
}

/// Output bundle committed to the artifact channel on job success.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactSpec {
    /// Slot key; `${{ matrix.* }}` placeholders are substituted per instance.
    pub slot: String,
    /// Files or directories, relative to the workspace.
    pub paths: Vec<String>,
}

/// Terminal publish operation: merge matching slots and push each file
/// to the package index with skip-existing semantics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PublishSpec {
    /// Slot patterns to merge, e.g. `["wheel-*", "sdist"]`.
    pub from: Vec<String>,
}
