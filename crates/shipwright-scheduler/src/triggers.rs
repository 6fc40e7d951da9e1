//! Trigger matching and evaluation.

use shipwright_core::patterns::glob_match;
use shipwright_core::pipeline::{TriggerConfig, TriggerType};
use shipwright_core::run::RunContext;

/// Event that can trigger a pipeline run.
#[derive(Debug, Clone)]
pub enum TriggerEvent {
    Push { git_ref: String, is_tag: bool },
    PullRequest { branch: String },
    Manual { git_ref: String },
}

impl TriggerEvent {
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            TriggerEvent::Push { .. } => TriggerType::Push,
            TriggerEvent::PullRequest { .. } => TriggerType::PullRequest,
            TriggerEvent::Manual { .. } => TriggerType::Manual,
        }
    }

    /// The run context every downstream predicate sees.
    pub fn context(&self) -> RunContext {
        match self {
            TriggerEvent::Push { git_ref, is_tag } => RunContext {
                event: TriggerType::Push,
                git_ref: git_ref.clone(),
                is_tag: *is_tag,
            },
            TriggerEvent::PullRequest { branch } => RunContext {
                event: TriggerType::PullRequest,
                git_ref: branch.clone(),
                is_tag: false,
            },
            TriggerEvent::Manual { git_ref } => RunContext {
                event: TriggerType::Manual,
                git_ref: git_ref.clone(),
                is_tag: false,
            },
        }
    }
}

/// Matcher deciding whether an event creates a run at all.
pub struct TriggerMatcher;

impl TriggerMatcher {
    pub fn new() -> Self {
        Self
    }

    /// A matched event yields the run context; an unmatched one yields
    /// nothing, and no run is created.
    pub fn evaluate(&self, triggers: &[TriggerConfig], event: &TriggerEvent) -> Option<RunContext> {
        if self.matches(triggers, event) {
            Some(event.context())
        } else {
            None
        }
    }

    pub fn matches(&self, triggers: &[TriggerConfig], event: &TriggerEvent) -> bool {
        if triggers.is_empty() {
            // Default: branch pushes only.
            return matches!(event, TriggerEvent::Push { is_tag: false, .. });
        }

        triggers
            .iter()
            .any(|trigger| self.trigger_matches(trigger, event))
    }

    fn trigger_matches(&self, trigger: &TriggerConfig, event: &TriggerEvent) -> bool {
        match event {
            TriggerEvent::Push { git_ref, is_tag } => {
                if trigger.trigger_type != TriggerType::Push {
                    return false;
                }
                if *is_tag {
                    self.tag_matches(&trigger.tags, git_ref)
                } else if trigger.branches.is_empty() && !trigger.tags.is_empty() {
                    // A tags-only trigger never matches branch pushes.
                    false
                } else {
                    self.branch_matches(&trigger.branches, git_ref)
                }
            }
            TriggerEvent::PullRequest { branch } => {
                trigger.trigger_type == TriggerType::PullRequest
                    && self.branch_matches(&trigger.branches, branch)
            }
            TriggerEvent::Manual { .. } => trigger.trigger_type == TriggerType::Manual,
        }
    }

    fn branch_matches(&self, patterns: &[String], branch: &str) -> bool {
        if patterns.is_empty() {
            return true; // Match all branches if no patterns specified
        }
        patterns.iter().any(|p| glob_match(p, branch))
    }

    fn tag_matches(&self, patterns: &[String], tag: &str) -> bool {
        if patterns.is_empty() {
            return false; // Don't match tags unless explicitly specified
        }
        patterns.iter().any(|p| glob_match(p, tag))
    }
}

impl Default for TriggerMatcher {
    fn default() -> Self {
        Self::new()
    }
}
