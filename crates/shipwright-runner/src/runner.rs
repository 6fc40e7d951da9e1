//! Core runner trait and types.

use async_trait::async_trait;
use shipwright_core::Result;
use shipwright_core::pipeline::StepDefinition;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};

/// Output line from step execution.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub content: String,
    pub line_number: u32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Output stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Result of step execution.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub exit_code: i32,
    pub success: bool,
    pub duration_ms: u64,
}

/// Context for step execution.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub workspace: PathBuf,
    pub variables: HashMap<String, String>,
    /// Credential values exported into the environment. Only populated
    /// for credential-scoped steps.
    pub secrets: HashMap<String, String>,
    pub step: StepDefinition,
}

/// Trait for step execution.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Execute a step, streaming output to the provided channel.
    ///
    /// When the cancel flag is raised mid-flight the child process is
    /// killed and the step fails with a cancellation error.
    async fn execute(
        &self,
        ctx: &StepContext,
        output_tx: mpsc::Sender<OutputLine>,
        cancel: watch::Receiver<bool>,
    ) -> Result<StepResult>;

    /// Check if this runner can handle the given step.
    fn can_handle(&self, step: &StepDefinition) -> bool;
}

/// Resolves once the cancel flag is raised. Never resolves if the sender
/// side is dropped without cancelling, so callers can select on it.
pub async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if *rx.borrow() {
        return;
    }
    while rx.changed().await.is_ok() {
        if *rx.borrow() {
            return;
        }
    }
    std::future::pending::<()>().await
}
