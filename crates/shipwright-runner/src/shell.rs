//! Shell-based step execution on the host.

use crate::runner::{
    OutputLine, OutputStream, StepContext, StepResult, StepRunner, cancelled,
};
use async_trait::async_trait;
use shipwright_core::pipeline::StepDefinition;
use shipwright_core::{Error, Result};
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Runner executing commands on the host.
///
/// Steps are either an argv list (`command`) or a shell line (`run`)
/// handed to the step's shell via `-c`.
#[derive(Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }

    fn build_command(&self, ctx: &StepContext) -> Result<Command> {
        let step = &ctx.step;

        let mut cmd = if !step.command.is_empty() {
            let mut cmd = Command::new(&step.command[0]);
            cmd.args(&step.command[1..]);
            cmd
        } else if let Some(script) = &step.run {
            let mut cmd = Command::new(&step.shell);
            cmd.arg("-c").arg(script);
            cmd
        } else {
            return Err(Error::Internal(format!(
                "Step '{}' has no command to run",
                step.name
            )));
        };

        let work_dir = match &step.working_directory {
            Some(dir) => ctx.workspace.join(dir),
            None => ctx.workspace.clone(),
        };
        cmd.current_dir(work_dir);

        let mut env_vars: HashMap<String, String> = std::env::vars().collect();
        env_vars.extend(ctx.variables.clone());
        env_vars.extend(ctx.secrets.clone());
        cmd.envs(&env_vars);

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        Ok(cmd)
    }
}

#[async_trait]
impl StepRunner for ShellRunner {
    async fn execute(
        &self,
        ctx: &StepContext,
        output_tx: mpsc::Sender<OutputLine>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<StepResult> {
        let start = std::time::Instant::now();

        info!(step = %ctx.step.name, workspace = %ctx.workspace.display(), "Executing step");

        let mut child = self
            .build_command(ctx)?
            .spawn()
            .map_err(|e| Error::Internal(format!("Failed to spawn process: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("Missing stdout handle".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("Missing stderr handle".to_string()))?;

        // Stream stdout
        let stdout_tx = output_tx.clone();
        let stdout_handle = tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();
            let mut line_num = 0u32;

            while let Ok(Some(line)) = lines.next_line().await {
                line_num += 1;
                let output = OutputLine {
                    stream: OutputStream::Stdout,
                    content: line,
                    line_number: line_num,
                    timestamp: chrono::Utc::now(),
                };
                if stdout_tx.send(output).await.is_err() {
                    break;
                }
            }
        });

        // Stream stderr
        let stderr_tx = output_tx;
        let stderr_handle = tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            let mut line_num = 0u32;

            while let Ok(Some(line)) = lines.next_line().await {
                line_num += 1;
                let output = OutputLine {
                    stream: OutputStream::Stderr,
                    content: line,
                    line_number: line_num,
                    timestamp: chrono::Utc::now(),
                };
                if stderr_tx.send(output).await.is_err() {
                    break;
                }
            }
        });

        let wait_result = tokio::select! {
            res = child.wait() => res,
            _ = cancelled(&mut cancel) => {
                warn!(step = %ctx.step.name, "Step cancelled, killing process");
                let _ = child.kill().await;
                let _ = stdout_handle.await;
                let _ = stderr_handle.await;
                return Err(Error::RunCancelled);
            }
        };

        // Wait for output streaming to complete
        let _ = stdout_handle.await;
        let _ = stderr_handle.await;

        let status = wait_result
            .map_err(|e| Error::Internal(format!("Failed to wait for process: {}", e)))?;

        let exit_code = status.code().unwrap_or(-1);
        let duration_ms = start.elapsed().as_millis() as u64;

        debug!(exit_code, duration_ms, "Step completed");

        Ok(StepResult {
            exit_code,
            success: exit_code == 0,
            duration_ms,
        })
    }

    fn can_handle(&self, step: &StepDefinition) -> bool {
        !step.command.is_empty() || step.run.is_some()
    }
}
