//! Console reporting for runs.

use console::style;
use shipwright_core::events::Event;
use shipwright_core::ports::EventSink;
use shipwright_core::run::{InstanceState, Run, RunStatus};

/// Event sink that renders run progress to the terminal.
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for ConsoleSink {
    fn emit(&self, event: Event) {
        match event {
            Event::RunStarted { pipeline, .. } => {
                println!(
                    "\n{} Running pipeline: {}",
                    style("▶").cyan().bold(),
                    style(&pipeline).bold()
                );
            }
            Event::RunCompleted { .. } => {}
            Event::JobStarted { display_name, .. } => {
                println!("{} {}", style("━━▶").cyan(), style(&display_name).bold());
            }
            Event::JobCompleted {
                display_name,
                state,
                ..
            } => match state {
                InstanceState::Succeeded => {
                    println!(
                        "    {} {} passed\n",
                        style("✓").green(),
                        style(&display_name).dim()
                    );
                }
                InstanceState::Skipped => {
                    println!("    {} {} skipped\n", style("⏭").dim(), style(&display_name).dim());
                }
                _ => {
                    println!(
                        "    {} {} failed\n",
                        style("✗").red(),
                        style(&display_name).dim()
                    );
                }
            },
            Event::JobSkipped { job, reason, .. } => {
                println!(
                    "{} {} {}",
                    style("⏭").dim(),
                    style(&job).dim(),
                    style(format!("({:?})", reason)).dim()
                );
            }
            Event::StepStarted { step, .. } => {
                println!("    {} {}", style("▸").cyan(), style(&step).bold());
            }
            Event::StepOutput { line, .. } => {
                println!("      {}", style(&line).dim());
            }
            Event::StepCompleted {
                step,
                exit_code,
                duration_ms,
                ..
            } => {
                if exit_code == 0 {
                    println!(
                        "      {} ({:.2}s)",
                        style("✓").green(),
                        duration_ms as f64 / 1000.0
                    );
                } else {
                    println!(
                        "      {} {} exit code {} ({:.2}s)",
                        style("✗").red(),
                        style(&step).dim(),
                        exit_code,
                        duration_ms as f64 / 1000.0
                    );
                }
            }
            Event::ArtifactStored { slot, digest, .. } => {
                let short = digest.get(..8).unwrap_or(&digest).to_string();
                println!(
                    "    {} Artifact {} committed ({})",
                    style("📦").cyan(),
                    style(&slot).bold(),
                    style(short).dim()
                );
            }
            Event::ArtifactPublished { name, .. } => {
                println!("    {} Published {}", style("✓").green(), style(&name).bold());
            }
            Event::PublishSkipped { name, .. } => {
                println!(
                    "    {} {} already present, skipped",
                    style("-").dim(),
                    style(&name).dim()
                );
            }
        }
    }
}

/// Print the final per-instance summary and overall status.
pub fn print_summary(run: &Run) {
    println!();
    for instance in &run.instances {
        let glyph = match instance.state {
            InstanceState::Succeeded => style("✓").green(),
            InstanceState::Failed => style("✗").red(),
            InstanceState::Skipped => style("⏭").dim(),
            _ => style("?").yellow(),
        };
        print!("  {} {}", glyph, instance.display_name);
        if let Some(failure) = &instance.failure {
            match failure.exit_code {
                Some(code) => print!(
                    "  {}",
                    style(format!("step '{}' exit code {}", failure.step, code)).red()
                ),
                None => print!("  {}", style(failure.message.as_str()).red()),
            }
        }
        if let Some(reason) = &instance.skip_reason {
            print!("  {}", style(format!("({:?})", reason)).dim());
        }
        println!();
    }

    println!();
    match run.status {
        RunStatus::Success => {
            println!("{} Run {} succeeded", style("✓").green().bold(), run.id);
        }
        RunStatus::Cancelled => {
            println!("{} Run {} cancelled", style("!").yellow().bold(), run.id);
        }
        _ => {
            println!("{} Run {} failed", style("✗").red().bold(), run.id);
        }
    }
}
