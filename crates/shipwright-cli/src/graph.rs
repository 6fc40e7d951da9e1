//! Job graph rendering for the `graph` subcommand.

use shipwright_core::pipeline::{PipelineDefinition, StartCondition};
use shipwright_scheduler::{DagBuilder, MatrixExpander};
use std::fmt::Write;

/// Render the pipeline's job DAG in topological order.
pub fn render(definition: &PipelineDefinition) -> Result<String, Box<dyn std::error::Error>> {
    let dag = DagBuilder::new().build(definition)?;
    let expander = MatrixExpander::new();

    let mut out = String::new();
    writeln!(
        out,
        "Pipeline: {} ({} jobs)",
        definition.name,
        definition.jobs.len()
    )?;

    for node in dag.topological_order()? {
        let combos = expander.expand(&node.definition);
        write!(out, "  ● {}", node.name)?;
        if combos.len() > 1 {
            write!(out, " ×{}", combos.len())?;
        }
        if !node.definition.depends_on.is_empty() {
            write!(out, " (needs: {})", node.definition.depends_on.join(", "))?;
        }
        if let Some(condition) = &node.definition.condition {
            write!(out, " [{}]", describe_condition(condition))?;
        }
        if node.definition.publish.is_some() {
            write!(out, " [publish]")?;
        }
        writeln!(out)?;

        for combo in combos.iter().filter(|c| !c.values.is_empty()) {
            writeln!(out, "      - {}", combo.display_name)?;
        }
    }

    Ok(out)
}

fn describe_condition(condition: &StartCondition) -> String {
    match condition {
        StartCondition::Always => "always".to_string(),
        StartCondition::TagMatch { pattern } => format!("tag {}", pattern),
        StartCondition::BranchMatch { patterns } => format!("branch {}", patterns.join("|")),
        StartCondition::EventIs { event } => format!("event {:?}", event).to_lowercase(),
        StartCondition::AllOf { conditions } => conditions
            .iter()
            .map(describe_condition)
            .collect::<Vec<_>>()
            .join(" and "),
    }
}
