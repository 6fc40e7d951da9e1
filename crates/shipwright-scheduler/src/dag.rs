//! DAG resolution for pipeline jobs.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use shipwright_core::pipeline::{JobDefinition, PipelineDefinition};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DagError {
    #[error("Cycle detected in job dependencies")]
    CycleDetected,
    #[error("Unknown job dependency: {0}")]
    UnknownDependency(String),
    #[error("Duplicate job name: {0}")]
    DuplicateJob(String),
    #[error("Empty pipeline")]
    EmptyPipeline,
    #[error("More than one publish job: {0}")]
    MultiplePublishJobs(String),
    #[error("Credential-scoped step outside the publish job: {0}")]
    CredentialScope(String),
}

impl From<DagError> for shipwright_core::Error {
    fn from(err: DagError) -> Self {
        shipwright_core::Error::Config(err.to_string())
    }
}

/// A node in the job DAG.
#[derive(Debug, Clone)]
pub struct DagNode {
    pub name: String,
    pub definition: JobDefinition,
}

/// Directed acyclic graph representing job dependencies.
#[derive(Debug)]
pub struct JobDag {
    graph: DiGraph<DagNode, ()>,
    name_to_index: HashMap<String, NodeIndex>,
}

impl JobDag {
    /// Get the root jobs (jobs with no dependencies).
    pub fn roots(&self) -> Vec<&DagNode> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, petgraph::Direction::Incoming)
                    .count()
                    == 0
            })
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    /// Get jobs that can run after a given job completes.
    pub fn successors(&self, job_name: &str) -> Vec<&DagNode> {
        self.name_to_index
            .get(job_name)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, petgraph::Direction::Outgoing)
                    .filter_map(|n| self.graph.node_weight(n))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get jobs that must complete before a given job can run.
    pub fn predecessors(&self, job_name: &str) -> Vec<&DagNode> {
        self.name_to_index
            .get(job_name)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, petgraph::Direction::Incoming)
                    .filter_map(|n| self.graph.node_weight(n))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get topologically sorted jobs.
    pub fn topological_order(&self) -> Result<Vec<&DagNode>, DagError> {
        toposort(&self.graph, None)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|&idx| self.graph.node_weight(idx))
                    .collect()
            })
            .map_err(|_| DagError::CycleDetected)
    }

    /// Get all jobs.
    pub fn jobs(&self) -> Vec<&DagNode> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    /// Check if a job's upstreams are all in the completed set.
    pub fn is_ready(&self, job_name: &str, completed: &[String]) -> bool {
        self.predecessors(job_name)
            .iter()
            .all(|pred| completed.contains(&pred.name))
    }
}

/// Builder for constructing job DAGs.
///
/// Structural problems are configuration errors caught here, before any
/// run starts.
pub struct DagBuilder;

impl DagBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a DAG from a pipeline definition.
    pub fn build(&self, pipeline: &PipelineDefinition) -> Result<JobDag, DagError> {
        if pipeline.jobs.is_empty() {
            return Err(DagError::EmptyPipeline);
        }

        let mut publish_jobs = pipeline.jobs.iter().filter(|j| j.publish.is_some());
        if let (Some(_), Some(second)) = (publish_jobs.next(), publish_jobs.next()) {
            return Err(DagError::MultiplePublishJobs(second.name.clone()));
        }

        for job in &pipeline.jobs {
            if job.publish.is_none() && job.steps.iter().any(|s| s.credentials) {
                return Err(DagError::CredentialScope(job.name.clone()));
            }
        }

        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();

        // Add all jobs as nodes
        for job in &pipeline.jobs {
            let node = DagNode {
                name: job.name.clone(),
                definition: job.clone(),
            };
            let idx = graph.add_node(node);
            if name_to_index.insert(job.name.clone(), idx).is_some() {
                return Err(DagError::DuplicateJob(job.name.clone()));
            }
        }

        // Add edges for dependencies
        for job in &pipeline.jobs {
            let job_idx = name_to_index[&job.name];
            for dep in &job.depends_on {
                let dep_idx = name_to_index
                    .get(dep)
                    .ok_or_else(|| DagError::UnknownDependency(dep.clone()))?;
                graph.add_edge(*dep_idx, job_idx, ());
            }
        }

        let dag = JobDag {
            graph,
            name_to_index,
        };

        // Verify no cycles
        dag.topological_order()?;

        Ok(dag)
    }
}

impl Default for DagBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_core::pipeline::StepDefinition;

    fn make_step(name: &str) -> StepDefinition {
        StepDefinition {
            name: name.to_string(),
            run: Some("true".to_string()),
            command: vec![],
            shell: "sh".to_string(),
            working_directory: None,
            variables: Default::default(),
            credentials: false,
        }
    }

    fn make_job(name: &str, depends_on: Vec<&str>) -> JobDefinition {
        JobDefinition {
            name: name.to_string(),
            display_name: None,
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            condition: None,
            variables: Default::default(),
            matrix: None,
            steps: vec![make_step("step")],
            artifacts: None,
            publish: None,
        }
    }

    fn make_pipeline(jobs: Vec<JobDefinition>) -> PipelineDefinition {
        PipelineDefinition {
            version: "1".to_string(),
            name: "test".to_string(),
            description: None,
            triggers: vec![],
            variables: Default::default(),
            jobs,
        }
    }

    #[test]
    fn test_linear_dag() {
        let pipeline = make_pipeline(vec![
            make_job("build", vec![]),
            make_job("smoke", vec!["build"]),
            make_job("release", vec!["smoke"]),
        ]);

        let dag = DagBuilder::new().build(&pipeline).unwrap();

        let roots = dag.roots();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].name, "build");

        let order = dag.topological_order().unwrap();
        assert_eq!(order.len(), 3);
        assert_eq!(order[0].name, "build");
    }

    #[test]
    fn test_fan_in_dag() {
        let pipeline = make_pipeline(vec![
            make_job("build", vec![]),
            make_job("sdist", vec![]),
            make_job("release", vec!["build", "sdist"]),
        ]);

        let dag = DagBuilder::new().build(&pipeline).unwrap();

        assert_eq!(dag.roots().len(), 2);
        assert_eq!(dag.predecessors("release").len(), 2);
        assert_eq!(dag.successors("build").len(), 1);
    }

    #[test]
    fn test_is_ready_requires_all_upstreams() {
        let pipeline = make_pipeline(vec![
            make_job("build", vec![]),
            make_job("sdist", vec![]),
            make_job("release", vec!["build", "sdist"]),
        ]);

        let dag = DagBuilder::new().build(&pipeline).unwrap();

        assert!(!dag.is_ready("release", &["build".to_string()]));
        assert!(dag.is_ready("release", &["build".to_string(), "sdist".to_string()]));
    }

    #[test]
    fn test_cycle_is_config_error() {
        let pipeline = make_pipeline(vec![
            make_job("a", vec!["b"]),
            make_job("b", vec!["a"]),
        ]);

        let err = DagBuilder::new().build(&pipeline).unwrap_err();
        assert!(matches!(err, DagError::CycleDetected));
    }

    #[test]
    fn test_dangling_dependency_is_config_error() {
        let pipeline = make_pipeline(vec![make_job("build", vec!["nonexistent"])]);

        let err = DagBuilder::new().build(&pipeline).unwrap_err();
        assert!(matches!(err, DagError::UnknownDependency(_)));
    }

    #[test]
    fn test_duplicate_job_name_is_config_error() {
        let pipeline = make_pipeline(vec![make_job("build", vec![]), make_job("build", vec![])]);

        let err = DagBuilder::new().build(&pipeline).unwrap_err();
        assert!(matches!(err, DagError::DuplicateJob(_)));
    }

    #[test]
    fn test_credential_step_outside_publish_job() {
        let mut job = make_job("build", vec![]);
        job.steps[0].credentials = true;

        let err = DagBuilder::new()
            .build(&make_pipeline(vec![job]))
            .unwrap_err();
        assert!(matches!(err, DagError::CredentialScope(_)));
    }
}
