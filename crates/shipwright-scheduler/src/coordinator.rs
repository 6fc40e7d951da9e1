//! Run coordination.
//!
//! Walks the job DAG for one triggering event: expands matrices, gates
//! each job on upstream success and its start condition, fans instances
//! out as independent tasks, commits artifact slots, and hands the
//! publish job to the publisher. Instances communicate only through
//! observed states and the artifact store.

use crate::dag::{DagBuilder, JobDag};
use crate::matrix::{MatrixCombination, MatrixExpander};
use crate::triggers::{TriggerEvent, TriggerMatcher};
use chrono::{DateTime, Utc};
use shipwright_artifacts::ArtifactStore;
use shipwright_core::credentials::RegistryCredentials;
use shipwright_core::events::Event;
use shipwright_core::ids::{InstanceId, RunId};
use shipwright_core::interpolation::InterpolationContext;
use shipwright_core::pipeline::{JobDefinition, PipelineDefinition, TriggerType};
use shipwright_core::ports::{EventSink, PackageIndex};
use shipwright_core::run::{
    FailureInfo, InstanceState, JobInstance, Run, RunContext, RunStatus, SkipReason, StepRecord,
    StepStatus,
};
use shipwright_core::{Error, Result};
use shipwright_publish::Publisher;
use shipwright_runner::{OutputLine, ShellRunner, StepContext, StepRunner, cancelled};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Local run configuration.
pub struct CoordinatorConfig {
    pub workspace: PathBuf,
    pub artifacts_root: PathBuf,
    pub variables: HashMap<String, String>,
    pub credentials: Option<RegistryCredentials>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        let workspace = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let artifacts_root = workspace.join(".shipwright").join("artifacts");
        Self {
            workspace,
            artifacts_root,
            variables: HashMap::new(),
            credentials: None,
        }
    }
}

/// Executes runs of one pipeline definition.
pub struct RunCoordinator {
    definition: PipelineDefinition,
    dag: JobDag,
    config: CoordinatorConfig,
    index: Option<Arc<dyn PackageIndex>>,
    sink: Arc<dyn EventSink>,
}

impl RunCoordinator {
    /// Validate the definition and build the job DAG. Structural errors
    /// surface here, before any run exists.
    pub fn new(
        definition: PipelineDefinition,
        config: CoordinatorConfig,
        index: Option<Arc<dyn PackageIndex>>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let dag = DagBuilder::new().build(&definition)?;
        Ok(Self {
            definition,
            dag,
            config,
            index,
            sink,
        })
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// Evaluate an event against the pipeline's triggers and execute a
    /// run if it matches. An unmatched event creates no run.
    pub async fn handle_event(
        &self,
        event: &TriggerEvent,
        cancel: watch::Receiver<bool>,
    ) -> Result<Option<Run>> {
        match TriggerMatcher::new().evaluate(&self.definition.triggers, event) {
            Some(context) => Ok(Some(self.execute(context, cancel).await?)),
            None => {
                info!(pipeline = %self.definition.name, "Event matches no trigger; no run created");
                Ok(None)
            }
        }
    }

    /// Execute one run to completion.
    ///
    /// Step failures are reflected in the returned run's status, not in
    /// the error channel; `Err` means the run itself could not proceed.
    pub async fn execute(
        &self,
        context: RunContext,
        cancel: watch::Receiver<bool>,
    ) -> Result<Run> {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let store = Arc::new(ArtifactStore::open(&self.config.artifacts_root, run_id)?);

        self.sink.emit(Event::RunStarted {
            run_id,
            pipeline: self.definition.name.clone(),
        });
        info!(%run_id, pipeline = %self.definition.name, git_ref = %context.git_ref, "Run started");

        let mut variables = self.config.variables.clone();
        variables.extend(self.definition.variables.clone());

        // Expand every job up-front; instances become visible immediately.
        let order: Vec<JobDefinition> = self
            .dag
            .topological_order()
            .map_err(Error::from)?
            .into_iter()
            .map(|n| n.definition.clone())
            .collect();

        let expander = MatrixExpander::new();
        let mut instances: Vec<JobInstance> = Vec::new();
        let mut combos: Vec<MatrixCombination> = Vec::new();
        let mut job_instances: HashMap<String, Vec<usize>> = HashMap::new();

        for job in &order {
            for combo in expander.expand(job) {
                let idx = instances.len();
                instances.push(JobInstance {
                    id: InstanceId::new(),
                    job: job.name.clone(),
                    display_name: combo.display_name.clone(),
                    matrix: combo.values.clone(),
                    state: if job.depends_on.is_empty() {
                        InstanceState::Pending
                    } else {
                        InstanceState::Blocked
                    },
                    steps: job
                        .steps
                        .iter()
                        .map(|s| StepRecord {
                            name: s.name.clone(),
                            status: StepStatus::Pending,
                            exit_code: None,
                            duration_ms: None,
                        })
                        .collect(),
                    failure: None,
                    skip_reason: None,
                    started_at: None,
                    completed_at: None,
                });
                combos.push(combo);
                job_instances.entry(job.name.clone()).or_default().push(idx);
            }
        }

        let mut started: HashSet<String> = HashSet::new();
        let mut succeeded: HashSet<String> = HashSet::new();
        let mut failed: HashSet<String> = HashSet::new();
        let mut skipped: HashSet<String> = HashSet::new();
        let mut remaining: HashMap<String, usize> = HashMap::new();
        let mut join_set: JoinSet<(String, usize, InstanceOutcome)> = JoinSet::new();
        let mut cancel_select = cancel.clone();
        let mut run_cancelled = false;

        // A false start condition skips the job before anything runs.
        for job in &order {
            if let Some(cond) = &job.condition
                && !cond.evaluate(&context)
            {
                skip_job(
                    &job.name,
                    SkipReason::ConditionUnmet,
                    &mut skipped,
                    &mut instances,
                    &job_instances,
                    run_id,
                    &*self.sink,
                );
            }
        }

        loop {
            // Propagate failures and skips through the downstream cone.
            loop {
                let mut changed = false;
                for job in &order {
                    if started.contains(&job.name) || skipped.contains(&job.name) {
                        continue;
                    }
                    if job.depends_on.iter().any(|d| failed.contains(d)) {
                        skip_job(
                            &job.name,
                            SkipReason::UpstreamFailed,
                            &mut skipped,
                            &mut instances,
                            &job_instances,
                            run_id,
                            &*self.sink,
                        );
                        changed = true;
                    } else if job.depends_on.iter().any(|d| skipped.contains(d)) {
                        skip_job(
                            &job.name,
                            SkipReason::UpstreamSkipped,
                            &mut skipped,
                            &mut instances,
                            &job_instances,
                            run_id,
                            &*self.sink,
                        );
                        changed = true;
                    }
                }
                if !changed {
                    break;
                }
            }

            // Spawn every job whose gate is open. Start order among
            // eligible jobs is unspecified.
            let completed: Vec<String> = succeeded.iter().cloned().collect();
            for job in &order {
                if started.contains(&job.name) || skipped.contains(&job.name) {
                    continue;
                }
                if !self.dag.is_ready(&job.name, &completed) {
                    continue;
                }

                started.insert(job.name.clone());
                let idxs = job_instances[&job.name].clone();
                remaining.insert(job.name.clone(), idxs.len());

                for idx in idxs {
                    let instance = &mut instances[idx];
                    instance.state = InstanceState::Running;
                    instance.started_at = Some(Utc::now());
                    self.sink.emit(Event::JobStarted {
                        run_id,
                        instance_id: instance.id,
                        job: job.name.clone(),
                        display_name: instance.display_name.clone(),
                    });

                    let task = InstanceTask {
                        run_id,
                        instance_id: instance.id,
                        job: job.clone(),
                        combo: combos[idx].clone(),
                        context: context.clone(),
                        variables: variables.clone(),
                        workspace: self.config.workspace.clone(),
                        store: store.clone(),
                        index: self.index.clone(),
                        credentials: if job.publish.is_some() {
                            self.config.credentials.clone()
                        } else {
                            None
                        },
                        sink: self.sink.clone(),
                    };
                    let cancel_rx = cancel.clone();
                    let job_name = job.name.clone();
                    join_set.spawn(async move {
                        let outcome = task.run(cancel_rx).await;
                        (job_name, idx, outcome)
                    });
                }
            }

            if join_set.is_empty() {
                break;
            }

            tokio::select! {
                res = join_set.join_next() => match res {
                    Some(Ok((job_name, idx, outcome))) => {
                        let instance = &mut instances[idx];
                        instance.state = outcome.state;
                        instance.steps = outcome.steps;
                        instance.failure = outcome.failure;
                        instance.skip_reason = outcome.skip_reason;
                        instance.completed_at = Some(outcome.completed_at);
                        self.sink.emit(Event::JobCompleted {
                            run_id,
                            instance_id: instance.id,
                            job: job_name.clone(),
                            display_name: instance.display_name.clone(),
                            state: instance.state,
                        });

                        if let Some(left) = remaining.get_mut(&job_name) {
                            *left -= 1;
                            if *left == 0 {
                                let all_succeeded = job_instances[&job_name]
                                    .iter()
                                    .all(|&i| instances[i].state == InstanceState::Succeeded);
                                if all_succeeded {
                                    succeeded.insert(job_name);
                                } else {
                                    failed.insert(job_name);
                                }
                            }
                        }
                    }
                    Some(Err(e)) if e.is_cancelled() => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Instance task aborted unexpectedly");
                        break;
                    }
                    None => {}
                },
                _ = cancelled(&mut cancel_select) => {
                    info!(%run_id, "Run cancelled, aborting in-flight instances");
                    join_set.shutdown().await;
                    run_cancelled = true;
                    break;
                }
            }
        }

        // Anything still non-terminal never ran.
        for instance in &mut instances {
            if !instance.state.is_terminal() {
                instance.state = InstanceState::Skipped;
                instance.skip_reason = Some(SkipReason::Cancelled);
                instance.completed_at = Some(Utc::now());
            }
        }

        let status = if run_cancelled || *cancel.borrow() {
            RunStatus::Cancelled
        } else if instances.iter().any(|i| i.state == InstanceState::Failed) {
            RunStatus::Failure
        } else {
            RunStatus::Success
        };

        self.sink.emit(Event::RunCompleted { run_id, status });
        info!(%run_id, ?status, "Run completed");

        Ok(Run {
            id: run_id,
            pipeline_name: self.definition.name.clone(),
            status,
            context,
            instances,
            queued_at: started_at,
            started_at: Some(started_at),
            completed_at: Some(Utc::now()),
        })
    }
}

fn skip_job(
    job_name: &str,
    reason: SkipReason,
    skipped: &mut HashSet<String>,
    instances: &mut [JobInstance],
    job_instances: &HashMap<String, Vec<usize>>,
    run_id: RunId,
    sink: &dyn EventSink,
) {
    if !skipped.insert(job_name.to_string()) {
        return;
    }
    if let Some(idxs) = job_instances.get(job_name) {
        for &idx in idxs {
            let instance = &mut instances[idx];
            instance.state = InstanceState::Skipped;
            instance.skip_reason = Some(reason);
            instance.completed_at = Some(Utc::now());
            for step in &mut instance.steps {
                step.status = StepStatus::Skipped;
            }
        }
    }
    sink.emit(Event::JobSkipped {
        run_id,
        job: job_name.to_string(),
        display_name: job_name.to_string(),
        reason,
    });
}

fn event_name(event: TriggerType) -> &'static str {
    match event {
        TriggerType::Push => "push",
        TriggerType::PullRequest => "pull_request",
        TriggerType::Manual => "manual",
    }
}

struct InstanceOutcome {
    state: InstanceState,
    steps: Vec<StepRecord>,
    failure: Option<FailureInfo>,
    skip_reason: Option<SkipReason>,
    completed_at: DateTime<Utc>,
}

/// All state one instance needs, owned so the task is `'static`.
struct InstanceTask {
    run_id: RunId,
    instance_id: InstanceId,
    job: JobDefinition,
    combo: MatrixCombination,
    context: RunContext,
    variables: HashMap<String, String>,
    workspace: PathBuf,
    store: Arc<ArtifactStore>,
    index: Option<Arc<dyn PackageIndex>>,
    credentials: Option<RegistryCredentials>,
    sink: Arc<dyn EventSink>,
}

impl InstanceTask {
    async fn run(self, cancel: watch::Receiver<bool>) -> InstanceOutcome {
        let mut interp = InterpolationContext::new();
        interp.variables = self.variables.clone();
        for (k, v) in &self.job.variables {
            interp.variables.insert(k.clone(), v.clone());
        }
        interp.matrix = self
            .combo
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(creds) = &self.credentials {
            for (k, v) in creds.env() {
                interp.secrets.insert(k, v);
            }
        }

        let runner = ShellRunner::new();
        let mut steps: Vec<StepRecord> = self
            .job
            .steps
            .iter()
            .map(|s| StepRecord {
                name: s.name.clone(),
                status: StepStatus::Pending,
                exit_code: None,
                duration_ms: None,
            })
            .collect();

        let mut failure: Option<FailureInfo> = None;
        let mut was_cancelled = false;

        for (i, step) in self.job.steps.iter().enumerate() {
            steps[i].status = StepStatus::Running;
            self.sink.emit(Event::StepStarted {
                run_id: self.run_id,
                instance_id: self.instance_id,
                step: step.name.clone(),
            });

            // Substitute matrix and variable values into the step.
            let mut effective = step.clone();
            effective.run = effective.run.take().map(|r| interp.interpolate(&r));
            effective.command = effective
                .command
                .iter()
                .map(|a| interp.interpolate(a))
                .collect();
            effective.working_directory = effective
                .working_directory
                .take()
                .map(|d| interp.interpolate(&d));

            if !runner.can_handle(&effective) {
                // Nothing to execute; a bare step is a no-op.
                steps[i].status = StepStatus::Success;
                steps[i].exit_code = Some(0);
                continue;
            }

            let mut env = interp.variables.clone();
            for (k, v) in &effective.variables {
                env.insert(k.clone(), interp.interpolate(v));
            }
            for (k, v) in &self.combo.values {
                env.insert(format!("MATRIX_{}", k.to_uppercase()), v.clone());
            }
            env.insert(
                "PIPELINE_EVENT".to_string(),
                event_name(self.context.event).to_string(),
            );
            env.insert("PIPELINE_REF".to_string(), self.context.git_ref.clone());
            env.insert(
                "PIPELINE_IS_TAG".to_string(),
                self.context.is_tag.to_string(),
            );

            // Credentials reach only explicitly scoped steps.
            let secrets: HashMap<String, String> = if effective.credentials {
                self.credentials
                    .as_ref()
                    .map(|c| c.env().into_iter().collect())
                    .unwrap_or_default()
            } else {
                HashMap::new()
            };

            let step_ctx = StepContext {
                workspace: self.workspace.clone(),
                variables: env,
                secrets,
                step: effective,
            };

            let (tx, mut rx) = mpsc::channel::<OutputLine>(100);
            let sink = self.sink.clone();
            let mask = interp.clone();
            let run_id = self.run_id;
            let instance_id = self.instance_id;
            let step_name = step.name.clone();
            let printer = tokio::spawn(async move {
                while let Some(line) = rx.recv().await {
                    sink.emit(Event::StepOutput {
                        run_id,
                        instance_id,
                        step: step_name.clone(),
                        line: mask.mask_secrets(&line.content),
                    });
                }
            });

            let res = runner.execute(&step_ctx, tx, cancel.clone()).await;
            let _ = printer.await;

            match res {
                Ok(result) => {
                    steps[i].exit_code = Some(result.exit_code);
                    steps[i].duration_ms = Some(result.duration_ms);
                    steps[i].status = if result.success {
                        StepStatus::Success
                    } else {
                        StepStatus::Failure
                    };
                    self.sink.emit(Event::StepCompleted {
                        run_id: self.run_id,
                        instance_id: self.instance_id,
                        step: step.name.clone(),
                        exit_code: result.exit_code,
                        duration_ms: result.duration_ms,
                    });
                    if !result.success {
                        failure = Some(FailureInfo {
                            step: step.name.clone(),
                            exit_code: Some(result.exit_code),
                            message: Error::StepFailed {
                                step: step.name.clone(),
                                exit_code: result.exit_code,
                            }
                            .to_string(),
                        });
                        break;
                    }
                }
                Err(Error::RunCancelled) => {
                    steps[i].status = StepStatus::Skipped;
                    was_cancelled = true;
                    break;
                }
                Err(e) => {
                    steps[i].status = StepStatus::Failure;
                    failure = Some(FailureInfo {
                        step: step.name.clone(),
                        exit_code: None,
                        message: e.to_string(),
                    });
                    break;
                }
            }
        }

        // Steps after the failing one never run.
        for record in &mut steps {
            if record.status == StepStatus::Pending {
                record.status = StepStatus::Skipped;
            }
        }

        if was_cancelled {
            return InstanceOutcome {
                state: InstanceState::Skipped,
                steps,
                failure: None,
                skip_reason: Some(SkipReason::Cancelled),
                completed_at: Utc::now(),
            };
        }

        // The slot is committed only after every step succeeded, so a
        // failed or aborted instance never publishes partial output.
        if failure.is_none()
            && let Some(spec) = &self.job.artifacts
        {
            let slot = interp.interpolate(&spec.slot);
            let producer = self.combo.display_name.clone();
            let paths: Vec<PathBuf> = spec
                .paths
                .iter()
                .map(|p| PathBuf::from(interp.interpolate(p)))
                .collect();

            let store = self.store.clone();
            let base = self.workspace.clone();
            let put_slot = slot.clone();
            let put_producer = producer.clone();
            let res = tokio::task::spawn_blocking(move || {
                store.put(&put_slot, &put_producer, &paths, &base)
            })
            .await
            .map_err(|e| Error::Internal(e.to_string()))
            .and_then(|r| r);

            match res {
                Ok(entry) => {
                    self.sink.emit(Event::ArtifactStored {
                        run_id: self.run_id,
                        slot,
                        producer,
                        digest: entry.digest,
                    });
                }
                Err(e) => {
                    failure = Some(FailureInfo {
                        step: "artifacts".to_string(),
                        exit_code: None,
                        message: e.to_string(),
                    });
                }
            }
        }

        if failure.is_none()
            && let Some(spec) = &self.job.publish
        {
            match &self.index {
                Some(index) => {
                    let publisher = Publisher::new(index.clone());
                    let staging = self.store.root().join("_staging");
                    match publisher
                        .publish(self.store.clone(), spec.from.clone(), staging, &*self.sink)
                        .await
                    {
                        Ok(report) if report.is_success() => {
                            info!(
                                uploaded = report.uploaded(),
                                skipped = report.skipped(),
                                "Publish complete"
                            );
                        }
                        Ok(report) => {
                            failure = Some(FailureInfo {
                                step: "publish".to_string(),
                                exit_code: None,
                                message: Error::PublishFailed {
                                    failed: report.failed(),
                                    total: report.outcomes.len(),
                                }
                                .to_string(),
                            });
                        }
                        Err(e) => {
                            failure = Some(FailureInfo {
                                step: "publish".to_string(),
                                exit_code: None,
                                message: e.to_string(),
                            });
                        }
                    }
                }
                None => {
                    failure = Some(FailureInfo {
                        step: "publish".to_string(),
                        exit_code: None,
                        message: "No package index configured".to_string(),
                    });
                }
            }
        }

        match failure {
            None => InstanceOutcome {
                state: InstanceState::Succeeded,
                steps,
                failure: None,
                skip_reason: None,
                completed_at: Utc::now(),
            },
            Some(f) => InstanceOutcome {
                state: InstanceState::Failed,
                steps,
                failure: Some(f),
                skip_reason: None,
                completed_at: Utc::now(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_core::pipeline::{StartCondition, StepDefinition};
    use shipwright_core::ports::NullSink;

    fn make_step(name: &str, run: &str) -> StepDefinition {
        StepDefinition {
            name: name.to_string(),
            run: Some(run.to_string()),
            command: vec![],
            shell: "sh".to_string(),
            working_directory: None,
            variables: Default::default(),
            credentials: false,
        }
    }

    fn make_job(name: &str, depends_on: Vec<&str>, steps: Vec<StepDefinition>) -> JobDefinition {
        JobDefinition {
            name: name.to_string(),
            display_name: None,
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            condition: None,
            variables: Default::default(),
            matrix: None,
            steps,
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

    fn make_coordinator(
        def: PipelineDefinition,
        workspace: &std::path::Path,
        artifacts: &std::path::Path,
    ) -> RunCoordinator {
        RunCoordinator::new(
            def,
            CoordinatorConfig {
                workspace: workspace.to_path_buf(),
                artifacts_root: artifacts.to_path_buf(),
                variables: HashMap::new(),
                credentials: None,
            },
            None,
            Arc::new(NullSink),
        )
        .unwrap()
    }

    fn branch_context() -> RunContext {
        RunContext {
            event: TriggerType::Push,
            git_ref: "main".to_string(),
            is_tag: false,
        }
    }

    fn no_cancel() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        std::mem::forget(tx);
        rx
    }

    fn instance<'a>(run: &'a Run, job: &str) -> &'a JobInstance {
        run.instances
            .iter()
            .find(|i| i.job == job)
            .unwrap_or_else(|| panic!("no instance for {}", job))
    }

    #[tokio::test]
    async fn test_linear_run_succeeds() {
        let ws = tempfile::tempdir().unwrap();
        let arts = tempfile::tempdir().unwrap();
        let def = make_pipeline(vec![
            make_job("build", vec![], vec![make_step("compile", "true")]),
            make_job("smoke", vec!["build"], vec![make_step("check", "true")]),
        ]);

        let coordinator = make_coordinator(def, ws.path(), arts.path());
        let run = coordinator
            .execute(branch_context(), no_cancel())
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(instance(&run, "build").state, InstanceState::Succeeded);
        assert_eq!(instance(&run, "smoke").state, InstanceState::Succeeded);
    }

    #[tokio::test]
    async fn test_first_failing_step_halts_instance() {
        let ws = tempfile::tempdir().unwrap();
        let arts = tempfile::tempdir().unwrap();
        let marker = ws.path().join("after-failure");
        let def = make_pipeline(vec![make_job(
            "build",
            vec![],
            vec![
                make_step("boom", "exit 7"),
                make_step("never", &format!("touch {}", marker.display())),
            ],
        )]);

        let coordinator = make_coordinator(def, ws.path(), arts.path());
        let run = coordinator
            .execute(branch_context(), no_cancel())
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Failure);
        let build = instance(&run, "build");
        assert_eq!(build.state, InstanceState::Failed);

        let failure = build.failure.as_ref().expect("failure recorded");
        assert_eq!(failure.step, "boom");
        assert_eq!(failure.exit_code, Some(7));

        assert_eq!(build.steps[1].status, StepStatus::Skipped);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_failed_upstream_skips_downstream() {
        let ws = tempfile::tempdir().unwrap();
        let arts = tempfile::tempdir().unwrap();
        let def = make_pipeline(vec![
            make_job("build", vec![], vec![make_step("boom", "false")]),
            make_job("smoke", vec!["build"], vec![make_step("check", "true")]),
            make_job("release", vec!["smoke"], vec![make_step("ship", "true")]),
        ]);

        let coordinator = make_coordinator(def, ws.path(), arts.path());
        let run = coordinator
            .execute(branch_context(), no_cancel())
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Failure);
        let smoke = instance(&run, "smoke");
        assert_eq!(smoke.state, InstanceState::Skipped);
        assert_eq!(smoke.skip_reason, Some(SkipReason::UpstreamFailed));

        // The skip propagates through the whole downstream cone.
        let release = instance(&run, "release");
        assert_eq!(release.state, InstanceState::Skipped);
        assert_eq!(release.skip_reason, Some(SkipReason::UpstreamSkipped));
    }

    #[tokio::test]
    async fn test_condition_unmet_skips_without_failing_run() {
        let ws = tempfile::tempdir().unwrap();
        let arts = tempfile::tempdir().unwrap();
        let mut release = make_job("release", vec![], vec![make_step("ship", "true")]);
        release.condition = Some(StartCondition::TagMatch {
            pattern: "v*".to_string(),
        });
        let def = make_pipeline(vec![
            make_job("build", vec![], vec![make_step("compile", "true")]),
            release,
        ]);

        let coordinator = make_coordinator(def, ws.path(), arts.path());
        let run = coordinator
            .execute(branch_context(), no_cancel())
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Success);
        let release = instance(&run, "release");
        assert_eq!(release.state, InstanceState::Skipped);
        assert_eq!(release.skip_reason, Some(SkipReason::ConditionUnmet));
    }

    #[tokio::test]
    async fn test_matrix_sibling_failure_is_isolated() {
        let ws = tempfile::tempdir().unwrap();
        let arts = tempfile::tempdir().unwrap();
        let mut build = make_job(
            "build",
            vec![],
            vec![make_step(
                "compile",
                r#"[ "$MATRIX_TARGET" != "i686" ] && touch "built-$MATRIX_TARGET""#,
            )],
        );
        build.matrix = Some(shipwright_core::pipeline::MatrixConfig {
            axes: std::collections::BTreeMap::from([(
                "target".to_string(),
                vec![
                    "x86_64".to_string(),
                    "i686".to_string(),
                    "aarch64".to_string(),
                ],
            )]),
            include: vec![],
            exclude: vec![],
        });
        let def = make_pipeline(vec![build]);

        let coordinator = make_coordinator(def, ws.path(), arts.path());
        let run = coordinator
            .execute(branch_context(), no_cancel())
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Failure);
        assert_eq!(run.instances.len(), 3);

        let states: HashMap<String, InstanceState> = run
            .instances
            .iter()
            .map(|i| (i.matrix["target"].clone(), i.state))
            .collect();
        assert_eq!(states["x86_64"], InstanceState::Succeeded);
        assert_eq!(states["i686"], InstanceState::Failed);
        assert_eq!(states["aarch64"], InstanceState::Succeeded);

        // Siblings ran to completion despite the failure.
        assert!(ws.path().join("built-x86_64").exists());
        assert!(ws.path().join("built-aarch64").exists());
    }

    #[tokio::test]
    async fn test_cancellation_skips_in_flight_instances() {
        let ws = tempfile::tempdir().unwrap();
        let arts = tempfile::tempdir().unwrap();
        let def = make_pipeline(vec![
            make_job("build", vec![], vec![make_step("slow", "sleep 30")]),
            make_job("smoke", vec!["build"], vec![make_step("check", "true")]),
        ]);

        let coordinator = make_coordinator(def, ws.path(), arts.path());
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            coordinator.execute(branch_context(), cancel_rx).await
        });
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
        cancel_tx.send(true).unwrap();

        let run = handle.await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
        for instance in &run.instances {
            assert_eq!(instance.state, InstanceState::Skipped);
        }
    }
}
