//! Command handlers.

use crate::commands::EventKind;
use crate::config::CliConfig;
use crate::report::{ConsoleSink, print_summary};
use console::style;
use shipwright_artifacts::ArtifactStore;
use shipwright_core::credentials::RegistryCredentials;
use shipwright_core::pipeline::PipelineDefinition;
use shipwright_core::ports::PackageIndex;
use shipwright_publish::DirIndex;
use shipwright_scheduler::{CoordinatorConfig, DagBuilder, RunCoordinator, TriggerEvent};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

const PIPELINE_TEMPLATE: &str = r#"name: native-release
version: "1"

triggers:
  - type: push
    branches: ["main"]
  - type: push
    tags: ["v*"]
  - type: pull_request
    branches: ["main"]

jobs:
  - name: build
    matrix:
      axes:
        target: [x86_64, i686, aarch64]
    steps:
      - name: compile
        run: |
          mkdir -p dist-${{ matrix.target }}
          echo "replace with your build command" > dist-${{ matrix.target }}/pkg-${{ matrix.target }}.whl
      - name: smoke-test
        run: test -s dist-${{ matrix.target }}/pkg-${{ matrix.target }}.whl
    artifacts:
      slot: wheel-${{ matrix.target }}
      paths: ["dist-${{ matrix.target }}"]

  - name: sdist
    steps:
      - name: pack
        run: |
          mkdir -p dist-sdist
          echo "replace with your sdist command" > dist-sdist/pkg.tar.gz
    artifacts:
      slot: sdist
      paths: ["dist-sdist"]

  - name: release
    depends_on: [build, sdist]
    condition:
      tag_match:
        pattern: "v*"
    publish:
      from: ["wheel-*", "sdist"]
"#;

/// Initialize a new pipeline.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new("shipwright.yaml");

    if path.exists() {
        println!("{} shipwright.yaml already exists", style("!").yellow());
        return Ok(());
    }

    std::fs::write(path, PIPELINE_TEMPLATE)?;
    println!("{} Created shipwright.yaml", style("✓").green());
    Ok(())
}

/// Validate a pipeline configuration.
pub async fn validate(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let definition = load_pipeline(Path::new(path))?;

    // Structural problems (cycles, dangling dependencies, credential
    // scoping) are caught here, before any run could exist.
    DagBuilder::new().build(&definition)?;

    println!(
        "{} Pipeline \"{}\" is valid",
        style("✓").green(),
        definition.name
    );
    println!("  Jobs: {}", definition.jobs.len());

    for job in &definition.jobs {
        println!("    - {} ({} steps)", job.name, job.steps.len());
    }

    Ok(())
}

/// Render the job graph.
pub async fn graph(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let definition = load_pipeline(Path::new(path))?;
    print!("{}", crate::graph::render(&definition)?);
    Ok(())
}

/// Options for the `run` subcommand.
pub struct RunOptions {
    pub file: Option<String>,
    pub event: EventKind,
    pub git_ref: String,
    pub tag: bool,
    pub vars: Vec<String>,
    pub index: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
    pub keep_artifacts: bool,
}

/// Execute a run for an event. Returns whether the run succeeded
/// (an event matching no trigger counts as success).
pub async fn run_pipeline(
    config: &CliConfig,
    opts: RunOptions,
) -> Result<bool, Box<dyn std::error::Error>> {
    let path = find_pipeline_file(opts.file.as_deref())
        .ok_or("No pipeline file found (try `shipwright init`)")?;
    let definition = load_pipeline(&path)?;

    let workspace = match opts.workspace {
        Some(ws) => ws,
        None => std::env::current_dir()?,
    };
    let artifacts_root = config
        .artifacts_root
        .clone()
        .unwrap_or_else(|| workspace.join(".shipwright").join("artifacts"));

    let mut variables = HashMap::new();
    for pair in &opts.vars {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("Invalid variable '{}', expected KEY=VALUE", pair))?;
        variables.insert(key.to_string(), value.to_string());
    }

    // Credentials come from the environment, never from flags, and are
    // handed only to the publish job.
    let credentials = match (
        std::env::var("SHIPWRIGHT_PUBLISH_USERNAME"),
        std::env::var("SHIPWRIGHT_PUBLISH_TOKEN"),
    ) {
        (Ok(username), Ok(token)) => Some(RegistryCredentials::new(username, token)),
        _ => None,
    };

    let index: Option<Arc<dyn PackageIndex>> = opts
        .index
        .or_else(|| config.index.clone())
        .map(|p| Arc::new(DirIndex::new(p)) as Arc<dyn PackageIndex>);

    let event = match opts.event {
        EventKind::Push => TriggerEvent::Push {
            git_ref: opts.git_ref.clone(),
            is_tag: opts.tag,
        },
        EventKind::PullRequest => TriggerEvent::PullRequest {
            branch: opts.git_ref.clone(),
        },
        EventKind::Manual => TriggerEvent::Manual {
            git_ref: opts.git_ref.clone(),
        },
    };

    tracing::debug!(
        pipeline = %path.display(),
        artifacts_root = %artifacts_root.display(),
        has_credentials = credentials.is_some(),
        "Resolved run configuration"
    );

    let coordinator = RunCoordinator::new(
        definition,
        CoordinatorConfig {
            workspace,
            artifacts_root: artifacts_root.clone(),
            variables,
            credentials,
        },
        index,
        Arc::new(ConsoleSink::new()),
    )?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    match coordinator.handle_event(&event, cancel_rx).await? {
        None => {
            println!(
                "{} Event matches no trigger; nothing to do",
                style("i").blue()
            );
            Ok(true)
        }
        Some(run) => {
            print_summary(&run);

            if !opts.keep_artifacts {
                ArtifactStore::open(&artifacts_root, run.id)?.purge()?;
            }

            Ok(run.status.is_success())
        }
    }
}

/// Show configuration.
pub fn show_config(config: &CliConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Current configuration:");
    println!(
        "  artifacts_root: {}",
        config
            .artifacts_root
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!(
        "  index: {}",
        config
            .index
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );

    if let Ok(path) = CliConfig::config_path() {
        println!("\nConfig file: {}", path.display());
    }

    Ok(())
}

/// Set configuration.
pub fn set_config(key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = CliConfig::load().unwrap_or_default();
    config.set(key, value)?;
    config.save()?;

    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(())
}

/// Find pipeline file in standard locations.
pub fn find_pipeline_file(path: Option<&str>) -> Option<PathBuf> {
    if let Some(p) = path {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
        return None;
    }

    let candidates = [
        ".shipwright/pipeline.yaml",
        ".shipwright/pipeline.yml",
        "shipwright.yaml",
        "shipwright.yml",
    ];

    for candidate in candidates {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Some(path);
        }
    }

    None
}

/// Load and parse a pipeline file.
pub fn load_pipeline(path: &Path) -> Result<PipelineDefinition, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let definition: PipelineDefinition = serde_yaml::from_str(&content)?;
    Ok(definition)
}
