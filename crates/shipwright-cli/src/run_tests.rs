//! End-to-end run scenarios against the full pipeline definition.

use crate::handlers::load_pipeline;
use shipwright_core::ports::{NullSink, PackageIndex};
use shipwright_core::run::{InstanceState, RunStatus, SkipReason};
use shipwright_publish::DirIndex;
use shipwright_scheduler::{CoordinatorConfig, RunCoordinator, TriggerEvent};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

const RELEASE_PIPELINE: &str = r#"
version: "1"
name: native-release
triggers:
  - type: push
    branches: ["main"]
  - type: push
    tags: ["v*"]
jobs:
  - name: build
    matrix:
      axes:
        target: [x86_64, i686, aarch64]
    steps:
      - name: compile
        run: |
          set -e
          mkdir -p dist-${{ matrix.target }}
          echo "${{ matrix.target }}" > dist-${{ matrix.target }}/pkg-${{ matrix.target }}.whl
    artifacts:
      slot: wheel-${{ matrix.target }}
      paths: ["dist-${{ matrix.target }}"]
  - name: sdist
    steps:
      - name: pack
        run: |
          set -e
          mkdir -p dist-sdist
          echo "sdist" > dist-sdist/pkg.tar.gz
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

// Same graph, but the i686 build target fails its compile step.
const FAILING_TARGET_PIPELINE: &str = r#"
version: "1"
name: native-release
triggers:
  - type: push
    tags: ["v*"]
jobs:
  - name: build
    matrix:
      axes:
        target: [x86_64, i686, aarch64]
    steps:
      - name: compile
        run: |
          set -e
          test "${{ matrix.target }}" != "i686"
          mkdir -p dist-${{ matrix.target }}
          echo "${{ matrix.target }}" > dist-${{ matrix.target }}/pkg-${{ matrix.target }}.whl
    artifacts:
      slot: wheel-${{ matrix.target }}
      paths: ["dist-${{ matrix.target }}"]
  - name: sdist
    steps:
      - name: pack
        run: |
          set -e
          mkdir -p dist-sdist
          echo "sdist" > dist-sdist/pkg.tar.gz
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

fn write_pipeline(dir: &Path, yaml: &str) -> std::path::PathBuf {
    let path = dir.join("shipwright.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

fn make_coordinator(
    yaml: &str,
    workspace: &Path,
    artifacts: &Path,
    index: Option<&Path>,
) -> RunCoordinator {
    let definition = load_pipeline(&write_pipeline(workspace, yaml)).unwrap();
    let index = index.map(|p| Arc::new(DirIndex::new(p)) as Arc<dyn PackageIndex>);
    RunCoordinator::new(
        definition,
        CoordinatorConfig {
            workspace: workspace.to_path_buf(),
            artifacts_root: artifacts.to_path_buf(),
            variables: HashMap::new(),
            credentials: None,
        },
        index,
        Arc::new(NullSink),
    )
    .unwrap()
}

fn no_cancel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    std::mem::forget(tx);
    rx
}

fn tag_push(git_ref: &str) -> TriggerEvent {
    TriggerEvent::Push {
        git_ref: git_ref.to_string(),
        is_tag: true,
    }
}

#[tokio::test]
async fn test_tag_push_publishes_all_artifacts() {
    let ws = tempfile::tempdir().unwrap();
    let arts = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();

    let coordinator =
        make_coordinator(RELEASE_PIPELINE, ws.path(), arts.path(), Some(dest.path()));
    let run = coordinator
        .handle_event(&tag_push("v1.2.3"), no_cancel())
        .await
        .unwrap()
        .expect("tag push matches the tag trigger");

    assert_eq!(run.status, RunStatus::Success);
    // 3 build instances + sdist + release
    assert_eq!(run.instances.len(), 5);

    // All four slots were merged and published.
    for name in [
        "pkg-x86_64.whl",
        "pkg-i686.whl",
        "pkg-aarch64.whl",
        "pkg.tar.gz",
    ] {
        assert!(dest.path().join(name).exists(), "missing {}", name);
    }
}

#[tokio::test]
async fn test_branch_push_runs_builds_but_skips_publisher() {
    let ws = tempfile::tempdir().unwrap();
    let arts = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();

    let coordinator =
        make_coordinator(RELEASE_PIPELINE, ws.path(), arts.path(), Some(dest.path()));
    let run = coordinator
        .handle_event(
            &TriggerEvent::Push {
                git_ref: "main".to_string(),
                is_tag: false,
            },
            no_cancel(),
        )
        .await
        .unwrap()
        .expect("branch push matches the branch trigger");

    // Builds ran and succeeded; the unmet gate predicate does not fail
    // the run.
    assert_eq!(run.status, RunStatus::Success);

    let release = run
        .instances
        .iter()
        .find(|i| i.job == "release")
        .expect("release instance exists");
    assert_eq!(release.state, InstanceState::Skipped);
    assert_eq!(release.skip_reason, Some(SkipReason::ConditionUnmet));

    // Nothing was published.
    let published = std::fs::read_dir(dest.path()).map(|d| d.count()).unwrap_or(0);
    assert_eq!(published, 0);
}

#[tokio::test]
async fn test_failing_target_skips_publisher_even_on_tag() {
    let ws = tempfile::tempdir().unwrap();
    let arts = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();

    let coordinator = make_coordinator(
        FAILING_TARGET_PIPELINE,
        ws.path(),
        arts.path(),
        Some(dest.path()),
    );
    let run = coordinator
        .handle_event(&tag_push("v2.0.0"), no_cancel())
        .await
        .unwrap()
        .expect("tag push matches");

    assert_eq!(run.status, RunStatus::Failure);

    // Sibling targets still ran to completion.
    let build_states: HashMap<String, InstanceState> = run
        .instances
        .iter()
        .filter(|i| i.job == "build")
        .map(|i| (i.matrix["target"].clone(), i.state))
        .collect();
    assert_eq!(build_states["x86_64"], InstanceState::Succeeded);
    assert_eq!(build_states["i686"], InstanceState::Failed);
    assert_eq!(build_states["aarch64"], InstanceState::Succeeded);

    // The publisher needs every build instance, so it is skipped even
    // on a tag push, and nothing reaches the index.
    let release = run
        .instances
        .iter()
        .find(|i| i.job == "release")
        .expect("release instance exists");
    assert_eq!(release.state, InstanceState::Skipped);
    assert_eq!(release.skip_reason, Some(SkipReason::UpstreamFailed));

    let published = std::fs::read_dir(dest.path()).map(|d| d.count()).unwrap_or(0);
    assert_eq!(published, 0);
}

#[tokio::test]
async fn test_unmatched_event_creates_no_run() {
    let ws = tempfile::tempdir().unwrap();
    let arts = tempfile::tempdir().unwrap();

    let coordinator = make_coordinator(RELEASE_PIPELINE, ws.path(), arts.path(), None);
    let run = coordinator
        .handle_event(
            &TriggerEvent::PullRequest {
                branch: "feature/x".to_string(),
            },
            no_cancel(),
        )
        .await
        .unwrap();

    assert!(run.is_none());
}
